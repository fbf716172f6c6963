//! Audio: codec, ring buffer, capture and playback.

pub mod capture;
pub mod codec;
#[cfg(feature = "cpal-audio")]
pub mod device;
pub mod playback;
pub mod ring;
pub mod wav;
