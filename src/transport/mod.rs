//! Duplex network transport to remote synthesis/conversion services.

pub mod client;
pub mod protocol;

pub use client::{DisconnectReason, DuplexTransport, EventReceiver, TransportEvent, TransportOptions};
pub use protocol::{ClientMessage, ControlEvent, SynthesisRequest};
