//! voxchain - streaming speech synthesis and voice conversion client
//!
//! Moves PCM audio from remote services into a lock-free ring and out to the
//! sound card, chaining synthesis and conversion stages per turn.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod transport;

// Composition root
#[cfg(all(feature = "cpal-audio", feature = "cli"))]
pub mod app;

// Audio path
pub use audio::capture::AudioSource;
pub use audio::playback::PlaybackSink;
pub use audio::ring::SampleRing;

// Streaming
pub use session::{SessionEvent, SessionState, StreamSession};
pub use transport::{ClientMessage, ControlEvent, DuplexTransport};

// Pipeline
pub use pipeline::{OutputRoute, PipelineController, TurnOutcome, UpstreamEvent};

// Error handling
pub use error::{Result, VoxchainError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
