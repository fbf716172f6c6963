//! Stream session lifecycle.
//!
//! ```text
//!     network task                          audio render callback
//!  ┌─────────────────┐  push  ┌──────┐  pull  ┌──────────────┐
//!  │ DuplexTransport ├───────▶│ ring │◀───────┤ PlaybackSink │
//!  └────────┬────────┘        └──────┘        └──────┬───────┘
//!           │ ready/end/error                        │ poll_drain
//!           ▼                                        ▼
//!        StreamSession state ── SessionEvent / drained ──▶ owner
//! ```

pub mod state;
pub mod stream;

pub use state::SessionState;
pub use stream::{SessionEvent, SessionEvents, StreamSession, pump};
