//! Session lifecycle states.

use std::fmt;

/// Lifecycle of one streamed request/response exchange.
///
/// ```text
/// Idle → Connecting → Streaming → Draining → Finished
///   └──────────┴───────────┴──────────┴──────────┴──→ Errored
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Connecting = 1,
    Streaming = 2,
    /// `end` received; audio may still be buffered.
    Draining = 3,
    Finished = 4,
    Errored = 5,
}

impl SessionState {
    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Connecting,
            2 => Self::Streaming,
            3 => Self::Draining,
            4 => Self::Finished,
            _ => Self::Errored,
        }
    }

    /// True while the peer may still deliver audio for the utterance.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Streaming | Self::Draining)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Draining => "draining",
            Self::Finished => "finished",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}
