//! Events from the upstream text/audio source of a turn.

/// What the upstream source (language model or realtime speech API)
/// produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// The source started producing a response.
    SessionStarted,
    /// An incremental text fragment.
    TextDelta(String),
    /// A chunk of raw PCM16 audio at the session rate.
    AudioDelta(Vec<u8>),
    /// The source finished; nothing further follows for this turn.
    ContentComplete,
}

impl UpstreamEvent {
    /// Maps a realtime-API lifecycle event name onto a marker event.
    ///
    /// Adapter hook for library users that bridge a realtime speech API into
    /// [`PipelineController::run_turn`](crate::pipeline::PipelineController::run_turn);
    /// the bundled commands build their events directly. Content-bearing
    /// events carry payloads and are built directly too; this only recognizes
    /// the start and completion markers.
    pub fn from_lifecycle(name: &str) -> Option<Self> {
        match name {
            "response.created" | "session.started" => Some(Self::SessionStarted),
            "response.done"
            | "response.output_item.done"
            | "response.audio.done"
            | "response.text.done"
            | "content.complete" => Some(Self::ContentComplete),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::ContentComplete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_completion_markers() {
        for name in ["response.done", "response.output_item.done", "content.complete"] {
            assert_eq!(
                UpstreamEvent::from_lifecycle(name),
                Some(UpstreamEvent::ContentComplete),
                "{name}"
            );
        }
        assert!(UpstreamEvent::from_lifecycle("response.done").unwrap().is_complete());
    }

    #[test]
    fn recognizes_start_and_ignores_others() {
        assert_eq!(
            UpstreamEvent::from_lifecycle("response.created"),
            Some(UpstreamEvent::SessionStarted)
        );
        assert_eq!(UpstreamEvent::from_lifecycle("response.audio.delta"), None);
        assert_eq!(UpstreamEvent::from_lifecycle(""), None);
    }
}
