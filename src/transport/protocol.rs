//! JSON control messages exchanged with synthesis and conversion services.
//!
//! Outbound (client → service) messages are tagged by `type`; inbound
//! (service → client) lifecycle events are tagged by `event`. Binary
//! messages carry PCM16 audio in both directions.

use serde::{Deserialize, Serialize};

/// Control messages sent to a remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// One text fragment to synthesize.
    Text { text: String },
    /// No more input for the current utterance.
    End,
    /// Select the synthesis voice.
    Speaker { speaker: u32 },
}

impl ClientMessage {
    /// Serialize message to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize message from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Whole-text request for the one-shot synthesis endpoint.
///
/// Sent untagged as the first message after connecting; the service answers
/// `ready`, the audio frames and `end`, then closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<u32>,
}

impl SynthesisRequest {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Lifecycle events received from a remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControlEvent {
    /// The service accepted the connection and is ready for input.
    Ready {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speaker: Option<u32>,
    },
    /// All audio for the current utterance has been sent.
    End,
    /// The service failed; `detail` is human readable.
    Error {
        #[serde(default)]
        detail: String,
    },
}

impl ControlEvent {
    /// Serialize event to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize event from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_text_wire_format() {
        let json = ClientMessage::Text {
            text: "こんにちは".to_string(),
        }
        .to_json()
        .expect("should serialize");
        assert_eq!(json, r#"{"type":"text","text":"こんにちは"}"#);
    }

    #[test]
    fn client_end_and_speaker_wire_format() {
        assert_eq!(
            ClientMessage::End.to_json().expect("should serialize"),
            r#"{"type":"end"}"#
        );
        assert_eq!(
            ClientMessage::Speaker { speaker: 2 }
                .to_json()
                .expect("should serialize"),
            r#"{"type":"speaker","speaker":2}"#
        );
    }

    #[test]
    fn synthesis_request_omits_missing_speaker() {
        let request = SynthesisRequest {
            text: "안녕하세요".to_string(),
            speaker: None,
        };
        assert_eq!(request.to_json().unwrap(), r#"{"text":"안녕하세요"}"#);

        let request = SynthesisRequest {
            text: "hi".to_string(),
            speaker: Some(4),
        };
        assert_eq!(request.to_json().unwrap(), r#"{"text":"hi","speaker":4}"#);
    }

    #[test]
    fn parses_server_events() {
        assert_eq!(
            ControlEvent::from_json(r#"{"event":"ready"}"#).expect("ready"),
            ControlEvent::Ready { speaker: None }
        );
        assert_eq!(
            ControlEvent::from_json(r#"{"event":"ready","speaker":3}"#).expect("ready"),
            ControlEvent::Ready { speaker: Some(3) }
        );
        assert_eq!(
            ControlEvent::from_json(r#"{"event":"end"}"#).expect("end"),
            ControlEvent::End
        );
        assert_eq!(
            ControlEvent::from_json(r#"{"event":"error","detail":"RVC not initialized"}"#)
                .expect("error"),
            ControlEvent::Error {
                detail: "RVC not initialized".to_string()
            }
        );
    }

    #[test]
    fn error_without_detail_defaults_to_empty() {
        assert_eq!(
            ControlEvent::from_json(r#"{"event":"error"}"#).expect("error"),
            ControlEvent::Error {
                detail: String::new()
            }
        );
    }

    #[test]
    fn rejects_malformed_events() {
        assert!(ControlEvent::from_json("not json").is_err());
        assert!(ControlEvent::from_json(r#"{"event":"bogus"}"#).is_err());
        assert!(ControlEvent::from_json(r#"{"type":"end"}"#).is_err());
    }

    #[test]
    fn ready_round_trips_without_speaker_field() {
        let json = ControlEvent::Ready { speaker: None }
            .to_json()
            .expect("should serialize");
        assert_eq!(json, r#"{"event":"ready"}"#);
    }
}
