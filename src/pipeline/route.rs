//! Output routing for a turn.

use crate::error::VoxchainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a turn's upstream output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputRoute {
    /// Upstream audio straight to the output ring.
    #[default]
    Playback,
    /// Upstream audio forwarded to the conversion stage; converted audio plays.
    #[serde(rename = "convert")]
    ConvertAudio,
    /// Upstream text forwarded to the synthesis stage; synthesized audio plays.
    #[serde(rename = "synthesize")]
    SynthesizeText,
    /// Upstream text collected for the whole turn and synthesized in one
    /// request once the upstream completes.
    #[serde(rename = "synthesize_whole")]
    SynthesizeWhole,
}

impl OutputRoute {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Playback => "playback",
            Self::ConvertAudio => "convert",
            Self::SynthesizeText => "synthesize",
            Self::SynthesizeWhole => "synthesize_whole",
        }
    }

    /// True when the route needs a remote stage.
    pub fn uses_network(self) -> bool {
        !matches!(self, Self::Playback)
    }
}

impl fmt::Display for OutputRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputRoute {
    type Err = VoxchainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "playback" | "direct" | "none" => Ok(Self::Playback),
            "convert" | "conversion" | "rvc" => Ok(Self::ConvertAudio),
            "synthesize" | "synthesis" | "tts" | "tts_stream" => Ok(Self::SynthesizeText),
            "synthesize_whole" | "whole" => Ok(Self::SynthesizeWhole),
            other => Err(VoxchainError::ConfigInvalidValue {
                key: "pipeline.route".to_string(),
                message: format!(
                    "unknown route '{}', expected playback, convert, synthesize or synthesize_whole",
                    other
                ),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("playback".parse::<OutputRoute>().unwrap(), OutputRoute::Playback);
        assert_eq!("RVC".parse::<OutputRoute>().unwrap(), OutputRoute::ConvertAudio);
        assert_eq!(" tts ".parse::<OutputRoute>().unwrap(), OutputRoute::SynthesizeText);
        assert_eq!("whole".parse::<OutputRoute>().unwrap(), OutputRoute::SynthesizeWhole);
    }

    #[test]
    fn unknown_route_is_config_error() {
        match "speakers".parse::<OutputRoute>() {
            Err(VoxchainError::ConfigInvalidValue { key, message }) => {
                assert_eq!(key, "pipeline.route");
                assert!(message.contains("speakers"));
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn serde_uses_short_names() {
        #[derive(Deserialize, Serialize)]
        struct Wrapper {
            route: OutputRoute,
        }
        let parsed: Wrapper = toml::from_str("route = \"synthesize\"").unwrap();
        assert_eq!(parsed.route, OutputRoute::SynthesizeText);

        let out = toml::to_string(&Wrapper {
            route: OutputRoute::ConvertAudio,
        })
        .unwrap();
        assert!(out.contains("route = \"convert\""));
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for route in [
            OutputRoute::Playback,
            OutputRoute::ConvertAudio,
            OutputRoute::SynthesizeText,
            OutputRoute::SynthesizeWhole,
        ] {
            assert_eq!(route.to_string().parse::<OutputRoute>().unwrap(), route);
        }
        assert!(!OutputRoute::Playback.uses_network());
        assert!(OutputRoute::ConvertAudio.uses_network());
        assert!(OutputRoute::SynthesizeWhole.uses_network());
    }
}
