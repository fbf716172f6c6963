use crate::defaults;
use crate::error::{Result as VoxResult, VoxchainError};
use crate::pipeline::OutputRoute;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
#[cfg(feature = "cli")]
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub stream: StreamConfig,
    pub pipeline: PipelineConfig,
}

/// Audio format and buffering
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub prebuffer_ms: u32,
    pub buffer_secs: u32,
    pub render_quantum: usize,
    pub capture_cadence_ms: u32,
    pub output_device: Option<String>,
    pub input_device: Option<String>,
}

/// Remote synthesis/conversion service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    pub endpoint: String,
    pub synthesis_path: String,
    pub tts_path: String,
    pub conversion_path: String,
    pub speaker: Option<u32>,
    pub connect_timeout_ms: u64,
}

/// Stage chaining
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub route: OutputRoute,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            prebuffer_ms: defaults::PREBUFFER_MS,
            buffer_secs: defaults::BUFFER_SECS,
            render_quantum: defaults::RENDER_QUANTUM,
            capture_cadence_ms: defaults::CAPTURE_CADENCE_MS,
            output_device: None,
            input_device: None,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::ENDPOINT.to_string(),
            synthesis_path: defaults::SYNTHESIS_PATH.to_string(),
            tts_path: defaults::TTS_PATH.to_string(),
            conversion_path: defaults::CONVERSION_PATH.to_string(),
            speaker: None,
            connect_timeout_ms: defaults::CONNECT_TIMEOUT_MS,
        }
    }
}

impl AudioConfig {
    /// Prebuffer threshold in samples.
    pub fn prebuffer_samples(&self) -> usize {
        defaults::samples_for_ms(self.sample_rate, self.prebuffer_ms)
    }
}

impl StreamConfig {
    /// Full URL of the synthesis endpoint.
    pub fn synthesis_url(&self) -> String {
        join_url(&self.endpoint, &self.synthesis_path)
    }

    /// Full URL of the one-shot synthesis endpoint.
    pub fn tts_url(&self) -> String {
        join_url(&self.endpoint, &self.tts_path)
    }

    /// Full URL of the conversion endpoint.
    pub fn conversion_url(&self) -> String {
        join_url(&self.endpoint, &self.conversion_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXCHAIN_ENDPOINT → stream.endpoint
    /// - VOXCHAIN_ROUTE → pipeline.route
    /// - VOXCHAIN_SPEAKER → stream.speaker
    ///
    /// Unparseable route or speaker values are returned as errors rather
    /// than ignored.
    pub fn with_env_overrides(mut self) -> VoxResult<Self> {
        if let Ok(endpoint) = std::env::var("VOXCHAIN_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.stream.endpoint = endpoint;
        }

        if let Ok(route) = std::env::var("VOXCHAIN_ROUTE")
            && !route.is_empty()
        {
            self.pipeline.route = route.parse()?;
        }

        if let Ok(speaker) = std::env::var("VOXCHAIN_SPEAKER")
            && !speaker.is_empty()
        {
            let id = speaker
                .trim()
                .parse()
                .map_err(|_| VoxchainError::ConfigInvalidValue {
                    key: "stream.speaker".to_string(),
                    message: format!("'{}' is not a speaker id", speaker),
                })?;
            self.stream.speaker = Some(id);
        }

        Ok(self)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> VoxResult<()> {
        let invalid = |key: &str, message: String| VoxchainError::ConfigInvalidValue {
            key: key.to_string(),
            message,
        };

        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be greater than 0".to_string()));
        }
        if self.audio.buffer_secs == 0 {
            return Err(invalid("audio.buffer_secs", "must be greater than 0".to_string()));
        }
        if self.audio.render_quantum == 0 {
            return Err(invalid("audio.render_quantum", "must be greater than 0".to_string()));
        }
        if u64::from(self.audio.prebuffer_ms) > u64::from(self.audio.buffer_secs) * 1000 {
            return Err(invalid(
                "audio.prebuffer_ms",
                format!(
                    "{}ms exceeds the {}s buffer",
                    self.audio.prebuffer_ms, self.audio.buffer_secs
                ),
            ));
        }
        if !(self.stream.endpoint.starts_with("ws://") || self.stream.endpoint.starts_with("wss://"))
        {
            return Err(invalid(
                "stream.endpoint",
                format!("'{}' must start with ws:// or wss://", self.stream.endpoint),
            ));
        }
        Ok(())
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> VoxResult<String> {
        toml::to_string_pretty(self).map_err(|e| VoxchainError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxchain/config.toml on Linux
    #[cfg(feature = "cli")]
    pub fn default_path() -> VoxResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("voxchain").join("config.toml"))
            .ok_or_else(|| VoxchainError::ConfigParse {
                message: "Could not determine config directory".to_string(),
            })
    }
}
