//! Error types for voxchain.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxchainError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Transport errors
    #[error("Connection to {endpoint} failed: {message}")]
    Connection { endpoint: String, message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Remote service error: {detail}")]
    Remote { detail: String },

    // Audio device errors
    #[error("Audio device not found: {device}")]
    AudioDevice { device: String },

    #[error("Audio playback failed: {message}")]
    AudioPlayback { message: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    #[error("Unsupported audio format: {message}")]
    AudioFormat { message: String },

    #[error("Operation cancelled")]
    Cancelled,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl VoxchainError {
    /// Builds a connection error for the given endpoint.
    pub fn connection(endpoint: &str, message: impl std::fmt::Display) -> Self {
        Self::Connection {
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VoxchainError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_connection_display() {
        let error = VoxchainError::connection("ws://127.0.0.1:8000/ws/rvc", "refused");
        assert_eq!(
            error.to_string(),
            "Connection to ws://127.0.0.1:8000/ws/rvc failed: refused"
        );
    }

    #[test]
    fn test_remote_display() {
        let error = VoxchainError::Remote {
            detail: "RVC not initialized".to_string(),
        };
        assert_eq!(error.to_string(), "Remote service error: RVC not initialized");
    }

    #[test]
    fn test_protocol_display() {
        let error = VoxchainError::Protocol {
            message: "expected object".to_string(),
        };
        assert_eq!(error.to_string(), "Protocol error: expected object");
    }

    #[test]
    fn test_config_invalid_value_display() {
        let error = VoxchainError::ConfigInvalidValue {
            key: "audio.sample_rate".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for audio.sample_rate: must be positive"
        );
    }

    #[test]
    fn test_audio_device_display() {
        let error = VoxchainError::AudioDevice {
            device: "default".to_string(),
        };
        assert_eq!(error.to_string(), "Audio device not found: default");
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: VoxchainError = io_error.into();
        assert!(error.to_string().contains("file not found"));

        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: VoxchainError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<VoxchainError>();
        assert_sync::<VoxchainError>();
    }
}
