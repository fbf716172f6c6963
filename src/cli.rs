//! Command-line interface for voxchain
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Streaming speech synthesis and voice conversion client
#[derive(Parser, Debug)]
#[command(
    name = "voxchain",
    version,
    about = "Streaming speech synthesis and voice conversion client"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: stream lifecycle, -vv: full diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Service base address (e.g., ws://127.0.0.1:8000)
    #[arg(long, global = true, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Audio output device
    #[arg(long, global = true, value_name = "DEVICE")]
    pub output_device: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Synthesize text through the streaming synthesis service and play it
    Speak {
        /// Text to speak
        text: String,

        /// Speaker id (server default when omitted)
        #[arg(long, value_name = "ID")]
        speaker: Option<u32>,

        /// Words per text fragment sent to the service
        #[arg(long, value_name = "N", default_value = "3")]
        words_per_chunk: usize,

        /// Send the whole text in one request to the one-shot endpoint
        #[arg(long)]
        whole: bool,
    },

    /// Stream audio through the voice conversion service and play the result
    Convert {
        /// WAV file to convert (default: microphone until Ctrl-C)
        wav: Option<PathBuf>,

        /// Audio input device for microphone capture
        #[arg(long, value_name = "DEVICE")]
        input_device: Option<String>,
    },

    /// Play a WAV file through the local playback path
    Play {
        /// WAV file to play
        wav: PathBuf,
    },

    /// List available audio devices
    Devices,

    /// Inspect configuration
    Config {
        /// Action to perform
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}
