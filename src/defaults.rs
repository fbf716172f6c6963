//! Default configuration constants for voxchain.
//!
//! Shared by the config layer, the pipeline and the CLI so every entry point
//! agrees on the same audio format and protocol timing.

/// Default session sample rate in Hz.
///
/// Both the synthesis and the conversion service emit 24kHz mono PCM16.
pub const SAMPLE_RATE: u32 = 24000;

/// Default prebuffer duration in milliseconds.
///
/// Playback does not start until this much audio is buffered, absorbing
/// network jitter between frames.
pub const PREBUFFER_MS: u32 = 100;

/// Default ring buffer duration in seconds.
pub const BUFFER_SECS: u32 = 10;

/// Samples rendered per tick when no audio device dictates the block size
/// (20ms at 24kHz).
pub const RENDER_QUANTUM: usize = 480;

/// Outbound capture cadence in milliseconds.
pub const CAPTURE_CADENCE_MS: u32 = 100;

/// Duration of one outbound PCM16 frame when streaming files.
pub const FRAME_MS: u32 = 20;

/// Default remote service base address.
pub const ENDPOINT: &str = "ws://127.0.0.1:8000";

/// Path of the incremental text-to-speech endpoint.
pub const SYNTHESIS_PATH: &str = "/ws/tts_stream";

/// Path of the one-shot whole-text text-to-speech endpoint.
pub const TTS_PATH: &str = "/ws/tts";

/// Path of the audio-to-audio voice conversion endpoint.
pub const CONVERSION_PATH: &str = "/ws/rvc";

/// Connect timeout in milliseconds.
pub const CONNECT_TIMEOUT_MS: u64 = 5000;

/// Number of samples covering `ms` milliseconds at `sample_rate`.
pub fn samples_for_ms(sample_rate: u32, ms: u32) -> usize {
    (u64::from(sample_rate) * u64::from(ms) / 1000) as usize
}
