//! Stage chaining.
//!
//! ```text
//!  upstream ──▶ PipelineController ──▶ Playback ──────────────────────┐
//!  (text/audio)        │                                              ▼
//!                      ├──▶ ConvertAudio ──▶ conversion StageLink ──▶ output ring ──▶ PlaybackSink
//!                      ├──▶ SynthesizeText ─▶ synthesis StageLink ──▶
//!                      └──▶ SynthesizeWhole ─▶ tts StageLink ────────▶
//! ```

pub mod controller;
pub mod link;
pub mod route;
pub mod text;
pub mod upstream;

pub use controller::{ControllerConfig, PipelineController, TurnOutcome};
pub use link::StageLink;
pub use route::OutputRoute;
pub use text::TextAccumulator;
pub use upstream::UpstreamEvent;
