//! Playback: the render-side consumer of a session's ring.
//!
//! [`PlaybackSink`] is driven once per device callback. It never allocates
//! and never logs; every call fills the whole output block, with silence
//! where no audio is ready. Drain completion is signalled through the
//! session's `Notify`.

use crate::session::StreamSession;
use std::sync::Arc;

/// Prebuffer gate and drain detection in front of a session's ring.
///
/// The sink counts as primed once `prebuffer` samples are buffered, or as
/// soon as any audio is buffered after the peer sent `end`. Every render
/// returns the samples that are buffered and pads the shortfall with
/// silence; the render callback never waits for the threshold. When the ring
/// runs dry the gate closes again.
#[derive(Debug)]
pub struct PlaybackSink {
    session: Arc<StreamSession>,
    prebuffer: usize,
    playing: bool,
}

impl PlaybackSink {
    pub fn new(session: Arc<StreamSession>, prebuffer: usize) -> Self {
        Self {
            session,
            prebuffer,
            playing: false,
        }
    }

    pub fn session(&self) -> &Arc<StreamSession> {
        &self.session
    }

    /// True while the gate is open.
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Fills `out` with the next block of audio.
    ///
    /// Checks for drain completion first, then pulls whatever is buffered.
    /// Returns how many samples were real audio; the rest of `out` is
    /// silence. The gate only tracks whether playback has been primed.
    pub fn render(&mut self, out: &mut [f32]) -> usize {
        self.session.poll_drain();

        let ring = self.session.ring();
        if !self.playing {
            let buffered = ring.len();
            self.playing = buffered >= self.prebuffer.max(1)
                || (self.session.end_received() && buffered > 0);
        }

        let filled = ring.pull_into(out);
        if filled < out.len() {
            self.playing = false;
        }
        filled
    }
}

#[cfg(feature = "cpal-audio")]
pub use device::OutputDevice;

#[cfg(feature = "cpal-audio")]
mod device {
    use super::PlaybackSink;
    use crate::audio::device::find_output_device;
    use crate::error::{Result, VoxchainError};
    use cpal::traits::{DeviceTrait, StreamTrait};
    use cpal::{SampleRate, StreamConfig};
    use tracing::{debug, error};

    /// Wrapper for cpal::Stream to make it Send.
    ///
    /// SAFETY: the stream is created, played and dropped by the owner of
    /// `OutputDevice`; it is never shared.
    struct SendableStream(cpal::Stream);

    unsafe impl Send for SendableStream {}

    /// An open output stream rendering a [`PlaybackSink`].
    pub struct OutputDevice {
        stream: SendableStream,
        config: StreamConfig,
    }

    impl OutputDevice {
        /// Opens an output stream at `sample_rate` and starts rendering.
        ///
        /// Mono samples are duplicated across the device's channels. The
        /// sink is rendered in blocks of at most `render_quantum` samples.
        pub fn open(
            device_name: Option<&str>,
            sample_rate: u32,
            render_quantum: usize,
            mut sink: PlaybackSink,
        ) -> Result<Self> {
            let device = find_output_device(device_name)?;

            let rate = SampleRate(sample_rate);
            let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
                c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
            };
            let supported = device
                .supported_output_configs()
                .map_err(|e| VoxchainError::AudioPlayback {
                    message: e.to_string(),
                })?
                .find(|c| supports(c, 1))
                .or_else(|| {
                    device
                        .supported_output_configs()
                        .ok()?
                        .find(|c| supports(c, 2))
                })
                .ok_or_else(|| VoxchainError::AudioFormat {
                    message: format!("no output config supports {} Hz", sample_rate),
                })?;

            let config = supported.with_sample_rate(rate).config();
            let channels = config.channels as usize;
            let mut scratch = vec![0.0f32; render_quantum.max(1)];

            let stream = device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        for block in data.chunks_mut(scratch.len() * channels) {
                            let frames = block.len() / channels;
                            let mono = &mut scratch[..frames];
                            sink.render(mono);
                            for (frame, &sample) in block.chunks_mut(channels).zip(mono.iter()) {
                                frame.fill(sample);
                            }
                        }
                    },
                    |err| {
                        error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| VoxchainError::AudioPlayback {
                    message: format!("Failed to build output stream: {}", e),
                })?;

            stream.play().map_err(|e| VoxchainError::AudioPlayback {
                message: format!("Failed to start output stream: {}", e),
            })?;

            debug!(
                device = %device.name().unwrap_or_default(),
                sample_rate,
                channels,
                render_quantum,
                "audio playback started"
            );

            Ok(Self {
                stream: SendableStream(stream),
                config,
            })
        }

        pub fn channels(&self) -> u16 {
            self.config.channels
        }

        /// Pauses the output stream.
        pub fn pause(&self) -> Result<()> {
            self.stream
                .0
                .pause()
                .map_err(|e| VoxchainError::AudioPlayback {
                    message: format!("Failed to pause output stream: {}", e),
                })
        }
    }

}
