//! Audio capture: sources, cadence framing and the capture thread.

use crate::audio::codec;
use crate::defaults;
use crate::error::{Result, VoxchainError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Trait for audio source devices.
///
/// This trait allows swapping implementations (real audio device, WAV file, mock).
pub trait AudioSource: Send {
    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing audio from the source.
    fn stop(&mut self) -> Result<()>;

    /// Read the 16-bit PCM samples captured since the last call.
    ///
    /// An empty result means nothing new yet, or end of input for finite sources.
    fn read_samples(&mut self) -> Result<Vec<i16>>;

    /// Whether the source ends on its own (a file) rather than running until stopped.
    fn is_finite(&self) -> bool {
        false
    }
}

/// Mock audio source for testing
#[derive(Debug, Clone)]
pub struct MockAudioSource {
    is_started: bool,
    chunks: Vec<Vec<i16>>,
    position: usize,
    finite: bool,
    should_fail_start: bool,
    should_fail_read: bool,
    error_message: String,
}

impl MockAudioSource {
    /// Create a mock that yields 10 ms of silence per read, forever.
    pub fn new() -> Self {
        Self {
            is_started: false,
            chunks: vec![vec![0i16; 240]],
            position: 0,
            finite: false,
            should_fail_start: false,
            should_fail_read: false,
            error_message: "mock audio error".to_string(),
        }
    }

    /// Yield the same samples on every read.
    pub fn with_samples(mut self, samples: Vec<i16>) -> Self {
        self.chunks = vec![samples];
        self.finite = false;
        self
    }

    /// Yield each chunk once, then report end of input.
    pub fn with_chunks(mut self, chunks: Vec<Vec<i16>>) -> Self {
        self.chunks = chunks;
        self.finite = true;
        self
    }

    /// Configure the mock to fail on start
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the mock to fail on read
    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }

    /// Configure the error message for failures
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Check if the audio source is started
    pub fn is_started(&self) -> bool {
        self.is_started
    }

    fn failure(&self) -> VoxchainError {
        VoxchainError::AudioCapture {
            message: self.error_message.clone(),
        }
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            return Err(self.failure());
        }
        self.is_started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.is_started = false;
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if self.should_fail_read {
            return Err(self.failure());
        }
        if !self.finite {
            return Ok(self.chunks.first().cloned().unwrap_or_default());
        }
        let chunk = self.chunks.get(self.position).cloned().unwrap_or_default();
        self.position += 1;
        Ok(chunk)
    }

    fn is_finite(&self) -> bool {
        self.finite
    }
}

/// Packages captured samples into outbound PCM16 frames at a bounded cadence.
///
/// Samples accumulate until one cadence worth of audio is pending; each
/// emitted frame carries exactly that much. The remainder is flushed by
/// [`CaptureFramer::finish`].
#[derive(Debug, Clone)]
pub struct CaptureFramer {
    frame_samples: usize,
    pending: Vec<i16>,
}

impl CaptureFramer {
    pub fn new(sample_rate: u32, cadence_ms: u32) -> Self {
        let frame_samples = defaults::samples_for_ms(sample_rate, cadence_ms).max(1);
        Self {
            frame_samples,
            pending: Vec::with_capacity(frame_samples * 2),
        }
    }

    /// Samples per emitted frame.
    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    /// Samples waiting for the next frame.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Adds captured samples, returning any frames that are now complete.
    pub fn push(&mut self, samples: &[i16]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(samples);
        let complete = self.pending.len() / self.frame_samples * self.frame_samples;
        if complete == 0 {
            return Vec::new();
        }
        let frames = self.pending[..complete]
            .chunks(self.frame_samples)
            .map(encode_i16)
            .collect();
        self.pending.drain(..complete);
        frames
    }

    /// Emits whatever is pending as a final, possibly short, frame.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            return None;
        }
        let frame = encode_i16(&self.pending);
        self.pending.clear();
        Some(frame)
    }
}

fn encode_i16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Configuration for the capture thread.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub cadence_ms: u32,
    /// Channel buffer size (number of frames to buffer).
    pub channel_buffer_size: usize,
    /// Polling interval when no samples available (ms).
    pub poll_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            cadence_ms: defaults::CAPTURE_CADENCE_MS,
            channel_buffer_size: 256,
            poll_interval_ms: 10,
        }
    }
}

/// What the capture thread produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureChunk {
    /// One cadence worth of PCM16 audio.
    Frame(Vec<u8>),
    /// Capture stopped; no more frames follow.
    End,
}

/// Handle to control a running capture thread.
#[derive(Clone)]
pub struct CaptureHandle {
    running: Arc<AtomicBool>,
}

impl CaptureHandle {
    /// Asks the capture thread to flush and stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Starts `source` and packages its output on a background thread.
///
/// The thread runs until [`CaptureHandle::stop`] is called, a finite source
/// runs dry, a read fails or the receiver is dropped. It always ends with
/// [`CaptureChunk::End`] when the receiver is still there.
pub fn spawn_capture(
    mut source: Box<dyn AudioSource>,
    config: CaptureConfig,
) -> Result<(crossbeam_channel::Receiver<CaptureChunk>, CaptureHandle)> {
    let (tx, rx) = crossbeam_channel::bounded(config.channel_buffer_size);
    let running = Arc::new(AtomicBool::new(true));

    source.start()?;

    let thread_running = Arc::clone(&running);
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    thread::Builder::new()
        .name("voxchain-capture".to_string())
        .spawn(move || {
            let mut framer = CaptureFramer::new(config.sample_rate, config.cadence_ms);
            let finite = source.is_finite();
            'capture: while thread_running.load(Ordering::SeqCst) {
                match source.read_samples() {
                    Ok(samples) if !samples.is_empty() => {
                        for frame in framer.push(&samples) {
                            if tx.send(CaptureChunk::Frame(frame)).is_err() {
                                break 'capture;
                            }
                        }
                    }
                    Ok(_) if finite => break,
                    Ok(_) => thread::sleep(poll_interval),
                    Err(e) => {
                        warn!(error = %e, "audio capture failed");
                        break;
                    }
                }
            }

            if let Err(e) = source.stop() {
                debug!(error = %e, "capture source did not stop cleanly");
            }
            if let Some(frame) = framer.finish()
                && tx.send(CaptureChunk::Frame(frame)).is_err()
            {
                debug!("capture receiver dropped before flush");
            }
            if tx.send(CaptureChunk::End).is_err() {
                debug!("capture receiver dropped before end");
            }
            thread_running.store(false, Ordering::SeqCst);
        })?;

    Ok((rx, CaptureHandle { running }))
}

/// Normalized f32 helper for callers that hold captured i16 audio.
pub fn to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().copied().map(codec::i16_to_f32).collect()
}

#[cfg(feature = "cpal-audio")]
pub use device::{CpalAudioSource, list_input_devices};

#[cfg(feature = "cpal-audio")]
mod device {
    use super::AudioSource;
    use crate::audio::device::{is_preferred_device, should_filter_device, with_suppressed_stderr};
    use crate::audio::wav;
    use crate::error::{Result, VoxchainError};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::{Arc, Mutex};
    use tracing::{error, info};

    /// List input devices, skipping unusable ones and marking recommended ones.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let devices = with_suppressed_stderr(|| cpal::default_host().input_devices()).map_err(
            |e| VoxchainError::AudioCapture {
                message: format!("Failed to enumerate input devices: {}", e),
            },
        )?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                if should_filter_device(&name) {
                    continue;
                }
                if is_preferred_device(&name) {
                    names.push(format!("{} [recommended]", name));
                } else {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    /// Wrapper for cpal::Stream to make it Send.
    ///
    /// SAFETY: the stream is only touched through the Mutex in CpalAudioSource.
    struct SendableStream(cpal::Stream);

    unsafe impl Send for SendableStream {}

    /// Microphone capture through CPAL.
    ///
    /// Captures at the device's native config and converts to mono at the
    /// session rate in software.
    pub struct CpalAudioSource {
        device: cpal::Device,
        stream: Mutex<Option<SendableStream>>,
        buffer: Arc<Mutex<Vec<i16>>>,
        sample_rate: u32,
    }

    impl CpalAudioSource {
        /// Opens the named input device, or the best default when `None`.
        pub fn new(device_name: Option<&str>, sample_rate: u32) -> Result<Self> {
            let device = with_suppressed_stderr(|| {
                let host = cpal::default_host();
                match device_name {
                    Some(name) => host
                        .input_devices()
                        .map_err(|e| VoxchainError::AudioCapture {
                            message: format!("Failed to enumerate devices: {}", e),
                        })?
                        .find(|d| d.name().is_ok_and(|n| n == name))
                        .ok_or_else(|| VoxchainError::AudioDevice {
                            device: name.to_string(),
                        }),
                    None => {
                        if let Ok(devices) = host.input_devices() {
                            for device in devices {
                                if device.name().is_ok_and(|n| is_preferred_device(&n)) {
                                    return Ok(device);
                                }
                            }
                        }
                        host.default_input_device()
                            .ok_or_else(|| VoxchainError::AudioDevice {
                                device: "default".to_string(),
                            })
                    }
                }
            })?;

            Ok(Self {
                device,
                stream: Mutex::new(None),
                buffer: Arc::new(Mutex::new(Vec::new())),
                sample_rate,
            })
        }

        fn build_stream(&self) -> Result<cpal::Stream> {
            use cpal::SampleFormat;

            let default_config =
                self.device
                    .default_input_config()
                    .map_err(|e| VoxchainError::AudioCapture {
                        message: format!("Failed to query default input config: {}", e),
                    })?;

            let native_rate = default_config.sample_rate().0;
            let channels = default_config.channels() as usize;
            let target_rate = self.sample_rate;
            let stream_config: cpal::StreamConfig = default_config.clone().into();

            info!(
                channels,
                native_rate,
                format = ?default_config.sample_format(),
                "capturing at native format"
            );

            let err_callback = |err| error!(error = %err, "input stream error");
            let buffer = Arc::clone(&self.buffer);

            let result = match default_config.sample_format() {
                SampleFormat::I16 => self.device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let mono = wav::downmix(data, channels);
                        let converted = wav::resample(&mono, native_rate, target_rate);
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(&converted);
                        }
                    },
                    err_callback,
                    None,
                ),
                SampleFormat::F32 => self.device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let as_i16: Vec<i16> =
                            data.iter().copied().map(crate::audio::codec::f32_to_i16).collect();
                        let mono = wav::downmix(&as_i16, channels);
                        let converted = wav::resample(&mono, native_rate, target_rate);
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(&converted);
                        }
                    },
                    err_callback,
                    None,
                ),
                fmt => {
                    return Err(VoxchainError::AudioFormat {
                        message: format!("Unsupported input sample format: {:?}", fmt),
                    });
                }
            };
            result.map_err(|e| VoxchainError::AudioCapture {
                message: format!("Failed to build input stream: {}", e),
            })
        }
    }

    impl AudioSource for CpalAudioSource {
        fn start(&mut self) -> Result<()> {
            let mut guard = self.stream.lock().map_err(|e| VoxchainError::AudioCapture {
                message: format!("Failed to lock stream: {}", e),
            })?;
            if guard.is_some() {
                return Ok(());
            }
            let stream = self.build_stream()?;
            stream.play().map_err(|e| VoxchainError::AudioCapture {
                message: format!("Failed to start audio stream: {}", e),
            })?;
            *guard = Some(SendableStream(stream));
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            let mut guard = self.stream.lock().map_err(|e| VoxchainError::AudioCapture {
                message: format!("Failed to lock stream: {}", e),
            })?;
            if let Some(stream) = guard.take() {
                stream.0.pause().map_err(|e| VoxchainError::AudioCapture {
                    message: format!("Failed to stop audio stream: {}", e),
                })?;
            }
            Ok(())
        }

        fn read_samples(&mut self) -> Result<Vec<i16>> {
            let mut buffer = self.buffer.lock().map_err(|e| VoxchainError::AudioCapture {
                message: format!("Failed to lock audio buffer: {}", e),
            })?;
            Ok(std::mem::take(&mut *buffer))
        }
    }

}
