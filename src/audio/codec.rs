//! PCM16 codec and frame types.
//!
//! Network peers exchange little-endian signed 16-bit mono PCM. Playback and
//! the ring buffer work on normalized `f32` samples in `[-1, 1]`.
//!
//! A trailing odd byte in a binary message is dropped: peers are expected to
//! send whole samples, and a partial sample is not carried over to the next
//! message.

use crate::defaults::samples_for_ms;

/// Scale used when decoding PCM16 into floats.
const DECODE_SCALE: f32 = 32768.0;

/// Scale used when encoding floats into PCM16.
const ENCODE_SCALE: f32 = 32767.0;

/// Decodes little-endian PCM16 bytes into normalized float samples.
pub fn decode(bytes: &[u8]) -> Vec<f32> {
    let mut out = Vec::with_capacity(bytes.len() / 2);
    decode_into(bytes, &mut out);
    out
}

/// Decodes into an existing buffer, appending to it.
pub fn decode_into(bytes: &[u8], out: &mut Vec<f32>) {
    out.extend(
        bytes
            .chunks_exact(2)
            .map(|pair| i16_to_f32(i16::from_le_bytes([pair[0], pair[1]]))),
    );
}

/// Encodes float samples as little-endian PCM16 bytes.
///
/// Samples are clamped to `[-1, 1]`, scaled by 32767 and truncated.
pub fn encode(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        out.extend_from_slice(&f32_to_i16(sample).to_le_bytes());
    }
    out
}

/// Converts one PCM16 sample to a normalized float.
pub fn i16_to_f32(sample: i16) -> f32 {
    (f32::from(sample) / DECODE_SCALE).clamp(-1.0, 1.0)
}

/// Converts one normalized float to PCM16, truncating toward zero.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * ENCODE_SCALE) as i16
}

/// Splits float samples into PCM16 frames of exactly `frame_ms` each.
///
/// The last frame is zero-padded to full length. Returns no frames when the
/// frame size rounds down to zero samples.
pub fn frame_pcm16(samples: &[f32], sample_rate: u32, frame_ms: u32) -> Vec<Vec<u8>> {
    let frame_len = samples_for_ms(sample_rate, frame_ms);
    if frame_len == 0 {
        return Vec::new();
    }

    samples
        .chunks(frame_len)
        .map(|chunk| {
            let mut frame = encode(chunk);
            frame.resize(frame_len * 2, 0);
            frame
        })
        .collect()
}

/// One decoded inbound binary message: mono PCM16 at a known rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Audio samples as 16-bit PCM.
    pub samples: Vec<i16>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioFrame {
    /// Creates a new audio frame.
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Parses PCM16 bytes, dropping a trailing odd byte.
    pub fn from_pcm16(bytes: &[u8], sample_rate: u32) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Self::new(samples, sample_rate)
    }

    /// Appends the frame's samples to `out` as normalized floats.
    pub fn extend_f32(&self, out: &mut Vec<f32>) {
        out.extend(self.samples.iter().map(|&s| i16_to_f32(s)));
    }

    /// Returns the duration of this frame in milliseconds.
    pub fn duration_ms(&self) -> u32 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * 1000 / u64::from(self.sample_rate)) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
