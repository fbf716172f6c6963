//! WAV file audio source for file-driven turns.

use crate::audio::capture::AudioSource;
use crate::defaults;
use crate::error::{Result, VoxchainError};
use std::io::Read;
use std::path::Path;

/// Audio source that replays a WAV file.
///
/// Any sample rate and channel count is accepted; samples are mixed down to
/// mono and resampled to the session rate on load.
pub struct WavAudioSource {
    samples: Vec<i16>,
    sample_rate: u32,
    position: usize,
    chunk_size: usize,
}

impl WavAudioSource {
    /// Decodes WAV data from any reader, resampling to `target_rate`.
    pub fn from_reader(reader: Box<dyn Read + Send>, target_rate: u32) -> Result<Self> {
        let mut wav_reader =
            hound::WavReader::new(reader).map_err(|e| VoxchainError::AudioFormat {
                message: format!("Failed to parse WAV file: {}", e),
            })?;

        let spec = wav_reader.spec();
        if spec.channels == 0 {
            return Err(VoxchainError::AudioFormat {
                message: "WAV file declares zero channels".to_string(),
            });
        }

        let raw_samples: Vec<i16> = match spec.sample_format {
            hound::SampleFormat::Int => wav_reader
                .samples::<i16>()
                .collect::<std::result::Result<Vec<_>, _>>(),
            hound::SampleFormat::Float => wav_reader
                .samples::<f32>()
                .map(|s| s.map(crate::audio::codec::f32_to_i16))
                .collect::<std::result::Result<Vec<_>, _>>(),
        }
        .map_err(|e| VoxchainError::AudioFormat {
            message: format!("Failed to read WAV samples: {}", e),
        })?;

        let mono_samples = downmix(&raw_samples, spec.channels as usize);
        let samples = resample(&mono_samples, spec.sample_rate, target_rate);

        Ok(Self {
            samples,
            sample_rate: target_rate,
            position: 0,
            chunk_size: defaults::samples_for_ms(target_rate, defaults::CAPTURE_CADENCE_MS),
        })
    }

    /// Opens a WAV file from disk.
    pub fn open(path: &Path, target_rate: u32) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(Box::new(std::io::BufReader::new(file)), target_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Consume the source and return all samples as a single buffer.
    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }
}

impl AudioSource for WavAudioSource {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if self.position >= self.samples.len() {
            return Ok(Vec::new());
        }

        let end = std::cmp::min(self.position + self.chunk_size, self.samples.len());
        let chunk = self.samples[self.position..end].to_vec();
        self.position = end;

        Ok(chunk)
    }

    fn is_finite(&self) -> bool {
        true
    }
}

/// Averages interleaved channels into one.
pub(crate) fn downmix(samples: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Simple linear interpolation resampling.
pub(crate) fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn make_wav_data(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    fn load(data: Vec<u8>, rate: u32) -> Result<WavAudioSource> {
        WavAudioSource::from_reader(Box::new(Cursor::new(data)), rate)
    }

    #[test]
    fn same_rate_mono_matches_exactly() {
        let input = vec![100i16, 200, 300, 400, 500];
        let source = load(make_wav_data(24000, 1, &input), 24000).unwrap();
        assert_eq!(source.sample_rate(), 24000);
        assert_eq!(source.into_samples(), input);
    }

    #[test]
    fn stereo_downmixes_to_mono() {
        let stereo = vec![100i16, 200, 300, 400, -500, 500];
        let source = load(make_wav_data(24000, 2, &stereo), 24000).unwrap();
        assert_eq!(source.into_samples(), vec![150i16, 350, 0]);
    }

    #[test]
    fn resamples_to_session_rate() {
        let input = vec![1000i16; 48000];
        let source = load(make_wav_data(48000, 1, &input), 24000).unwrap();
        let samples = source.into_samples();
        assert!((23900..=24100).contains(&samples.len()));
        assert!(samples.iter().all(|&s| (900..=1100).contains(&s)));
    }

    #[test]
    fn float_wav_is_converted() {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 24000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for s in [0.0f32, 0.5, -1.0] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let source = load(cursor.into_inner(), 24000).unwrap();
        assert_eq!(source.into_samples(), vec![0, 16383, -32767]);
    }

    #[test]
    fn reads_in_cadence_sized_chunks() {
        let mut source = load(make_wav_data(24000, 1, &vec![1i16; 5000]), 24000).unwrap();
        assert!(source.is_finite());

        // 100 ms at 24 kHz.
        assert_eq!(source.read_samples().unwrap().len(), 2400);
        assert_eq!(source.read_samples().unwrap().len(), 2400);
        assert_eq!(source.read_samples().unwrap().len(), 200);
        assert!(source.read_samples().unwrap().is_empty());
    }

    #[test]
    fn invalid_wav_data_returns_error() {
        match load(vec![0u8, 1, 2, 3, 4, 5], 24000) {
            Err(VoxchainError::AudioFormat { message }) => {
                assert!(message.contains("Failed to parse WAV file"));
            }
            _ => panic!("Expected AudioFormat error"),
        }
        assert!(load(Vec::new(), 24000).is_err());
        assert!(load(vec![0u8; 1000], 24000).is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = WavAudioSource::open(Path::new("/nonexistent/clip.wav"), 24000);
        assert!(matches!(result, Err(VoxchainError::Io(_))));
    }

    #[test]
    fn resample_upsamples_with_interpolation() {
        let resampled = resample(&[0i16, 1000, 2000], 8000, 16000);
        assert_eq!(resampled.len(), 6);
        assert_eq!(resampled[0], 0);
        assert!(resampled[1] > 0 && resampled[1] < 1000);
        assert_eq!(resampled[2], 1000);
    }

    #[test]
    fn resample_edge_cases() {
        assert!(resample(&[], 16000, 8000).is_empty());
        assert_eq!(resample(&[100i16], 16000, 8000), vec![100]);
        assert_eq!(resample(&[1, 2, 3], 24000, 24000), vec![1, 2, 3]);
    }
}
