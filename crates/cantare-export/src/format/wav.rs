//! WAV encoding and decoding using hound
//!
//! Rendered phrases and exports are written as mono files; reading accepts any
//! PCM or float WAV and folds it to mono.

use crate::error::{ExportError, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs::OpenOptions;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

/// Mono 16-bit PCM encoder configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavConfig {
    pub sample_rate: u32,
}

impl Default for WavConfig {
    fn default() -> Self {
        Self { sample_rate: 44100 }
    }
}

impl WavConfig {
    /// 16-bit PCM at `sample_rate`, the format of caches and exports.
    pub fn pcm16(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    fn spec(&self) -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }
}

/// Write mono samples to `path`.
///
/// The file is assembled in a temporary file in the same directory and renamed
/// over `path` once finalized.
pub fn write_wav_mono(path: &Path, samples: &[f32], config: &WavConfig) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".cantare-")
        .suffix(".wav.tmp")
        .tempfile_in(dir)
        .map_err(|e| ExportError::write(path, e))?;

    {
        let mut writer = WavWriter::new(BufWriter::new(tmp.as_file_mut()), config.spec())?;
        write_mono_samples(&mut writer, samples)?;
        writer.finalize()?;
    }

    tmp.persist(path)
        .map_err(|e| ExportError::write(path, e.error))?;
    log::debug!("wrote {} samples to {}", samples.len(), path.display());
    Ok(())
}

/// Read a WAV file, averaging all channels to mono.
///
/// Returns the samples and the file's sample rate.
pub fn read_wav_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    if channels == 1 {
        return Ok((interleaved, spec.sample_rate));
    }
    let mono = interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();
    Ok((mono, spec.sample_rate))
}

/// Samples exactly as they read back after a 16-bit round trip.
pub fn quantize_i16(samples: &[f32]) -> Vec<f32> {
    samples
        .iter()
        .map(|&s| i16_to_float(float_to_i16(s)))
        .collect()
}

/// Fail early if an existing `path` cannot be opened for writing.
pub fn check_writable(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map(|_| ())
        .map_err(|e| ExportError::write(path, e))
}

fn write_mono_samples<W: Write + Seek>(writer: &mut WavWriter<W>, samples: &[f32]) -> Result<()> {
    for &sample in samples {
        writer.write_sample(float_to_i16(sample))?;
    }
    Ok(())
}

/// Convert a float sample to 16-bit with clipping; the inverse of [`i16_to_float`].
#[inline]
fn float_to_i16(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}

#[inline]
fn i16_to_float(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_float_to_i16() {
        assert_eq!(float_to_i16(0.0), 0);
        assert_eq!(float_to_i16(1.0), 32767);
        assert_eq!(float_to_i16(-1.0), -32768);
        assert_eq!(float_to_i16(1.5), 32767);
        assert_eq!(float_to_i16(-1.5), -32768);
        assert_eq!(float_to_i16(0.5), 16384);
    }

    #[test]
    fn test_quantized_samples_survive_requantization() {
        let once = quantize_i16(&[0.5, 0.1, -0.25, 0.49996948, 0.099975586, -0.24996948]);
        assert_eq!(quantize_i16(&once), once);
        assert_eq!(once[0], 0.5);
        assert_eq!(once[2], -0.25);
    }

    #[test]
    fn test_rewritten_file_reads_back_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.wav");
        let second = dir.path().join("second.wav");
        let samples: Vec<f32> = (0..200).map(|i| (i as f32 * 0.37).sin() * 0.9).collect();

        write_wav_mono(&first, &samples, &WavConfig::pcm16(8000)).unwrap();
        let (read, _) = read_wav_mono(&first).unwrap();
        write_wav_mono(&second, &read, &WavConfig::pcm16(8000)).unwrap();
        let (reread, _) = read_wav_mono(&second).unwrap();

        assert_eq!(read, reread);
    }

    #[test]
    fn test_write_then_read_matches_quantized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roundtrip.wav");
        let samples: Vec<f32> = (0..100).map(|i| (i as f32 * 0.1).sin() * 0.8).collect();

        write_wav_mono(&path, &samples, &WavConfig::pcm16(22050)).unwrap();
        let (read, rate) = read_wav_mono(&path).unwrap();

        assert_eq!(rate, 22050);
        assert_eq!(read, quantize_i16(&samples));
    }

    #[test]
    fn test_stereo_file_folds_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for (l, r) in [(1.0f32, 0.0f32), (0.5, 0.5), (-1.0, 0.0)] {
            writer.write_sample(l).unwrap();
            writer.write_sample(r).unwrap();
        }
        writer.finalize().unwrap();

        let (mono, _) = read_wav_mono(&path).unwrap();
        assert_eq!(mono, vec![0.5, 0.5, -0.5]);
    }

    #[test]
    fn test_write_into_missing_dir_reports_path() {
        let path = Path::new("/nonexistent-cantare-dir/out.wav");
        let err = write_wav_mono(path, &[0.0], &WavConfig::default()).unwrap_err();
        match err {
            ExportError::Write { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_read_garbage_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"not a wav file").unwrap();
        assert!(read_wav_mono(&path).is_err());
    }

    proptest! {
        #[test]
        fn prop_quantize_is_idempotent(samples in proptest::collection::vec(-1.5f32..1.5, 0..64)) {
            let once = quantize_i16(&samples);
            prop_assert_eq!(quantize_i16(&once), once);
        }
    }
}
