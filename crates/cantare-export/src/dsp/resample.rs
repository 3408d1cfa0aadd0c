//! Audio resampling using rubato
//!
//! Converts rendered phrases from the vocoder's sample rate to the output rate.

use crate::error::Result;
use rubato::{FftFixedIn, Resampler};

/// Resampling quality presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResampleQuality {
    /// Fast resampling (lower quality)
    Fast,
    /// Balanced quality/speed (default)
    #[default]
    Medium,
    /// High quality
    High,
}

impl ResampleQuality {
    fn chunk_size(&self) -> usize {
        match self {
            ResampleQuality::Fast => 512,
            ResampleQuality::Medium => 1024,
            ResampleQuality::High => 2048,
        }
    }

    fn sub_chunks(&self) -> usize {
        match self {
            ResampleQuality::Fast => 1,
            ResampleQuality::Medium => 2,
            ResampleQuality::High => 4,
        }
    }
}

/// Resample mono audio from `source_rate` to `target_rate`.
///
/// The output holds `ceil(len * target / source)` samples. Equal rates return
/// a copy of the input.
pub fn resample_mono(
    samples: &[f32],
    source_rate: u32,
    target_rate: u32,
    quality: ResampleQuality,
) -> Result<Vec<f32>> {
    if source_rate == target_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let chunk_size = quality.chunk_size();
    let mut resampler = FftFixedIn::<f32>::new(
        source_rate as usize,
        target_rate as usize,
        chunk_size,
        quality.sub_chunks(),
        1,
    )?;

    let expected_frames =
        (samples.len() as f64 * target_rate as f64 / source_rate as f64).ceil() as usize;
    // The FFT resampler delays its output; feed zeros until that is flushed too.
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected_frames + delay + chunk_size);

    let mut pos = 0;
    while output.len() < expected_frames + delay {
        let needed = resampler.input_frames_next();
        let mut chunk = vec![0.0f32; needed];
        if pos < samples.len() {
            let copy = needed.min(samples.len() - pos);
            chunk[..copy].copy_from_slice(&samples[pos..pos + copy]);
        }
        let out = resampler.process(&[chunk], None)?;
        output.extend_from_slice(&out[0]);
        pos += needed;
    }

    Ok(output.into_iter().skip(delay).take(expected_frames).collect())
}
