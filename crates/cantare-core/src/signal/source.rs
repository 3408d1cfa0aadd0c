use super::{ms_to_frames, SignalSource, CHANNELS};
use arc_swap::ArcSwapOption;
use std::sync::Arc;

/// Mono phrase audio placed on the timeline.
///
/// Created with only its expected extent; samples arrive later from a render
/// worker. Until then the source reports not ready for any range it covers.
#[derive(Debug)]
pub struct WaveSource {
    /// Timeline frame of the first sample; negative when the pass starts mid-phrase.
    offset: i64,
    estimated_frames: usize,
    samples: ArcSwapOption<Vec<f32>>,
}

impl WaveSource {
    /// `offset_ms` is relative to the start of the render pass.
    pub fn new(offset_ms: f64, estimated_length_ms: f64, sample_rate: u32) -> Self {
        Self {
            offset: ms_to_frames(offset_ms, sample_rate),
            estimated_frames: ms_to_frames(estimated_length_ms.max(0.0), sample_rate) as usize,
            samples: ArcSwapOption::empty(),
        }
    }

    pub fn set_samples(&self, samples: Vec<f32>) {
        self.samples.store(Some(Arc::new(samples)));
    }

    /// Mark a failed or cancelled phrase as ready with no audio.
    pub fn set_empty(&self) {
        self.set_samples(Vec::new());
    }

    pub fn has_samples(&self) -> bool {
        self.samples.load().is_some()
    }

    fn covered_end(&self, len: usize) -> i64 {
        self.offset + len as i64
    }

    fn overlaps(&self, position: usize, count: usize, len: usize) -> bool {
        let start = position as i64;
        let end = start + count as i64;
        start < self.covered_end(len) && end > self.offset
    }
}

impl SignalSource for WaveSource {
    fn is_ready(&self, position: usize, count: usize) -> bool {
        self.has_samples() || !self.overlaps(position, count, self.estimated_frames)
    }

    fn mix(&self, position: usize, buffer: &mut [f32]) {
        let guard = self.samples.load();
        let Some(samples) = guard.as_deref() else {
            return;
        };
        let frames = buffer.len() / CHANNELS;
        for (i, frame) in buffer.chunks_exact_mut(CHANNELS).take(frames).enumerate() {
            let idx = position as i64 + i as i64 - self.offset;
            if idx < 0 {
                continue;
            }
            let Some(&s) = samples.get(idx as usize) else {
                break;
            };
            for out in frame.iter_mut() {
                *out += s;
            }
        }
    }

    fn end_frame(&self) -> usize {
        let len = match self.samples.load().as_deref() {
            Some(samples) => samples.len(),
            None => self.estimated_frames,
        };
        self.covered_end(len).max(0) as usize
    }
}

/// Sum of several sources.
#[derive(Default)]
pub struct WaveMix {
    sources: Vec<Arc<dyn SignalSource>>,
}

impl WaveMix {
    pub fn new(sources: Vec<Arc<dyn SignalSource>>) -> Self {
        Self { sources }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl SignalSource for WaveMix {
    fn is_ready(&self, position: usize, count: usize) -> bool {
        self.sources.iter().all(|s| s.is_ready(position, count))
    }

    fn mix(&self, position: usize, buffer: &mut [f32]) {
        for source in &self.sources {
            source.mix(position, buffer);
        }
    }

    fn end_frame(&self) -> usize {
        self.sources.iter().map(|s| s.end_frame()).max().unwrap_or(0)
    }
}
