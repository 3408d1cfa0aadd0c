use super::output::SampleProvider;
use super::{SignalSource, CHANNELS};
use crate::lockfree::AtomicFlag;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Streaming view of the master mix for an audio output.
///
/// `read` never blocks: when the range ahead is not rendered yet it returns
/// silence, counts the frames as waited and leaves the read position in place.
/// Past the end of the mix it returns a short read, ending the stream.
pub struct MasterAdapter {
    source: Arc<dyn SignalSource>,
    sample_rate: u32,
    position: AtomicUsize,
    waited: AtomicUsize,
    waiting: AtomicFlag,
}

impl MasterAdapter {
    pub fn new(source: Arc<dyn SignalSource>, sample_rate: u32) -> Self {
        Self {
            source,
            sample_rate,
            position: AtomicUsize::new(0),
            waited: AtomicUsize::new(0),
            waiting: AtomicFlag::new(false),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames of real audio consumed so far.
    pub fn position(&self) -> usize {
        self.position.load(Ordering::Acquire)
    }

    /// Frames of silence emitted while waiting for renders.
    pub fn waited(&self) -> usize {
        self.waited.load(Ordering::Acquire)
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting.get()
    }

    pub fn end_frame(&self) -> usize {
        self.source.end_frame()
    }
}

impl SampleProvider for MasterAdapter {
    fn read(&self, buffer: &mut [f32]) -> usize {
        buffer.fill(0.0);
        let position = self.position();
        let frames = (buffer.len() / CHANNELS).min(self.source.end_frame().saturating_sub(position));
        if frames == 0 {
            self.waiting.set(false);
            return 0;
        }
        if !self.source.is_ready(position, frames) {
            self.waiting.set(true);
            self.waited.fetch_add(buffer.len() / CHANNELS, Ordering::AcqRel);
            return buffer.len();
        }
        self.waiting.set(false);
        let written = frames * CHANNELS;
        self.source.mix(position, &mut buffer[..written]);
        self.position.fetch_add(frames, Ordering::AcqRel);
        written
    }
}

/// Synchronous reader that pulls a source from frame 0 to its end.
pub struct ExportAdapter {
    source: Arc<dyn SignalSource>,
}

impl ExportAdapter {
    const BLOCK_FRAMES: usize = 4096;

    pub fn new(source: Arc<dyn SignalSource>) -> Self {
        Self { source }
    }

    /// Whole source as interleaved stereo.
    pub fn read_to_end(&self) -> Vec<f32> {
        let end = self.source.end_frame();
        let mut out = vec![0.0; end * CHANNELS];
        let mut position = 0;
        for block in out.chunks_mut(Self::BLOCK_FRAMES * CHANNELS) {
            self.source.mix(position, block);
            position += block.len() / CHANNELS;
        }
        out
    }

    /// Whole source folded to mono as `(left + right) / 2`.
    pub fn to_mono(&self) -> Vec<f32> {
        self.read_to_end()
            .chunks_exact(CHANNELS)
            .map(|frame| (frame[0] + frame[1]) * 0.5)
            .collect()
    }
}
