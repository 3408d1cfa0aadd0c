//! Pull-based signal chain.
//!
//! Phrase audio enters as [`WaveSource`]s positioned on the timeline, is summed
//! per track by a [`WaveMix`], scaled and panned by a [`Fader`], and summed
//! again by the master. Buffers are interleaved stereo; positions count frames
//! from the start of the render pass.
//!
//! Two consumers pull the chain: [`MasterAdapter`] for playback, which never
//! blocks and outputs silence while phrases are still rendering, and
//! [`ExportAdapter`] for files, which reads to the end.

mod adapter;
mod fader;
mod output;
mod source;

pub use adapter::{ExportAdapter, MasterAdapter};
pub use fader::Fader;
pub use output::{AudioOutput, DummyAudioOutput, PlaybackState, SampleProvider, SineTone};
pub use source::{WaveMix, WaveSource};

/// Interleaved stereo throughout the chain.
pub const CHANNELS: usize = 2;

/// A node that can be pulled for audio.
pub trait SignalSource: Send + Sync {
    /// Whether every sample overlapping `count` frames from `position` is available.
    fn is_ready(&self, position: usize, count: usize) -> bool;

    /// Add this source's frames starting at `position` into `buffer`.
    fn mix(&self, position: usize, buffer: &mut [f32]);

    /// Frame position after the last frame this source can produce.
    fn end_frame(&self) -> usize;
}

/// Frames covering `ms` at `sample_rate`, rounded.
#[inline]
pub fn ms_to_frames(ms: f64, sample_rate: u32) -> i64 {
    (ms * sample_rate as f64 / 1000.0).round() as i64
}
