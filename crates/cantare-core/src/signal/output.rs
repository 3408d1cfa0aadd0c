use super::CHANNELS;
use crate::lockfree::{AtomicFlag, AtomicFloat};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Interleaved stereo stream pulled by an audio output.
pub trait SampleProvider: Send + Sync {
    /// Fill `buffer`; returns the samples written. Fewer than `buffer.len()`
    /// means the stream has ended.
    fn read(&self, buffer: &mut [f32]) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Sink that consumes a [`SampleProvider`], typically an audio device.
pub trait AudioOutput: Send + Sync {
    /// Replace the current stream. Leaves the output stopped.
    fn init(&self, provider: Arc<dyn SampleProvider>);
    fn play(&self);
    fn pause(&self);
    fn stop(&self);
    fn state(&self) -> PlaybackState;
    /// Frames consumed since the last `init`.
    fn position(&self) -> usize;
}

/// Output without a device; the owner pulls audio with [`DummyAudioOutput::pull`].
#[derive(Default)]
pub struct DummyAudioOutput {
    provider: Mutex<Option<Arc<dyn SampleProvider>>>,
    state: Mutex<PlaybackState>,
    position: AtomicUsize,
}

impl DummyAudioOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull `frames` frames as the device callback would. Silent unless playing.
    pub fn pull(&self, frames: usize) -> Vec<f32> {
        let mut buffer = vec![0.0; frames * CHANNELS];
        if self.state() != PlaybackState::Playing {
            return buffer;
        }
        let provider = self.provider.lock().clone();
        if let Some(provider) = provider {
            let written = provider.read(&mut buffer);
            self.position
                .fetch_add(written / CHANNELS, Ordering::AcqRel);
            if written < buffer.len() {
                *self.state.lock() = PlaybackState::Stopped;
            }
        }
        buffer
    }
}

impl AudioOutput for DummyAudioOutput {
    fn init(&self, provider: Arc<dyn SampleProvider>) {
        *self.provider.lock() = Some(provider);
        *self.state.lock() = PlaybackState::Stopped;
        self.position.store(0, Ordering::Release);
    }

    fn play(&self) {
        if self.provider.lock().is_some() {
            *self.state.lock() = PlaybackState::Playing;
        }
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        if *state == PlaybackState::Playing {
            *state = PlaybackState::Paused;
        }
    }

    fn stop(&self) {
        *self.state.lock() = PlaybackState::Stopped;
    }

    fn state(&self) -> PlaybackState {
        *self.state.lock()
    }

    fn position(&self) -> usize {
        self.position.load(Ordering::Acquire)
    }
}

/// Test tone that fades out once stopped.
pub struct SineTone {
    freq: AtomicFloat,
    stopping: AtomicFlag,
    sample_rate: u32,
    // (phase, remaining fade frames)
    state: Mutex<(f64, u32)>,
}

impl SineTone {
    const AMPLITUDE: f64 = 0.2;
    const FADE_FRAMES: u32 = 100;

    pub fn new(freq: f32, sample_rate: u32) -> Self {
        Self {
            freq: AtomicFloat::new(freq),
            stopping: AtomicFlag::new(false),
            sample_rate,
            state: Mutex::new((0.0, Self::FADE_FRAMES)),
        }
    }

    pub fn set_freq(&self, freq: f32) {
        self.freq.set(freq);
    }

    pub fn stop(&self) {
        self.stopping.set(true);
    }
}

impl SampleProvider for SineTone {
    fn read(&self, buffer: &mut [f32]) -> usize {
        let delta = std::f64::consts::TAU * self.freq.get() as f64 / self.sample_rate as f64;
        let stopping = self.stopping.get();
        let mut state = self.state.lock();
        let (phase, remaining) = &mut *state;
        for (i, frame) in buffer.chunks_exact_mut(CHANNELS).enumerate() {
            if stopping {
                *remaining = remaining.saturating_sub(1);
            }
            if *remaining == 0 {
                return i * CHANNELS;
            }
            *phase += delta;
            let gain = *remaining as f64 / Self::FADE_FRAMES as f64;
            let value = (phase.sin() * Self::AMPLITUDE * gain) as f32;
            frame.fill(value);
        }
        buffer.len() - buffer.len() % CHANNELS
    }
}
