use super::{SignalSource, CHANNELS};
use crate::lockfree::{AtomicFlag, AtomicFloat};
use crate::music::pan_gains;
use parking_lot::Mutex;
use std::sync::Arc;

/// Per-track gain and pan stage.
///
/// Scale, pan and mute are written by command threads and read by the pull
/// loop. Gain changes ramp linearly across one pulled buffer.
pub struct Fader {
    source: Arc<dyn SignalSource>,
    scale: AtomicFloat,
    pan: AtomicFloat,
    muted: AtomicFlag,
    // Gains applied at the end of the previous buffer.
    last_left: AtomicFloat,
    last_right: AtomicFloat,
    scratch: Mutex<Vec<f32>>,
}

impl Fader {
    pub fn new(source: Arc<dyn SignalSource>) -> Self {
        Self {
            source,
            scale: AtomicFloat::new(1.0),
            pan: AtomicFloat::new(0.0),
            muted: AtomicFlag::new(false),
            last_left: AtomicFloat::new(1.0),
            last_right: AtomicFloat::new(1.0),
            scratch: Mutex::new(Vec::new()),
        }
    }

    /// Start at the given settings without a ramp from unity.
    pub fn with_settings(source: Arc<dyn SignalSource>, scale: f32, pan: f32, muted: bool) -> Self {
        let fader = Self::new(source);
        fader.scale.set(scale);
        fader.pan.set(pan);
        fader.muted.set(muted);
        let (left, right) = fader.target_gains();
        fader.last_left.set(left);
        fader.last_right.set(right);
        fader
    }

    pub fn scale(&self) -> f32 {
        self.scale.get()
    }

    pub fn set_scale(&self, scale: f32) {
        self.scale.set(scale.max(0.0));
    }

    pub fn pan(&self) -> f32 {
        self.pan.get()
    }

    /// `pan` in [-100, 100].
    pub fn set_pan(&self, pan: f32) {
        self.pan.set(pan.clamp(-100.0, 100.0));
    }

    pub fn is_muted(&self) -> bool {
        self.muted.get()
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.set(muted);
    }

    fn target_gains(&self) -> (f32, f32) {
        if self.muted.get() {
            return (0.0, 0.0);
        }
        let scale = self.scale.get();
        let (left, right) = pan_gains(self.pan.get());
        (left * scale, right * scale)
    }
}

impl SignalSource for Fader {
    fn is_ready(&self, position: usize, count: usize) -> bool {
        self.source.is_ready(position, count)
    }

    fn mix(&self, position: usize, buffer: &mut [f32]) {
        let mut scratch = self.scratch.lock();
        scratch.clear();
        scratch.resize(buffer.len(), 0.0);
        self.source.mix(position, &mut scratch);

        let (to_left, to_right) = self.target_gains();
        let from_left = self.last_left.get();
        let from_right = self.last_right.get();
        let frames = buffer.len() / CHANNELS;

        for (i, (out, input)) in buffer
            .chunks_exact_mut(CHANNELS)
            .zip(scratch.chunks_exact(CHANNELS))
            .enumerate()
        {
            let t = (i + 1) as f32 / frames as f32;
            out[0] += input[0] * (from_left + (to_left - from_left) * t);
            out[1] += input[1] * (from_right + (to_right - from_right) * t);
        }

        self.last_left.set(to_left);
        self.last_right.set(to_right);
    }

    fn end_frame(&self) -> usize {
        self.source.end_frame()
    }
}
