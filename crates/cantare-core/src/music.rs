//! Pitch and gain conversions.

/// MIDI tone (semitones, A4 = 69) to frequency in Hz.
#[inline]
pub fn tone_to_freq(tone: f64) -> f64 {
    440.0 * 2f64.powf((tone - 69.0) / 12.0)
}

#[inline]
pub fn decibel_to_linear(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Fader control in dB to linear gain.
///
/// Silent at or below -24 dB; between -24 and -16 dB the slope is doubled so
/// the fader fades out smoothly instead of jumping to silence.
pub fn decibel_to_volume(db: f64) -> f32 {
    if db <= -24.0 {
        0.0
    } else if db < -16.0 {
        decibel_to_linear(db * 2.0 + 16.0) as f32
    } else {
        decibel_to_linear(db) as f32
    }
}

/// Balance pan law: `pan` in [-100, 100]; the centered side stays at unity.
#[inline]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-100.0, 100.0) / 100.0;
    let left = if pan > 0.0 { 1.0 - pan } else { 1.0 };
    let right = if pan < 0.0 { 1.0 + pan } else { 1.0 };
    (left, right)
}
