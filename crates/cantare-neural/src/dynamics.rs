use cantare_core::{expr, RenderPhrase};

/// Gain of a `dyn` curve value in dB; silent at or below -24 dB.
#[inline]
fn dyn_gain(db: f64) -> f32 {
    if db <= -24.0 {
        0.0
    } else {
        10f64.powf(db / 20.0) as f32
    }
}

/// Apply the phrase's `dyn` curve as a per-sample gain envelope.
///
/// Sample `i` sits at `i / sample_rate - leading_ms` on the phrase clock.
/// Samples are left untouched when the phrase has no `dyn` curve.
pub fn apply_dynamics(phrase: &RenderPhrase, samples: &mut [f32], leading_ms: f64, sample_rate: u32) {
    let Some(curve) = phrase.curve(expr::DYN).filter(|c| !c.is_empty()) else {
        return;
    };
    let ms_per_sample = 1000.0 / sample_rate as f64;
    for (i, sample) in samples.iter_mut().enumerate() {
        let t = i as f64 * ms_per_sample - leading_ms;
        if let Some(db) = curve.value_at(t) {
            *sample *= dyn_gain(db);
        }
    }
}
