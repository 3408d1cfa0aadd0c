//! Sparse time/value curves and their per-frame resampling.
//!
//! Curve times are milliseconds relative to the phrase start. Model stages
//! consume curves on a uniform frame grid that also covers the head and tail
//! padding around the phrase.

use serde::{Deserialize, Serialize};

/// Sparse curve of `(time_ms, value)` points, sorted by time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl Curve {
    /// Build a curve from unordered points.
    ///
    /// Points sharing a time collapse to the one given last.
    pub fn from_points(points: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let mut points: Vec<(f64, f64)> = points.into_iter().filter(|(x, _)| x.is_finite()).collect();
        // Stable sort keeps input order among equal times.
        points.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut xs: Vec<f64> = Vec::with_capacity(points.len());
        let mut ys: Vec<f64> = Vec::with_capacity(points.len());
        for (x, y) in points {
            if xs.last() == Some(&x) {
                if let Some(last) = ys.last_mut() {
                    *last = y;
                }
            } else {
                xs.push(x);
                ys.push(y);
            }
        }
        Self { xs, ys }
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.xs.iter().copied().zip(self.ys.iter().copied())
    }

    /// Linearly interpolated value at `time_ms`, holding the edge values
    /// outside the covered range. `None` for an empty curve.
    pub fn value_at(&self, time_ms: f64) -> Option<f64> {
        let last = self.xs.len().checked_sub(1)?;
        if time_ms <= self.xs[0] {
            return Some(self.ys[0]);
        }
        if time_ms >= self.xs[last] {
            return Some(self.ys[last]);
        }
        // First index with x > time_ms; 1..=last by the checks above.
        let hi = self.xs.partition_point(|&x| x <= time_ms);
        let lo = hi - 1;
        let (x0, x1) = (self.xs[lo], self.xs[hi]);
        let (y0, y1) = (self.ys[lo], self.ys[hi]);
        Some(y0 + (y1 - y0) * (time_ms - x0) / (x1 - x0))
    }
}

/// Uniform frame grid of a phrase, including head and tail padding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGrid {
    pub frame_ms: f64,
    pub total_frames: usize,
    pub head_frames: usize,
    pub tail_frames: usize,
}

impl FrameGrid {
    pub fn new(frame_ms: f64, total_frames: usize, head_frames: usize, tail_frames: usize) -> Self {
        Self {
            frame_ms,
            total_frames,
            head_frames,
            tail_frames,
        }
    }

    /// Center time of frame `index`, relative to the phrase start.
    ///
    /// Head frames have negative times.
    #[inline]
    pub fn frame_center_ms(&self, index: usize) -> f64 {
        (index as f64 - self.head_frames as f64 + 0.5) * self.frame_ms
    }
}

/// Resample `curve` onto `grid`, mapping every value through `transform`.
///
/// The output always holds `grid.total_frames` values. An absent or empty
/// curve yields `transform(default)` everywhere; otherwise frames outside the
/// curve's range repeat its edge values.
pub fn sample_curve(
    curve: Option<&Curve>,
    default: f64,
    grid: &FrameGrid,
    transform: impl Fn(f64) -> f64,
) -> Vec<f64> {
    match curve.filter(|c| !c.is_empty()) {
        None => vec![transform(default); grid.total_frames],
        Some(curve) => (0..grid.total_frames)
            .map(|i| {
                let value = curve.value_at(grid.frame_center_ms(i)).unwrap_or(default);
                transform(value)
            })
            .collect(),
    }
}
