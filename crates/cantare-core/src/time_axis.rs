//! Project time axis: ticks and milliseconds.

#[derive(Debug, Clone, Copy, PartialEq)]
struct TempoPoint {
    tick: i64,
    bpm: f64,
    /// Absolute ms at `tick`, filled in by `rebuild`.
    ms: f64,
}

impl TempoPoint {
    fn new(tick: i64, bpm: f64) -> Self {
        Self { tick, bpm, ms: 0.0 }
    }
}

/// Maps between tick positions and milliseconds through a piecewise-constant tempo.
#[derive(Debug, Clone)]
pub struct TimeAxis {
    resolution: u32,
    points: Vec<TempoPoint>,
}

impl TimeAxis {
    /// Ticks per quarter note.
    pub const DEFAULT_RESOLUTION: u32 = 480;

    pub fn new(bpm: f64) -> Self {
        Self::with_resolution(bpm, Self::DEFAULT_RESOLUTION)
    }

    pub fn with_resolution(bpm: f64, resolution: u32) -> Self {
        let mut axis = Self {
            resolution: resolution.max(1),
            points: vec![TempoPoint::new(0, bpm.clamp(1.0, 999.0))],
        };
        axis.rebuild();
        axis
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Insert or replace a tempo change at `tick`.
    pub fn add_tempo(&mut self, tick: i64, bpm: f64) {
        let tick = tick.max(0);
        self.points.retain(|p| p.tick != tick);
        self.points.push(TempoPoint::new(tick, bpm.clamp(1.0, 999.0)));
        self.points.sort_by_key(|p| p.tick);
        if self.points[0].tick > 0 {
            let bpm = self.points[0].bpm;
            self.points.insert(0, TempoPoint::new(0, bpm));
        }
        self.rebuild();
    }

    fn rebuild(&mut self) {
        let resolution = self.resolution as f64;
        let mut ms = 0.0;
        for i in 0..self.points.len() {
            if i > 0 {
                let prev = self.points[i - 1];
                ms += (self.points[i].tick - prev.tick) as f64 * ms_per_tick(prev.bpm, resolution);
            }
            self.points[i].ms = ms;
        }
    }

    fn segment_for_tick(&self, tick: i64) -> &TempoPoint {
        let idx = self.points.partition_point(|p| p.tick <= tick);
        &self.points[idx.saturating_sub(1)]
    }

    fn segment_for_ms(&self, ms: f64) -> &TempoPoint {
        let idx = self.points.partition_point(|p| p.ms <= ms);
        &self.points[idx.saturating_sub(1)]
    }

    pub fn tick_to_ms(&self, tick: i64) -> f64 {
        let point = self.segment_for_tick(tick);
        point.ms + (tick - point.tick) as f64 * ms_per_tick(point.bpm, self.resolution as f64)
    }

    /// Nearest tick to `ms`.
    pub fn ms_to_tick(&self, ms: f64) -> i64 {
        let point = self.segment_for_ms(ms);
        let ticks = (ms - point.ms) / ms_per_tick(point.bpm, self.resolution as f64);
        point.tick + ticks.round() as i64
    }
}

impl Default for TimeAxis {
    fn default() -> Self {
        Self::new(120.0)
    }
}

#[inline]
fn ms_per_tick(bpm: f64, resolution: f64) -> f64 {
    60_000.0 / bpm / resolution
}
