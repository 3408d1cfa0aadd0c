//! Model inputs derived from a phrase.
//!
//! Every stage works on the same frame grid: the phrase's phones plus head and
//! tail padding, with durations taken as differences of rounded frame
//! boundaries so rounding never drifts across a phrase.

use crate::{Error, Result};
use cantare_core::music::tone_to_freq;
use cantare_core::{sample_curve, Curve, FrameGrid, Phone, RenderPhrase};
use std::collections::HashMap;
use std::path::Path;

/// Padding phoneme placed before and after every phrase.
pub const SILENCE: &str = "SP";

/// Phoneme symbols of a model, indexed by line number of the phoneme file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhonemeTable {
    symbols: Vec<String>,
    index: HashMap<String, i64>,
}

impl PhonemeTable {
    pub fn new(symbols: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(symbols.len());
        for (i, symbol) in symbols.iter().enumerate() {
            index.entry(symbol.clone()).or_insert(i as i64);
        }
        Self { symbols, index }
    }

    /// One symbol per line.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::new(
            text.lines().map(|l| l.trim_end_matches('\r').to_string()).collect(),
        ))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn contains(&self, phoneme: &str) -> bool {
        self.index.contains_key(phoneme)
    }

    pub fn id(&self, phoneme: &str, voice: &str) -> Result<i64> {
        self.index
            .get(phoneme)
            .copied()
            .ok_or_else(|| Error::UnknownPhoneme {
                phoneme: phoneme.to_string(),
                voice: voice.to_string(),
            })
    }

    /// `[SP] + phones + [SP]` as ids.
    pub fn tokens(&self, phones: &[Phone], voice: &str) -> Result<Vec<i64>> {
        let silence = self.id(SILENCE, voice)?;
        let mut tokens = Vec::with_capacity(phones.len() + 2);
        tokens.push(silence);
        for phone in phones {
            tokens.push(self.id(&phone.phoneme, voice)?);
        }
        tokens.push(silence);
        Ok(tokens)
    }
}

/// Round half to even, the rounding every frame boundary uses.
#[inline]
pub fn frames_at(ms: f64, frame_ms: f64) -> i64 {
    (ms / frame_ms).round_ties_even() as i64
}

/// Per-token frame counts: head padding, one entry per phone, tail padding.
pub fn phone_durations(phones: &[Phone], frame_ms: f64, head_frames: i64, tail_frames: i64) -> Vec<i64> {
    let mut durations = Vec::with_capacity(phones.len() + 2);
    durations.push(head_frames);
    durations.extend(
        phones
            .iter()
            .map(|p| frames_at(p.end_ms, frame_ms) - frames_at(p.position_ms, frame_ms)),
    );
    durations.push(tail_frames);
    durations
}

/// Token ids, durations and frame grid of one phrase for one model.
#[derive(Debug, Clone, PartialEq)]
pub struct PhraseFeatures {
    pub tokens: Vec<i64>,
    pub durations: Vec<i64>,
    pub grid: FrameGrid,
}

impl PhraseFeatures {
    pub fn build(
        phrase: &RenderPhrase,
        phonemes: &PhonemeTable,
        frame_ms: f64,
        head_ms: f64,
        tail_ms: f64,
    ) -> Result<Self> {
        if !(frame_ms > 0.0) {
            return Err(Error::InvalidConfig(format!("frame period must be positive, got {frame_ms}")));
        }
        let tokens = phonemes.tokens(&phrase.phones, phrase.singer.id())?;
        let head_frames = frames_at(head_ms, frame_ms);
        let tail_frames = frames_at(tail_ms, frame_ms);
        let durations = phone_durations(&phrase.phones, frame_ms, head_frames, tail_frames);

        let total: i64 = durations.iter().sum();
        if total <= 0 || durations.iter().any(|&d| d < 0) {
            return Err(Error::Inference(format!(
                "phrase at {:.0} ms has invalid phone timing",
                phrase.position_ms
            )));
        }

        Ok(Self {
            tokens,
            durations,
            grid: FrameGrid::new(frame_ms, total as usize, head_frames as usize, tail_frames as usize),
        })
    }

    pub fn total_frames(&self) -> usize {
        self.grid.total_frames
    }
}

fn to_f32(values: Vec<f64>) -> Vec<f32> {
    values.into_iter().map(|v| v as f32).collect()
}

/// Pitch in Hz per frame.
pub fn f0(phrase: &RenderPhrase, grid: &FrameGrid) -> Vec<f32> {
    let pitch = phrase.pitch_curve();
    to_f32(sample_curve(Some(&pitch), 0.0, grid, |cents| tone_to_freq(cents * 0.01)))
}

/// Pitch in semitones per frame.
pub fn pitch_semitones(phrase: &RenderPhrase, grid: &FrameGrid) -> Vec<f32> {
    let pitch = phrase.pitch_curve();
    to_f32(sample_curve(Some(&pitch), 0.0, grid, |cents| cents * 0.01))
}

/// Key shift per frame from the gender curve. `scales` are `(positive, negative)`.
pub fn gender(curve: Option<&Curve>, grid: &FrameGrid, scales: (f64, f64)) -> Vec<f32> {
    let (positive, negative) = scales;
    to_f32(sample_curve(curve, 0.0, grid, |x| {
        if x < 0.0 {
            -x * positive
        } else {
            -x * negative
        }
    }))
}

/// Speed factor per frame; 100 is the original speed and each +100 doubles it.
pub fn velocity(curve: Option<&Curve>, grid: &FrameGrid) -> Vec<f32> {
    to_f32(sample_curve(curve, 100.0, grid, |x| 2f64.powf((x - 100.0) / 100.0)))
}

/// Predicted curve plus the user's delta, capped at 0.
pub fn combine_variance(predicted: &[f32], user: Option<&Curve>, grid: &FrameGrid) -> Vec<f32> {
    let user = sample_curve(user, 0.0, grid, |x| x);
    predicted
        .iter()
        .zip(user)
        .map(|(&p, u)| (p as f64 + u * 12.0 / 100.0).min(0.0) as f32)
        .collect()
}
