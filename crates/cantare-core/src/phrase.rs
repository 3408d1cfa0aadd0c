//! Render phrases: the immutable unit of synthesis and caching.

use crate::curve::Curve;
use crate::expr;
use crate::renderer::Singer;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Width of the flat top kept at the end of each note when deriving a pitch curve.
const NOTE_EDGE_MS: f64 = 1.0;

/// One phoneme with its span in ms, relative to the phrase start.
#[derive(Debug, Clone, PartialEq)]
pub struct Phone {
    pub phoneme: String,
    pub position_ms: f64,
    pub end_ms: f64,
}

impl Phone {
    pub fn new(phoneme: impl Into<String>, position_ms: f64, end_ms: f64) -> Self {
        Self {
            phoneme: phoneme.into(),
            position_ms,
            end_ms,
        }
    }

    pub fn duration_ms(&self) -> f64 {
        self.end_ms - self.position_ms
    }
}

/// A note's tone (MIDI semitones) and span in ms, relative to the phrase start.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub tone: i32,
    pub position_ms: f64,
    pub end_ms: f64,
}

impl Note {
    pub fn new(tone: i32, position_ms: f64, end_ms: f64) -> Self {
        Self {
            tone,
            position_ms,
            end_ms,
        }
    }
}

/// A contiguous run of phones and notes rendered as one inference unit.
///
/// The content hash covers the singer, timing, phones, notes, curves and any
/// synthesis parameters attached with [`RenderPhrase::with_param`]. Two phrases
/// with equal hashes render to the same audio.
#[derive(Clone)]
pub struct RenderPhrase {
    pub singer: Arc<dyn Singer>,
    /// Absolute timeline position of the phrase start.
    pub position_ms: f64,
    pub duration_ms: f64,
    pub phones: Vec<Phone>,
    pub notes: Vec<Note>,
    pub curves: BTreeMap<String, Curve>,
    params: BTreeMap<String, f64>,
    hash: u64,
}

impl RenderPhrase {
    pub fn new(
        singer: Arc<dyn Singer>,
        position_ms: f64,
        duration_ms: f64,
        phones: Vec<Phone>,
        notes: Vec<Note>,
        curves: BTreeMap<String, Curve>,
    ) -> Self {
        let mut phrase = Self {
            singer,
            position_ms,
            duration_ms,
            phones,
            notes,
            curves,
            params: BTreeMap::new(),
            hash: 0,
        };
        phrase.hash = phrase.compute_hash();
        phrase
    }

    /// Attach a synthesis parameter that affects the output (e.g. a tone shift).
    pub fn with_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.params.insert(name.into(), value);
        self.hash = self.compute_hash();
        self
    }

    #[inline]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn end_ms(&self) -> f64 {
        self.position_ms + self.duration_ms
    }

    pub fn curve(&self, abbr: &str) -> Option<&Curve> {
        self.curves.get(abbr)
    }

    pub fn param(&self, name: &str) -> Option<f64> {
        self.params.get(name).copied()
    }

    pub fn phoneme_text(&self) -> String {
        self.phones
            .iter()
            .map(|p| p.phoneme.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Pitch in cents: the explicit `pitch` curve, or a stepped curve built from the notes.
    pub fn pitch_curve(&self) -> Curve {
        if let Some(curve) = self.curve(expr::PITCH).filter(|c| !c.is_empty()) {
            return curve.clone();
        }
        Curve::from_points(self.notes.iter().flat_map(|note| {
            let cents = note.tone as f64 * 100.0;
            let top_end = (note.end_ms - NOTE_EDGE_MS).max(note.position_ms);
            [(note.position_ms, cents), (top_end, cents)]
        }))
    }

    fn compute_hash(&self) -> u64 {
        let mut hasher = blake3::Hasher::new();
        write_str(&mut hasher, self.singer.id());
        write_str(&mut hasher, self.singer.renderer_kind());
        write_f64(&mut hasher, self.position_ms);
        write_f64(&mut hasher, self.duration_ms);

        hasher.update(&(self.phones.len() as u64).to_le_bytes());
        for phone in &self.phones {
            write_str(&mut hasher, &phone.phoneme);
            write_f64(&mut hasher, phone.position_ms);
            write_f64(&mut hasher, phone.end_ms);
        }

        hasher.update(&(self.notes.len() as u64).to_le_bytes());
        for note in &self.notes {
            hasher.update(&note.tone.to_le_bytes());
            write_f64(&mut hasher, note.position_ms);
            write_f64(&mut hasher, note.end_ms);
        }

        hasher.update(&(self.curves.len() as u64).to_le_bytes());
        for (abbr, curve) in &self.curves {
            write_str(&mut hasher, abbr);
            hasher.update(&(curve.len() as u64).to_le_bytes());
            for (x, y) in curve.points() {
                write_f64(&mut hasher, x);
                write_f64(&mut hasher, y);
            }
        }

        hasher.update(&(self.params.len() as u64).to_le_bytes());
        for (name, value) in &self.params {
            write_str(&mut hasher, name);
            write_f64(&mut hasher, *value);
        }

        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }
}

fn write_str(hasher: &mut blake3::Hasher, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

fn write_f64(hasher: &mut blake3::Hasher, v: f64) {
    hasher.update(&v.to_bits().to_le_bytes());
}

impl fmt::Debug for RenderPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPhrase")
            .field("singer", &self.singer.id())
            .field("position_ms", &self.position_ms)
            .field("duration_ms", &self.duration_ms)
            .field("phones", &self.phones.len())
            .field("hash", &format_args!("{:016x}", self.hash))
            .finish()
    }
}
