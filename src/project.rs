//! Project model handed to the render engine.
//!
//! Phrase segmentation happens upstream: each track arrives with its phrases
//! already cut, timed and hashed.

use cantare_core::{RenderPhrase, TimeAxis};

#[derive(Debug, Clone)]
pub struct Track {
    pub name: String,
    pub muted: bool,
    /// Fader position in dB.
    pub volume_db: f64,
    /// -100 (left) to 100 (right).
    pub pan: f32,
    pub phrases: Vec<RenderPhrase>,
}

impl Track {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            muted: false,
            volume_db: 0.0,
            pan: 0.0,
            phrases: Vec::new(),
        }
    }

    pub fn with_phrases(mut self, phrases: Vec<RenderPhrase>) -> Self {
        self.phrases = phrases;
        self
    }

    pub fn muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }

    pub fn volume_db(mut self, db: f64) -> Self {
        self.volume_db = db;
        self
    }

    pub fn pan(mut self, pan: f32) -> Self {
        self.pan = pan;
        self
    }

    /// `{index:02}-{name}.wav`, with path separators in the name replaced.
    pub fn export_file_name(&self, index: usize) -> String {
        let name: String = self
            .name
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c => c,
            })
            .collect();
        format!("{index:02}-{name}.wav")
    }
}

#[derive(Debug, Clone)]
pub struct Project {
    pub tracks: Vec<Track>,
    pub time_axis: TimeAxis,
}

impl Project {
    pub fn new(time_axis: TimeAxis) -> Self {
        Self {
            tracks: Vec::new(),
            time_axis,
        }
    }

    pub fn with_track(mut self, track: Track) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn phrase_count(&self) -> usize {
        self.tracks.iter().map(|t| t.phrases.len()).sum()
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new(TimeAxis::new(120.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_file_name() {
        assert_eq!(Track::new("Lead").export_file_name(0), "00-Lead.wav");
        assert_eq!(Track::new("a/b").export_file_name(12), "12-a_b.wav");
    }
}
