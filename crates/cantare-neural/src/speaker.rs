use crate::backend::Tensor;
use crate::{Error, Result};
use cantare_core::{expr, sample_curve, FrameGrid, RenderPhrase};
use std::path::Path;

/// Speaker embeddings of a multi-speaker voice, one per sub-bank.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerEmbeds {
    hidden_size: usize,
    names: Vec<String>,
    embeds: Vec<Vec<f32>>,
}

impl SpeakerEmbeds {
    /// Read `{dir}/{speaker}.emb` for every speaker: `hidden_size` little-endian f32s.
    pub fn load(dir: &Path, speakers: &[String], hidden_size: usize) -> Result<Self> {
        let mut embeds = Vec::with_capacity(speakers.len());
        for speaker in speakers {
            let path = dir.join(format!("{speaker}.emb"));
            let bytes = std::fs::read(&path)?;
            if bytes.len() != hidden_size * 4 {
                return Err(Error::InvalidConfig(format!(
                    "{} holds {} bytes, expected {} floats",
                    path.display(),
                    bytes.len(),
                    hidden_size
                )));
            }
            embeds.push(
                bytes
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect(),
            );
        }
        Self::from_vectors(speakers.to_vec(), embeds)
    }

    pub fn from_vectors(names: Vec<String>, embeds: Vec<Vec<f32>>) -> Result<Self> {
        if names.is_empty() || names.len() != embeds.len() {
            return Err(Error::InvalidConfig(
                "speaker list and embeddings do not match".into(),
            ));
        }
        let hidden_size = embeds[0].len();
        if embeds.iter().any(|e| e.len() != hidden_size) {
            return Err(Error::InvalidConfig(
                "speaker embeddings differ in size".into(),
            ));
        }
        Ok(Self {
            hidden_size,
            names,
            embeds,
        })
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Per-frame speaker mix as a `[1, frames, hidden]` tensor.
    ///
    /// Each sub-bank is weighted by its voice color curve (`cl01`, `cl02`, ...,
    /// 0..100). Frames where every weight is zero use `default_speaker`.
    pub fn by_frame(&self, phrase: &RenderPhrase, grid: &FrameGrid, default_speaker: usize) -> Tensor {
        let default_speaker = default_speaker.min(self.len() - 1);
        let weights: Vec<Vec<f64>> = (0..self.len())
            .map(|k| {
                let curve = phrase.curve(&expr::voice_color_abbr(k));
                sample_curve(curve, 0.0, grid, |x| (x / 100.0).clamp(0.0, 1.0))
            })
            .collect();

        let mut data = Vec::with_capacity(grid.total_frames * self.hidden_size);
        for frame in 0..grid.total_frames {
            let total: f64 = weights.iter().map(|w| w[frame]).sum();
            if total <= 0.0 {
                data.extend_from_slice(&self.embeds[default_speaker]);
                continue;
            }
            for h in 0..self.hidden_size {
                let mixed: f64 = weights
                    .iter()
                    .zip(&self.embeds)
                    .map(|(w, e)| w[frame] * e[h] as f64)
                    .sum();
                data.push((mixed / total) as f32);
            }
        }
        Tensor::f32([1, grid.total_frames, self.hidden_size], data)
    }
}
