use crate::backend::{take_output, InferenceSession, NamedTensor, SessionFactory, Tensor};
use crate::config::{read_yaml, DictConfig, VarianceConfig};
use crate::features::{self, PhonemeTable, PhraseFeatures};
use crate::gate::InferenceGate;
use crate::speaker::SpeakerEmbeds;
use crate::{Error, Result};
use cantare_core::{CancellationToken, Phone, RenderPhrase};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;

/// Energy and breathiness predicted for every frame of a phrase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarianceResult {
    pub energy: Vec<f32>,
    pub breathiness: Vec<f32>,
}

/// Linguistic encoder plus variance model of a voice (`dsvariance/`).
pub struct VariancePredictor {
    config: VarianceConfig,
    phonemes: PhonemeTable,
    vowels: HashSet<String>,
    speakers: Option<SpeakerEmbeds>,
    linguistic: Mutex<Box<dyn InferenceSession>>,
    variance: Mutex<Box<dyn InferenceSession>>,
}

impl VariancePredictor {
    /// Load `dir/dsconfig.yaml` and the models it declares.
    ///
    /// Vowels come from `dir/dsdict.yaml` when present; they are only needed
    /// for word-level encoding.
    pub fn load(dir: &Path, factory: &dyn SessionFactory) -> Result<Self> {
        let config: VarianceConfig = read_yaml(&dir.join("dsconfig.yaml"))?;
        config.validate()?;
        let declared = |v: &Option<String>| dir.join(v.as_deref().unwrap_or_default());

        let phonemes = PhonemeTable::load(&declared(&config.phonemes))?;
        let dict_path = dir.join("dsdict.yaml");
        let vowels = if dict_path.exists() {
            let dict: DictConfig = read_yaml(&dict_path)?;
            dict.vowels().map(str::to_string).collect()
        } else {
            HashSet::new()
        };
        let speakers = match &config.speakers {
            Some(names) => Some(SpeakerEmbeds::load(dir, names, config.hidden_size)?),
            None => None,
        };

        let linguistic = factory.load(&declared(&config.linguistic))?;
        let variance = factory.load(&declared(&config.variance))?;
        tracing::info!(dir = %dir.display(), phonemes = phonemes.len(), "loaded variance predictor");
        Ok(Self::from_parts(config, phonemes, vowels, speakers, linguistic, variance))
    }

    pub fn from_parts(
        config: VarianceConfig,
        phonemes: PhonemeTable,
        vowels: HashSet<String>,
        speakers: Option<SpeakerEmbeds>,
        linguistic: Box<dyn InferenceSession>,
        variance: Box<dyn InferenceSession>,
    ) -> Self {
        Self {
            config,
            phonemes,
            vowels,
            speakers,
            linguistic: Mutex::new(linguistic),
            variance: Mutex::new(variance),
        }
    }

    pub fn config(&self) -> &VarianceConfig {
        &self.config
    }

    pub fn frame_ms(&self) -> f64 {
        self.config.frame_ms()
    }

    /// Predict energy and breathiness on this model's own frame grid.
    pub fn process(
        &self,
        phrase: &RenderPhrase,
        head_ms: f64,
        tail_ms: f64,
        speedup: i32,
        gate: &InferenceGate,
        cancellation: &CancellationToken,
    ) -> Result<VarianceResult> {
        let frame_ms = self.frame_ms();
        let feats = PhraseFeatures::build(phrase, &self.phonemes, frame_ms, head_ms, tail_ms)?;
        let frames = feats.total_frames();

        let mut linguistic_inputs = vec![NamedTensor::new("tokens", Tensor::row_i64(feats.tokens.clone()))];
        if self.config.predict_dur {
            let (word_div, word_dur) = self.words(phrase, &feats);
            linguistic_inputs.push(NamedTensor::new("word_div", Tensor::row_i64(word_div)));
            linguistic_inputs.push(NamedTensor::new("word_dur", Tensor::row_i64(word_dur)));
        } else {
            linguistic_inputs.push(NamedTensor::new("ph_dur", Tensor::row_i64(feats.durations.clone())));
        }

        cancellation.check()?;
        let mut outputs = gate.run("linguistic", &self.linguistic, linguistic_inputs)?;
        let encoder_out = take_output(&mut outputs, "encoder_out")?;

        let mut inputs = vec![
            NamedTensor::new("encoder_out", encoder_out),
            NamedTensor::new("ph_dur", Tensor::row_i64(feats.durations.clone())),
            NamedTensor::new("pitch", Tensor::row_f32(features::pitch_semitones(phrase, &feats.grid))),
            NamedTensor::new("energy", Tensor::row_f32(vec![0.0; frames])),
            NamedTensor::new("breathiness", Tensor::row_f32(vec![0.0; frames])),
            NamedTensor::new("retake", Tensor::bool([1, frames, 2], vec![true; frames * 2])),
            NamedTensor::new("speedup", Tensor::scalar_i64(speedup as i64)),
        ];
        if let Some(speakers) = &self.speakers {
            inputs.push(NamedTensor::new("spk_embed", speakers.by_frame(phrase, &feats.grid, 0)));
        }

        cancellation.check()?;
        let mut outputs = gate.run("variance", &self.variance, inputs)?;
        let energy = take_output(&mut outputs, "energy_pred")?.into_f32()?;
        let breathiness = take_output(&mut outputs, "breathiness_pred")?.into_f32()?;
        for (name, curve) in [("energy_pred", &energy), ("breathiness_pred", &breathiness)] {
            if curve.len() != frames {
                return Err(Error::Inference(format!(
                    "{name} holds {} frames, expected {frames}",
                    curve.len()
                )));
            }
        }
        Ok(VarianceResult { energy, breathiness })
    }

    /// Word-level encoding: a word starts at each vowel.
    ///
    /// The head padding joins the first word and the tail padding the last.
    /// Without any vowel the whole phrase is one word.
    fn words(&self, phrase: &RenderPhrase, feats: &PhraseFeatures) -> (Vec<i64>, Vec<i64>) {
        let phones = &phrase.phones;
        let frame_ms = feats.grid.frame_ms;
        let head = feats.grid.head_frames as i64;
        let tail = feats.grid.tail_frames as i64;
        let vowel_ids: Vec<usize> = phones
            .iter()
            .enumerate()
            .filter(|(_, p)| self.vowels.contains(&p.phoneme))
            .map(|(i, _)| i)
            .collect();
        word_encoding(phones, &vowel_ids, phrase_end_ms(phrase), frame_ms, head, tail)
    }
}

impl std::fmt::Debug for VariancePredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariancePredictor")
            .field("config", &self.config)
            .field("phonemes", &self.phonemes.len())
            .field("vowels", &self.vowels.len())
            .finish_non_exhaustive()
    }
}

fn phrase_end_ms(phrase: &RenderPhrase) -> f64 {
    phrase
        .notes
        .last()
        .map(|n| n.end_ms)
        .or_else(|| phrase.phones.last().map(|p| p.end_ms))
        .unwrap_or(0.0)
}

/// Truncating frame index used by word durations.
#[inline]
fn floor_frames(ms: f64, frame_ms: f64) -> i64 {
    (ms / frame_ms).trunc() as i64
}

fn word_encoding(
    phones: &[Phone],
    vowel_ids: &[usize],
    end_ms: f64,
    frame_ms: f64,
    head: i64,
    tail: i64,
) -> (Vec<i64>, Vec<i64>) {
    let start = phones.first().map_or(0.0, |p| p.position_ms);
    let (Some(&first), Some(&last)) = (vowel_ids.first(), vowel_ids.last()) else {
        let span = floor_frames(end_ms, frame_ms) - floor_frames(start, frame_ms);
        return (vec![phones.len() as i64 + 2], vec![span + head + tail]);
    };

    let mut word_div = Vec::with_capacity(vowel_ids.len() + 1);
    let mut word_dur = Vec::with_capacity(vowel_ids.len() + 1);
    word_div.push(first as i64 + 1);
    word_dur.push(floor_frames(phones[first].position_ms, frame_ms) - floor_frames(start, frame_ms) + head);
    for pair in vowel_ids.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        word_div.push((b - a) as i64);
        word_dur.push(floor_frames(phones[b - 1].end_ms, frame_ms) - floor_frames(phones[a].position_ms, frame_ms));
    }
    word_div.push((phones.len() - last) as i64 + 1);
    word_dur.push(floor_frames(end_ms, frame_ms) - floor_frames(phones[last].position_ms, frame_ms) + tail);
    (word_div, word_dur)
}
