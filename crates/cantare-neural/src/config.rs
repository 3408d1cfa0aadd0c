//! Voice configuration files.
//!
//! - `dsconfig.yaml`: acoustic model declaration of a voice
//! - `dsvariance/dsconfig.yaml`: variance predictor declaration
//! - `vocoder.yaml`: vocoder declaration
//! - `dsdict.yaml`: phoneme dictionary, used for vowel lookup

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub(crate) fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    parse_yaml(&text, &path.display().to_string())
}

pub(crate) fn parse_yaml<T: DeserializeOwned>(text: &str, file: &str) -> Result<T> {
    serde_yaml::from_str(text).map_err(|source| Error::Yaml {
        file: file.to_string(),
        source,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomPitchShifting {
    pub range: [f32; 2],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationArgs {
    pub random_pitch_shifting: RandomPitchShifting,
}

/// Acoustic model declaration (`dsconfig.yaml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DsConfig {
    pub phonemes: Option<String>,
    pub acoustic: Option<String>,
    pub vocoder: Option<String>,
    pub speakers: Option<Vec<String>>,
    pub hidden_size: usize,
    pub use_key_shift_embed: bool,
    pub use_speed_embed: bool,
    pub use_energy_embed: bool,
    pub use_breathiness_embed: bool,
    pub use_shallow_diffusion: bool,
    /// Maximum shallow-diffusion depth; negative when unset.
    pub max_depth: i32,
    pub augmentation_args: AugmentationArgs,
}

impl Default for DsConfig {
    fn default() -> Self {
        Self {
            phonemes: None,
            acoustic: None,
            vocoder: None,
            speakers: None,
            hidden_size: 256,
            use_key_shift_embed: false,
            use_speed_embed: false,
            use_energy_embed: false,
            use_breathiness_embed: false,
            use_shallow_diffusion: false,
            max_depth: -1,
            augmentation_args: AugmentationArgs::default(),
        }
    }
}

impl DsConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        parse_yaml(text, "dsconfig.yaml")
    }

    /// Require the acoustic model, vocoder and phoneme table declarations.
    pub fn validate(&self) -> Result<()> {
        let declared = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        if declared(&self.acoustic) && declared(&self.vocoder) && declared(&self.phonemes) {
            Ok(())
        } else {
            Err(Error::InvalidConfig(
                "Invalid dsconfig.yaml. Please ensure that dsconfig.yaml contains keys \
                 \"vocoder\", \"acoustic\" and \"phonemes\"."
                    .into(),
            ))
        }
    }

    pub fn uses_variance(&self) -> bool {
        self.use_energy_embed || self.use_breathiness_embed
    }

    /// Semitone scales applied to negative and positive gender values.
    ///
    /// 100 on the gender curve is 12 semitones of formant shift; positive
    /// values shift down.
    pub fn key_shift_scales(&self) -> (f64, f64) {
        let [low, high] = self.augmentation_args.random_pitch_shifting.range;
        let positive = if high == 0.0 { 0.0 } else { 12.0 / high as f64 / 100.0 };
        let negative = if low == 0.0 { 0.0 } else { -12.0 / low as f64 / 100.0 };
        (positive, negative)
    }
}

/// Variance predictor declaration (`dsvariance/dsconfig.yaml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VarianceConfig {
    pub phonemes: Option<String>,
    pub linguistic: Option<String>,
    pub variance: Option<String>,
    /// Word-level linguistic encoding instead of phoneme durations.
    pub predict_dur: bool,
    pub speakers: Option<Vec<String>>,
    pub hidden_size: usize,
    pub hop_size: u32,
    pub sample_rate: u32,
}

impl Default for VarianceConfig {
    fn default() -> Self {
        Self {
            phonemes: None,
            linguistic: None,
            variance: None,
            predict_dur: false,
            speakers: None,
            hidden_size: 256,
            hop_size: 512,
            sample_rate: 44100,
        }
    }
}

impl VarianceConfig {
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("linguistic", &self.linguistic),
            ("variance", &self.variance),
            ("phonemes", &self.phonemes),
        ] {
            if value.as_deref().map_or(true, |s| s.trim().is_empty()) {
                return Err(Error::InvalidConfig(format!(
                    "dsvariance/dsconfig.yaml is missing key \"{key}\""
                )));
            }
        }
        if self.sample_rate == 0 || self.hop_size == 0 {
            return Err(Error::InvalidConfig(
                "dsvariance/dsconfig.yaml needs positive hop_size and sample_rate".into(),
            ));
        }
        Ok(())
    }

    pub fn frame_ms(&self) -> f64 {
        1000.0 * self.hop_size as f64 / self.sample_rate as f64
    }
}

/// Vocoder declaration (`vocoder.yaml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VocoderConfig {
    pub name: String,
    pub model: String,
    pub sample_rate: u32,
    pub hop_size: u32,
}

impl Default for VocoderConfig {
    fn default() -> Self {
        Self {
            name: "vocoder".into(),
            model: String::new(),
            sample_rate: 44100,
            hop_size: 512,
        }
    }
}

impl VocoderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::InvalidConfig(format!(
                "vocoder {} does not declare a model",
                self.name
            )));
        }
        if self.sample_rate == 0 || self.hop_size == 0 {
            return Err(Error::InvalidConfig(format!(
                "vocoder {} needs positive hop_size and sample_rate",
                self.name
            )));
        }
        Ok(())
    }

    /// Duration of one mel frame.
    pub fn frame_ms(&self) -> f64 {
        1000.0 * self.hop_size as f64 / self.sample_rate as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DictSymbol {
    pub symbol: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Phoneme dictionary (`dsdict.yaml`); only the symbol table is read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DictConfig {
    pub symbols: Vec<DictSymbol>,
}

impl DictConfig {
    pub fn vowels(&self) -> impl Iterator<Item = &str> {
        self.symbols
            .iter()
            .filter(|s| s.kind == "vowel")
            .map(|s| s.symbol.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_dsconfig() {
        let config = DsConfig::from_yaml_str(
            r#"
phonemes: phonemes.txt
acoustic: acoustic.onnx
vocoder: nsf_hifigan
use_key_shift_embed: true
use_shallow_diffusion: true
max_depth: 400
augmentation_args:
  random_pitch_shifting:
    range: [-5.0, 5.0]
speakers: [alto, soprano]
"#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_depth, 400);
        assert_eq!(config.hidden_size, 256);
        assert_eq!(config.speakers.as_ref().map(|s| s.len()), Some(2));
        let (pos, neg) = config.key_shift_scales();
        assert_relative_eq!(pos, 0.024, epsilon = 1e-12);
        assert_relative_eq!(neg, 0.024, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_keys_rejected() {
        let config = DsConfig::from_yaml_str("phonemes: phonemes.txt\nacoustic: a.onnx\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("\"vocoder\""));
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = DsConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.max_depth, -1);
        assert_eq!(config.key_shift_scales(), (0.0, 0.0));
        assert!(!config.uses_variance());
    }

    #[test]
    fn test_vocoder_frame_ms() {
        let vocoder: VocoderConfig =
            parse_yaml("model: model.onnx\nsample_rate: 44100\nhop_size: 441\n", "vocoder.yaml").unwrap();
        assert!(vocoder.validate().is_ok());
        assert_relative_eq!(vocoder.frame_ms(), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_dict_vowels() {
        let dict: DictConfig = parse_yaml(
            "symbols:\n  - {symbol: a, type: vowel}\n  - {symbol: k, type: stop}\n  - {symbol: i, type: vowel}\n",
            "dsdict.yaml",
        )
        .unwrap();
        assert_eq!(dict.vowels().collect::<Vec<_>>(), vec!["a", "i"]);
    }

    #[test]
    fn test_yaml_error_names_file() {
        let err = parse_yaml::<DsConfig>("max_depth: [", "voices/alto/dsconfig.yaml").unwrap_err();
        assert!(err.to_string().contains("voices/alto/dsconfig.yaml"));
    }
}
