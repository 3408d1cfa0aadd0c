//! Voice bank loading.

use crate::backend::{InferenceSession, SessionFactory};
use crate::config::{read_yaml, DsConfig, VocoderConfig};
use crate::features::PhonemeTable;
use crate::speaker::SpeakerEmbeds;
use crate::variance::VariancePredictor;
use crate::{Error, Result};
use cantare_core::Singer;
use parking_lot::Mutex;
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Mel spectrogram to waveform model.
pub struct Vocoder {
    config: VocoderConfig,
    session: Mutex<Box<dyn InferenceSession>>,
}

impl Vocoder {
    /// Load `dir/vocoder.yaml` and its model.
    pub fn load(dir: &Path, factory: &dyn SessionFactory) -> Result<Self> {
        let config: VocoderConfig = read_yaml(&dir.join("vocoder.yaml"))?;
        config.validate()?;
        let session = factory.load(&dir.join(&config.model))?;
        Ok(Self::from_parts(config, session))
    }

    pub fn from_parts(config: VocoderConfig, session: Box<dyn InferenceSession>) -> Self {
        Self {
            config,
            session: Mutex::new(session),
        }
    }

    pub fn config(&self) -> &VocoderConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Acoustic frame period, dictated by the vocoder's hop.
    pub fn frame_ms(&self) -> f64 {
        self.config.frame_ms()
    }

    pub(crate) fn session(&self) -> &Mutex<Box<dyn InferenceSession>> {
        &self.session
    }
}

impl std::fmt::Debug for Vocoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vocoder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A loaded DiffSinger voice bank.
pub struct DiffSingerVoice {
    id: String,
    config: DsConfig,
    phonemes: PhonemeTable,
    acoustic: Mutex<Box<dyn InferenceSession>>,
    vocoder: Vocoder,
    variance: Option<VariancePredictor>,
    speakers: Option<SpeakerEmbeds>,
}

impl DiffSingerVoice {
    /// Assemble a voice from already loaded parts.
    ///
    /// Fails when the config misses a required key, when it embeds energy or
    /// breathiness without a variance predictor, or when the phoneme table has
    /// no `SP`.
    pub fn from_parts(
        id: impl Into<String>,
        config: DsConfig,
        phonemes: PhonemeTable,
        acoustic: Box<dyn InferenceSession>,
        vocoder: Vocoder,
        variance: Option<VariancePredictor>,
        speakers: Option<SpeakerEmbeds>,
    ) -> Result<Self> {
        let id = id.into();
        config.validate()?;
        if config.uses_variance() && variance.is_none() {
            return Err(Error::InvalidConfig(format!(
                "voice {id} embeds energy or breathiness but has no dsvariance predictor"
            )));
        }
        if !phonemes.contains(crate::features::SILENCE) {
            return Err(Error::InvalidConfig(format!(
                "phoneme table of voice {id} has no \"{}\"",
                crate::features::SILENCE
            )));
        }
        Ok(Self {
            id,
            config,
            phonemes,
            acoustic: Mutex::new(acoustic),
            vocoder,
            variance,
            speakers,
        })
    }

    /// Load a voice directory, looking for its vocoder only next to it.
    pub fn load(dir: impl AsRef<Path>, factory: Arc<dyn SessionFactory>) -> Result<Arc<Self>> {
        VoiceLoader::new(factory).load(dir)
    }

    pub fn config(&self) -> &DsConfig {
        &self.config
    }

    pub fn phonemes(&self) -> &PhonemeTable {
        &self.phonemes
    }

    pub fn vocoder(&self) -> &Vocoder {
        &self.vocoder
    }

    pub fn variance(&self) -> Option<&VariancePredictor> {
        self.variance.as_ref()
    }

    pub fn speakers(&self) -> Option<&SpeakerEmbeds> {
        self.speakers.as_ref()
    }

    pub(crate) fn acoustic(&self) -> &Mutex<Box<dyn InferenceSession>> {
        &self.acoustic
    }
}

impl Singer for DiffSingerVoice {
    fn id(&self) -> &str {
        &self.id
    }

    fn renderer_kind(&self) -> &str {
        crate::DIFFSINGER
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for DiffSingerVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffSingerVoice")
            .field("id", &self.id)
            .field("phonemes", &self.phonemes.len())
            .field("vocoder", &self.vocoder)
            .field("variance", &self.variance.is_some())
            .field("speakers", &self.speakers.as_ref().map(|s| s.names()))
            .finish_non_exhaustive()
    }
}

/// Loads voice banks from disk through a [`SessionFactory`].
///
/// A voice directory holds `dsconfig.yaml`, the phoneme list and acoustic
/// model it names, optionally `dsvariance/` and one `.emb` file per speaker.
/// The vocoder is looked up next to the voice first, then in the shared
/// vocoder directories.
pub struct VoiceLoader {
    factory: Arc<dyn SessionFactory>,
    vocoder_dirs: Vec<PathBuf>,
}

impl VoiceLoader {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            factory,
            vocoder_dirs: Vec::new(),
        }
    }

    pub fn with_vocoder_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.vocoder_dirs.push(dir.into());
        self
    }

    pub fn load(&self, dir: impl AsRef<Path>) -> Result<Arc<DiffSingerVoice>> {
        let dir = dir.as_ref();
        let config: DsConfig = read_yaml(&dir.join("dsconfig.yaml"))?;
        config.validate()?;
        let declared = |v: &Option<String>| dir.join(v.as_deref().unwrap_or_default());

        let phonemes = PhonemeTable::load(&declared(&config.phonemes))?;
        let acoustic = self.factory.load(&declared(&config.acoustic))?;
        let vocoder_name = config.vocoder.clone().unwrap_or_default();
        let vocoder = Vocoder::load(&self.find_vocoder(dir, &vocoder_name)?, self.factory.as_ref())?;

        let variance_dir = dir.join("dsvariance");
        let variance = if variance_dir.join("dsconfig.yaml").exists() {
            Some(VariancePredictor::load(&variance_dir, self.factory.as_ref())?)
        } else {
            None
        };
        let speakers = match &config.speakers {
            Some(names) => Some(SpeakerEmbeds::load(dir, names, config.hidden_size)?),
            None => None,
        };

        let id = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        let voice = DiffSingerVoice::from_parts(id, config, phonemes, acoustic, vocoder, variance, speakers)?;
        tracing::info!(
            voice = voice.id(),
            phonemes = voice.phonemes.len(),
            vocoder = %vocoder_name,
            variance = voice.variance.is_some(),
            "loaded voice"
        );
        Ok(Arc::new(voice))
    }

    fn find_vocoder(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        std::iter::once(dir.join(name))
            .chain(self.vocoder_dirs.iter().map(|d| d.join(name)))
            .find(|candidate| candidate.join("vocoder.yaml").is_file())
            .ok_or_else(|| Error::ModelLoad(format!("vocoder {name} not found for {}", dir.display())))
    }
}

impl std::fmt::Debug for VoiceLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceLoader")
            .field("vocoder_dirs", &self.vocoder_dirs)
            .finish_non_exhaustive()
    }
}
