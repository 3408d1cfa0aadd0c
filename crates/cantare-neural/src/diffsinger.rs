//! The DiffSinger renderer kind.

use crate::backend::{take_first_output, NamedTensor, Tensor};
use crate::cache::{CacheKey, RenderCache};
use crate::dynamics::apply_dynamics;
use crate::features::{self, PhraseFeatures};
use crate::gate::InferenceGate;
use crate::voice::DiffSingerVoice;
use crate::{Error, Result};
use arc_swap::ArcSwap;
use cantare_core::expr::{self, voice_color_abbr, voice_color_index};
use cantare_core::{
    CancellationToken, ExpressionDescriptor, Progress, RenderLayout, RenderPhrase, RenderResult,
    RenderSettings, Renderer, Singer,
};
use cantare_export::{resample_mono, ResampleQuality};
use std::sync::Arc;

/// Renderer kind name, also the prefix of progress messages.
pub const DIFFSINGER: &str = "diffsinger";

const CACHE_PREFIX: &str = "ds";

const SUPPORTED: [&str; 8] = [
    expr::DYN,
    expr::PITD,
    expr::GENC,
    expr::CLR,
    expr::BREC,
    expr::VELC,
    expr::ENE,
    expr::PEXP,
];

/// Diffusion depth actually used for a render.
///
/// With shallow diffusion the requested depth is clamped to the model's
/// `max_depth` and rounded down to a multiple of `speedup`; otherwise it is
/// passed through unchanged.
pub fn effective_depth(depth: i32, max_depth: i32, speedup: i32, shallow_diffusion: bool) -> Result<i32> {
    if !shallow_diffusion {
        return Ok(depth);
    }
    if max_depth < 0 {
        return Err(Error::InvalidConfig("Max depth is unset or is negative.".into()));
    }
    if speedup < 1 {
        return Err(Error::InvalidConfig(format!("speedup must be at least 1, got {speedup}")));
    }
    Ok(depth.min(max_depth) / speedup * speedup)
}

/// Renders phrases of [`DiffSingerVoice`]s.
///
/// Every model call of this kind goes through one [`InferenceGate`], held per
/// call so feature building overlaps with other jobs' inference. Results are
/// cached on disk by phrase hash, depth and speedup.
pub struct DiffSingerRenderer {
    settings: ArcSwap<RenderSettings>,
    cache: Arc<RenderCache>,
    gate: Arc<InferenceGate>,
}

impl DiffSingerRenderer {
    pub fn new(settings: RenderSettings) -> Self {
        let cache = Arc::new(RenderCache::new(settings.cache_dir.clone(), settings.cache_enabled));
        Self::with_cache(settings, cache)
    }

    pub fn with_cache(settings: RenderSettings, cache: Arc<RenderCache>) -> Self {
        Self {
            settings: ArcSwap::from_pointee(settings),
            cache,
            gate: Arc::new(InferenceGate::new()),
        }
    }

    pub fn settings(&self) -> Arc<RenderSettings> {
        self.settings.load_full()
    }

    /// Takes effect for renders started afterwards. The cache directory is fixed
    /// at construction; only `cache_enabled` is picked up here.
    pub fn update_settings(&self, settings: RenderSettings) {
        self.cache.set_enabled(settings.cache_enabled);
        self.settings.store(Arc::new(settings));
    }

    pub fn cache(&self) -> &Arc<RenderCache> {
        &self.cache
    }

    pub fn gate(&self) -> &Arc<InferenceGate> {
        &self.gate
    }

    fn layout_with(settings: &RenderSettings, phrase: &RenderPhrase) -> RenderLayout {
        RenderLayout {
            leading_ms: settings.head_ms,
            position_ms: phrase.position_ms,
            estimated_length_ms: settings.head_ms + phrase.duration_ms + settings.tail_ms,
        }
    }

    fn voice<'a>(&self, phrase: &'a RenderPhrase) -> Result<&'a DiffSingerVoice> {
        phrase
            .singer
            .as_any()
            .downcast_ref::<DiffSingerVoice>()
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "singer {} is not a {DIFFSINGER} voice",
                    phrase.singer.id()
                ))
            })
    }

    fn render_samples(
        &self,
        phrase: &RenderPhrase,
        settings: &RenderSettings,
        layout: &RenderLayout,
        cancellation: &CancellationToken,
    ) -> Result<Vec<f32>> {
        let voice = self.voice(phrase)?;
        let config = voice.config();
        config.validate()?;

        let depth = effective_depth(
            settings.depth,
            config.max_depth,
            settings.speedup,
            config.use_shallow_diffusion,
        )?;
        let key = CacheKey::new(
            CACHE_PREFIX,
            phrase.hash(),
            config.use_shallow_diffusion.then_some(depth),
            settings.speedup,
        );
        let vocoder_rate = voice.vocoder().sample_rate();

        let samples = self.cache.get_or_render(&key, vocoder_rate, cancellation, || {
            tracing::debug!(file = %key.file_name(), "cache miss");
            self.synthesize(voice, phrase, settings, depth, cancellation)
        })?;

        let mut samples = if vocoder_rate == settings.sample_rate {
            samples
        } else {
            resample_mono(&samples, vocoder_rate, settings.sample_rate, ResampleQuality::default())?
        };
        apply_dynamics(phrase, &mut samples, layout.leading_ms, settings.sample_rate);
        Ok(samples)
    }

    /// Run the model stages. Checks `cancellation` before every model call
    /// and once more before the result can reach the cache.
    fn synthesize(
        &self,
        voice: &DiffSingerVoice,
        phrase: &RenderPhrase,
        settings: &RenderSettings,
        depth: i32,
        cancellation: &CancellationToken,
    ) -> Result<Vec<f32>> {
        let config = voice.config();
        let feats = PhraseFeatures::build(
            phrase,
            voice.phonemes(),
            voice.vocoder().frame_ms(),
            settings.head_ms,
            settings.tail_ms,
        )?;
        let grid = &feats.grid;
        let frames = feats.total_frames();
        let f0 = Tensor::row_f32(features::f0(phrase, grid));

        let mut inputs = vec![
            NamedTensor::new("tokens", Tensor::row_i64(feats.tokens.clone())),
            NamedTensor::new("durations", Tensor::row_i64(feats.durations.clone())),
            NamedTensor::new("f0", f0.clone()),
        ];
        if config.use_shallow_diffusion {
            inputs.push(NamedTensor::new("depth", Tensor::scalar_i64(depth as i64)));
        }
        inputs.push(NamedTensor::new("speedup", Tensor::scalar_i64(settings.speedup as i64)));

        if let Some(speakers) = voice.speakers() {
            inputs.push(NamedTensor::new("spk_embed", speakers.by_frame(phrase, grid, 0)));
        }
        if config.use_key_shift_embed {
            let gender = features::gender(phrase.curve(expr::GENC), grid, config.key_shift_scales());
            inputs.push(NamedTensor::new("gender", Tensor::row_f32(gender)));
        }
        if config.use_speed_embed {
            let velocity = features::velocity(phrase.curve(expr::VELC), grid);
            inputs.push(NamedTensor::new("velocity", Tensor::row_f32(velocity)));
        }

        if config.uses_variance() {
            let predictor = voice.variance().ok_or_else(|| {
                Error::InvalidConfig(format!("voice {} has no variance predictor", voice.id()))
            })?;
            let predicted = predictor.process(
                phrase,
                settings.head_ms,
                settings.tail_ms,
                settings.speedup,
                &self.gate,
                cancellation,
            )?;
            if predicted.energy.len() != frames {
                return Err(Error::Inference(format!(
                    "variance predictor produced {} frames, acoustic model expects {frames}",
                    predicted.energy.len()
                )));
            }
            if config.use_energy_embed {
                let energy = features::combine_variance(&predicted.energy, phrase.curve(expr::ENE), grid);
                inputs.push(NamedTensor::new("energy", Tensor::row_f32(energy)));
            }
            if config.use_breathiness_embed {
                let breathiness =
                    features::combine_variance(&predicted.breathiness, phrase.curve(expr::BREC), grid);
                inputs.push(NamedTensor::new("breathiness", Tensor::row_f32(breathiness)));
            }
        }

        cancellation.check()?;
        let mel = take_first_output(self.gate.run("acoustic", voice.acoustic(), inputs)?)?;

        cancellation.check()?;
        let vocoder_inputs = vec![NamedTensor::new("mel", mel), NamedTensor::new("f0", f0)];
        let samples = take_first_output(self.gate.run("vocoder", voice.vocoder().session(), vocoder_inputs)?)?
            .into_f32()?;

        cancellation.check()?;
        Ok(samples)
    }
}

impl Renderer for DiffSingerRenderer {
    fn kind(&self) -> &str {
        DIFFSINGER
    }

    fn layout(&self, phrase: &RenderPhrase) -> RenderLayout {
        Self::layout_with(&self.settings.load(), phrase)
    }

    fn supports_expression(&self, descriptor: &ExpressionDescriptor) -> bool {
        SUPPORTED.contains(&descriptor.abbr.as_str()) || voice_color_index(&descriptor.abbr).is_some()
    }

    fn suggested_expressions(&self, singer: &dyn Singer) -> Vec<ExpressionDescriptor> {
        let mut suggested = vec![
            ExpressionDescriptor::curve("velocity (curve)", expr::VELC, 0.0, 200.0, 100.0),
            ExpressionDescriptor::curve("energy (curve)", expr::ENE, -100.0, 100.0, 0.0),
            ExpressionDescriptor::curve("pitch expressiveness (curve)", expr::PEXP, 0.0, 100.0, 100.0),
        ];
        let speakers = singer
            .as_any()
            .downcast_ref::<DiffSingerVoice>()
            .and_then(|voice| voice.speakers());
        if let Some(speakers) = speakers {
            suggested.extend(speakers.names().iter().enumerate().map(|(i, name)| {
                ExpressionDescriptor::curve(format!("voice color {name}"), voice_color_abbr(i), 0.0, 100.0, 0.0)
            }));
        }
        suggested
    }

    fn render(
        &self,
        phrase: &RenderPhrase,
        progress: &Progress,
        track_no: usize,
        cancellation: &CancellationToken,
        is_pre_render: bool,
    ) -> cantare_core::Result<RenderResult> {
        if cancellation.is_cancelled() {
            return Ok(RenderResult::cancelled());
        }
        let settings = self.settings.load_full();
        let layout = Self::layout_with(&settings, phrase);
        tracing::debug!(
            track = track_no,
            position_ms = phrase.position_ms,
            hash = %format!("{:016x}", phrase.hash()),
            pre_render = is_pre_render,
            "rendering phrase"
        );

        match self.render_samples(phrase, &settings, &layout, cancellation) {
            Ok(samples) => {
                progress.complete(
                    phrase.phones.len(),
                    format!(
                        "Track {}: {DIFFSINGER}{}x \"{}\"",
                        track_no + 1,
                        settings.speedup,
                        phrase.phoneme_text()
                    ),
                );
                Ok(RenderResult::new(layout, samples))
            }
            Err(e) if e.is_cancelled() => Ok(RenderResult::cancelled()),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for DiffSingerRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffSingerRenderer")
            .field("settings", &*self.settings.load_full())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
