//! DiffSinger rendering for cantare.
//!
//! The renderer turns a [`RenderPhrase`](cantare_core::RenderPhrase) into PCM
//! through four model stages (linguistic encoder, variance predictor, acoustic
//! model, vocoder). No ML framework is linked here: models are reached through
//! the [`InferenceSession`] trait and created by a [`SessionFactory`], so any
//! runtime can be plugged in.
//!
//! # Example
//!
//! ```ignore
//! use cantare_neural::{DiffSingerRenderer, VoiceLoader};
//!
//! let loader = VoiceLoader::new(my_onnx_factory).with_vocoder_dir("vocoders");
//! let voice = loader.load("voices/alto")?;
//! let renderer = DiffSingerRenderer::new(settings);
//! registry.register(Arc::new(renderer));
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod backend;
pub use backend::{InferenceSession, NamedTensor, SessionFactory, Tensor, TensorData};

mod gate;
pub use gate::InferenceGate;

pub mod config;
pub use config::{DsConfig, VarianceConfig, VocoderConfig};

mod speaker;
pub use speaker::SpeakerEmbeds;

mod voice;
pub use voice::{DiffSingerVoice, Vocoder, VoiceLoader};

pub mod features;
pub use features::{PhonemeTable, PhraseFeatures};

mod variance;
pub use variance::{VariancePredictor, VarianceResult};

mod cache;
pub use cache::{CacheKey, RenderCache};

mod dynamics;
pub use dynamics::apply_dynamics;

mod diffsinger;
pub use diffsinger::{effective_depth, DiffSingerRenderer, DIFFSINGER};
