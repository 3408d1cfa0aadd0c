//! # Cantare - Singing Voice Phrase Renderer
//!
//! Renders phrases of a singing project through neural voice models and mixes
//! them for playback or export.
//!
//! ## Architecture
//!
//! Cantare is an umbrella crate that coordinates:
//! - **cantare-core** - Phrase model, curve sampler, renderer traits, signal chain
//! - **cantare-neural** - DiffSinger renderer (variance, acoustic, vocoder, render cache)
//! - **cantare-export** - WAV files and sample-rate conversion
//!
//! The root crate adds the [`RenderEngine`], which fans phrase renders out on a
//! worker pool, and the [`PlaybackManager`], which drives playback, pre-render
//! and export passes.
//!
//! ## Quick Start
//!
//! ```ignore
//! use cantare::prelude::*;
//!
//! let engine = Arc::new(RenderEngine::builder().settings(settings).build()?);
//! let output = Arc::new(DummyAudioOutput::new());
//! let playback = PlaybackManager::new(engine, output.clone());
//!
//! playback.play(&project, 0)?;
//! let block = output.pull(512);
//!
//! playback.render_mixdown(&project, "mix.wav")?;
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - `neural`
//! - `neural` - DiffSinger renderer kind, registered automatically by the builder

/// Re-export of cantare-core for direct access
pub use cantare_core as core;

pub use cantare_core::{
    sample_curve, CancellationToken, ChannelSink, Curve, ExpressionDescriptor,
    FrameGrid, Note, Notification, NotificationSink, NullSink, Phone, Progress, RenderLayout,
    RenderPhrase, RenderResult, RenderSettings, Renderer, RendererRegistry, Singer, TimeAxis,
};

pub use cantare_core::signal::{
    AudioOutput, DummyAudioOutput, ExportAdapter, Fader, MasterAdapter, PlaybackState,
    SignalSource, SineTone, WaveMix, WaveSource,
};

pub use cantare_export as export;

#[cfg(feature = "neural")]
pub use cantare_neural as neural;

#[cfg(feature = "neural")]
pub use cantare_neural::{DiffSingerRenderer, DiffSingerVoice, RenderCache, VoiceLoader};

pub mod error;
pub use error::{Error, Result};

mod project;
pub use project::{Project, Track};

mod builder;
mod engine;
mod playback;

pub use builder::RenderEngineBuilder;
pub use engine::{LiveMix, PassReport, RenderEngine, RenderPass, TrackMix};
pub use playback::{PlayPosition, PlaybackManager};

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{
        PlayPosition, PlaybackManager, Project, RenderEngine, RenderEngineBuilder, Track,
    };

    pub use crate::core::signal::{AudioOutput, DummyAudioOutput, ExportAdapter};
    pub use crate::core::{
        CancellationToken, ChannelSink, Curve, Note, Notification, Phone, RenderPhrase,
        RenderSettings, TimeAxis,
    };

    pub use std::sync::Arc;

    #[cfg(feature = "neural")]
    pub use crate::neural::{DiffSingerRenderer, SessionFactory, VoiceLoader};
}
