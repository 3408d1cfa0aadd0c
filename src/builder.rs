//! Builder for configuring and constructing a `RenderEngine`.

use crate::{RenderEngine, Result};
use cantare_core::{NotificationSink, NullSink, RenderSettings, Renderer, RendererRegistry};
use std::sync::Arc;

/// Renderer kinds compiled in by feature (currently `neural`) are registered
/// automatically unless a renderer of the same kind was supplied.
///
/// The worker pool size comes from `RenderSettings::num_render_threads` unless
/// overridden with [`threads`](Self::threads).
///
/// # Example
///
/// ```ignore
/// use cantare::prelude::*;
///
/// let (sink, notifications) = ChannelSink::new();
/// let engine = RenderEngine::builder()
///     .settings(RenderSettings::load("cantare.toml")?)
///     .notifications(Arc::new(sink))
///     .build()?;
/// ```
#[derive(Default)]
pub struct RenderEngineBuilder {
    settings: RenderSettings,
    registry: Option<Arc<RendererRegistry>>,
    renderers: Vec<Arc<dyn Renderer>>,
    sink: Option<Arc<dyn NotificationSink>>,
    threads: Option<usize>,
}

impl RenderEngineBuilder {
    pub fn settings(mut self, settings: RenderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Share an existing registry instead of creating one.
    pub fn registry(mut self, registry: Arc<RendererRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Register an additional renderer kind.
    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderers.push(renderer);
        self
    }

    /// Default: notifications are dropped.
    pub fn notifications(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn threads(mut self, count: usize) -> Self {
        self.threads = Some(count);
        self
    }

    pub fn build(self) -> Result<RenderEngine> {
        let mut settings = self.settings;
        if let Some(threads) = self.threads {
            settings.num_render_threads = threads;
        }
        settings.validate()?;

        let registry = self.registry.unwrap_or_default();
        for renderer in self.renderers {
            registry.register(renderer);
        }

        #[cfg(feature = "neural")]
        if registry.get(cantare_neural::DIFFSINGER).is_none() {
            registry.register(Arc::new(cantare_neural::DiffSingerRenderer::new(settings.clone())));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.num_render_threads)
            .thread_name(|i| format!("cantare-render-{i}"))
            .panic_handler(|_| tracing::error!("render worker panicked outside a phrase render"))
            .build()?;

        tracing::info!(
            threads = settings.num_render_threads,
            sample_rate = settings.sample_rate,
            kinds = ?registry.kinds(),
            "render engine ready"
        );

        let sink = self.sink.unwrap_or_else(|| Arc::new(NullSink));
        Ok(RenderEngine::from_parts(settings, registry, Arc::new(pool), sink))
    }
}
