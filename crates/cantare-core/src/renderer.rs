//! Renderer capability interface and per-voice renderer selection.
//!
//! Renderer kinds form an open set: each voice names its kind and the
//! [`RendererRegistry`] resolves it at load time, so new kinds register
//! without touching the scheduler.

use crate::cancel::CancellationToken;
use crate::expr::ExpressionDescriptor;
use crate::phrase::RenderPhrase;
use crate::progress::Progress;
use crate::{Error, Result};
use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;

/// A loaded voice, shared read-only by every render of that voice.
pub trait Singer: Send + Sync {
    /// Stable identifier, part of every phrase hash.
    fn id(&self) -> &str;

    fn name(&self) -> &str {
        self.id()
    }

    /// Key into the [`RendererRegistry`].
    fn renderer_kind(&self) -> &str;

    /// Downcast to the concrete voice type of the renderer kind.
    fn as_any(&self) -> &dyn Any;
}

/// Timing layout of a phrase, available before synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderLayout {
    /// Silence rendered before the phrase start.
    pub leading_ms: f64,
    pub position_ms: f64,
    pub estimated_length_ms: f64,
}

impl RenderLayout {
    /// Timeline start of the rendered audio.
    pub fn start_ms(&self) -> f64 {
        self.position_ms - self.leading_ms
    }

    pub fn end_ms(&self) -> f64 {
        self.start_ms() + self.estimated_length_ms
    }
}

/// Output of one phrase render: mono samples plus their layout.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderResult {
    pub leading_ms: f64,
    pub position_ms: f64,
    pub estimated_length_ms: f64,
    pub samples: Vec<f32>,
    cancelled: bool,
}

impl RenderResult {
    pub fn new(layout: RenderLayout, samples: Vec<f32>) -> Self {
        Self {
            leading_ms: layout.leading_ms,
            position_ms: layout.position_ms,
            estimated_length_ms: layout.estimated_length_ms,
            samples,
            cancelled: false,
        }
    }

    /// Empty result of a job that was cancelled before doing any work.
    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Self::default()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn layout(&self) -> RenderLayout {
        RenderLayout {
            leading_ms: self.leading_ms,
            position_ms: self.position_ms,
            estimated_length_ms: self.estimated_length_ms,
        }
    }
}

/// A renderer kind.
///
/// `render` runs on worker threads; implementations serialize whatever their
/// backend cannot run concurrently.
pub trait Renderer: Send + Sync {
    fn kind(&self) -> &str;

    /// Pure timing layout; never runs inference.
    fn layout(&self, phrase: &RenderPhrase) -> RenderLayout;

    fn supports_expression(&self, descriptor: &ExpressionDescriptor) -> bool;

    fn suggested_expressions(&self, singer: &dyn Singer) -> Vec<ExpressionDescriptor>;

    /// Render one phrase.
    ///
    /// Returns [`RenderResult::cancelled`] when `cancellation` is already set
    /// on entry. Reports progress exactly once, on completion.
    fn render(
        &self,
        phrase: &RenderPhrase,
        progress: &Progress,
        track_no: usize,
        cancellation: &CancellationToken,
        is_pre_render: bool,
    ) -> Result<RenderResult>;
}

/// Renderer kinds by name.
#[derive(Default)]
pub struct RendererRegistry {
    renderers: DashMap<String, Arc<dyn Renderer>>,
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `renderer` under its kind, replacing any previous one.
    pub fn register(&self, renderer: Arc<dyn Renderer>) {
        let kind = renderer.kind().to_string();
        tracing::debug!(kind = %kind, "registered renderer");
        self.renderers.insert(kind, renderer);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn Renderer>> {
        self.renderers.get(kind).map(|r| Arc::clone(r.value()))
    }

    pub fn for_singer(&self, singer: &dyn Singer) -> Result<Arc<dyn Renderer>> {
        self.get(singer.renderer_kind())
            .ok_or_else(|| Error::UnknownRenderer(singer.renderer_kind().to_string()))
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.renderers.iter().map(|e| e.key().clone()).collect();
        kinds.sort();
        kinds
    }
}

impl std::fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
