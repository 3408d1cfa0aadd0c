//! RenderEngine that turns a project into rendered, mixable audio.

use crate::project::{Project, Track};
use crate::{Error, Result};
use cantare_core::music::decibel_to_volume;
use cantare_core::signal::{Fader, MasterAdapter, SignalSource, WaveMix, WaveSource};
use cantare_core::{
    CancellationToken, Notification, NotificationSink, Progress, RenderPhrase, RenderSettings,
    Renderer, RendererRegistry,
};
use crossbeam_channel::{Receiver, Sender};
use rayon::ThreadPool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One phrase waiting for a worker.
struct Job {
    track: usize,
    phrase: RenderPhrase,
    renderer: Arc<dyn Renderer>,
    source: Arc<WaveSource>,
    start_ms: f64,
}

enum Outcome {
    Rendered { track: usize },
    Cancelled { track: usize },
    Failed { track: usize, error: cantare_core::Error },
}

/// Jobs of one render pass in flight on the worker pool.
///
/// Dropping the handle leaves the jobs running; their audio still reaches the
/// wave sources and the cache.
pub struct RenderPass {
    outcomes: Receiver<Outcome>,
    jobs: usize,
}

impl RenderPass {
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Block until every job of the pass has finished.
    pub fn wait(self) -> PassReport {
        let mut report = PassReport {
            total: self.jobs,
            ..PassReport::default()
        };
        for _ in 0..self.jobs {
            let Ok(outcome) = self.outcomes.recv() else {
                break;
            };
            match outcome {
                Outcome::Rendered { track } => report.rendered.push(track),
                Outcome::Cancelled { track } => report.cancelled.push(track),
                Outcome::Failed { track, error } => report.failures.push((track, error)),
            }
        }
        report
    }
}

impl std::fmt::Debug for RenderPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPass").field("jobs", &self.jobs).finish()
    }
}

/// Outcome of a finished pass, by track index of each job.
#[derive(Debug, Default)]
pub struct PassReport {
    pub total: usize,
    pub rendered: Vec<usize>,
    pub cancelled: Vec<usize>,
    pub failures: Vec<(usize, cantare_core::Error)>,
}

impl PassReport {
    pub fn is_complete(&self) -> bool {
        self.rendered.len() == self.total
    }

    pub fn track_failed(&self, track: usize) -> bool {
        self.failures.iter().any(|(t, _)| *t == track)
    }

    /// Ok only when every job rendered.
    pub fn into_result(self) -> Result<()> {
        let failed = self.failures.len();
        if let Some((_, first)) = self.failures.into_iter().next() {
            return Err(Error::Render {
                failed,
                total: self.total,
                first,
            });
        }
        if !self.cancelled.is_empty() {
            return Err(cantare_core::Error::Cancelled.into());
        }
        Ok(())
    }
}

/// Playback mix of a live pass.
pub struct LiveMix {
    pub master: Arc<MasterAdapter>,
    /// One fader per project track, by track index.
    pub faders: Vec<Arc<Fader>>,
    /// Timeline position of master frame 0.
    pub start_ms: f64,
    pub pass: RenderPass,
}

/// Raw mix of one exported track.
pub struct TrackMix {
    pub index: usize,
    /// `None` when a phrase of the track failed to render.
    pub mix: Option<Arc<WaveMix>>,
}

/// Schedules phrase renders on a bounded worker pool and assembles the mixes.
///
/// Phrases are rendered by the renderer their voice names in the
/// [`RendererRegistry`]. Mixing is position-determined, so workers may finish
/// in any order.
///
/// # Example
///
/// ```ignore
/// use cantare::prelude::*;
///
/// let engine = RenderEngine::builder()
///     .settings(RenderSettings::default())
///     .build()?;
///
/// let token = CancellationToken::new();
/// let mix = engine.render_mixdown(&project, &token)?;
/// let mono = ExportAdapter::new(mix).to_mono();
/// ```
pub struct RenderEngine {
    settings: RenderSettings,
    registry: Arc<RendererRegistry>,
    pool: Arc<ThreadPool>,
    sink: Arc<dyn NotificationSink>,
}

impl RenderEngine {
    pub fn builder() -> crate::RenderEngineBuilder {
        crate::RenderEngineBuilder::default()
    }

    pub(crate) fn from_parts(
        settings: RenderSettings,
        registry: Arc<RendererRegistry>,
        pool: Arc<ThreadPool>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            settings,
            registry,
            pool,
            sink,
        }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn sample_rate(&self) -> u32 {
        self.settings.sample_rate
    }

    pub fn registry(&self) -> &Arc<RendererRegistry> {
        &self.registry
    }

    pub fn sink(&self) -> &Arc<dyn NotificationSink> {
        &self.sink
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Start rendering from `start_tick` for playback and return the master mix
    /// at once. The master waits, silently, for phrases still rendering.
    ///
    /// Every track gets a fader so fader indices match track indices; phrases
    /// of muted tracks are not rendered.
    pub fn render_project(
        &self,
        project: &Project,
        start_tick: i64,
        cancellation: &CancellationToken,
    ) -> Result<LiveMix> {
        let start_ms = project.time_axis.tick_to_ms(start_tick);
        let (sources, jobs) = self.plan(project, start_ms, |track| !track.muted)?;
        let faders: Vec<Arc<Fader>> = sources
            .into_iter()
            .zip(&project.tracks)
            .map(|(sources, track)| Arc::new(self.fader(track, sources)))
            .collect();
        let master_mix = WaveMix::new(faders.iter().map(|f| f.clone() as Arc<dyn SignalSource>).collect());
        let master = Arc::new(MasterAdapter::new(Arc::new(master_mix), self.sample_rate()));
        tracing::info!(start_ms, phrases = jobs.len(), "render project");
        let pass = self.dispatch(jobs, cancellation, false);
        Ok(LiveMix {
            master,
            faders,
            start_ms,
            pass,
        })
    }

    /// Render every unmuted track from the start and wait for all of it.
    ///
    /// Fails if any phrase fails or the pass is cancelled, so a partial mix
    /// never reaches a file.
    pub fn render_mixdown(&self, project: &Project, cancellation: &CancellationToken) -> Result<Arc<WaveMix>> {
        let (sources, jobs) = self.plan(project, 0.0, |track| !track.muted)?;
        let faders: Vec<Arc<dyn SignalSource>> = sources
            .into_iter()
            .zip(&project.tracks)
            .filter(|(_, track)| !track.muted)
            .map(|(sources, track)| Arc::new(self.fader(track, sources)) as Arc<dyn SignalSource>)
            .collect();
        tracing::info!(phrases = jobs.len(), "render mixdown");
        self.dispatch(jobs, cancellation, false).wait().into_result()?;
        Ok(Arc::new(WaveMix::new(faders)))
    }

    /// Render every unmuted track from the start, one raw mix per track.
    ///
    /// A track with a failed phrase yields no mix; the others are unaffected.
    /// Cancellation fails the whole call.
    pub fn render_tracks(&self, project: &Project, cancellation: &CancellationToken) -> Result<Vec<TrackMix>> {
        let (sources, jobs) = self.plan(project, 0.0, |track| !track.muted)?;
        tracing::info!(phrases = jobs.len(), "render tracks");
        let report = self.dispatch(jobs, cancellation, false).wait();
        if !report.cancelled.is_empty() {
            return Err(cantare_core::Error::Cancelled.into());
        }
        Ok(sources
            .into_iter()
            .enumerate()
            .filter(|(index, _)| !project.tracks[*index].muted)
            .map(|(index, sources)| TrackMix {
                index,
                mix: (!report.track_failed(index)).then(|| Arc::new(WaveMix::new(sources))),
            })
            .collect())
    }

    /// Warm the cache with every phrase of the project, muted tracks included.
    /// Returns without waiting.
    pub fn pre_render_project(&self, project: &Project, cancellation: &CancellationToken) -> Result<RenderPass> {
        let (_, jobs) = self.plan(project, 0.0, |_| true)?;
        tracing::info!(phrases = jobs.len(), "pre-render project");
        Ok(self.dispatch(jobs, cancellation, true))
    }

    fn fader(&self, track: &Track, sources: Vec<Arc<dyn SignalSource>>) -> Fader {
        Fader::with_settings(
            Arc::new(WaveMix::new(sources)),
            decibel_to_volume(track.volume_db),
            track.pan,
            track.muted,
        )
    }

    /// Wave sources per track (empty for excluded tracks) and the jobs filling
    /// them, ordered by timeline position. Phrases ending before `start_ms`
    /// are skipped.
    #[allow(clippy::type_complexity)]
    fn plan(
        &self,
        project: &Project,
        start_ms: f64,
        include: impl Fn(&Track) -> bool,
    ) -> Result<(Vec<Vec<Arc<dyn SignalSource>>>, Vec<Job>)> {
        let mut sources = Vec::with_capacity(project.tracks.len());
        let mut jobs = Vec::new();
        for (index, track) in project.tracks.iter().enumerate() {
            let mut track_sources: Vec<Arc<dyn SignalSource>> = Vec::new();
            if include(track) {
                for phrase in &track.phrases {
                    let renderer = self.registry.for_singer(phrase.singer.as_ref())?;
                    let layout = renderer.layout(phrase);
                    if layout.end_ms() <= start_ms {
                        continue;
                    }
                    let source = Arc::new(WaveSource::new(
                        layout.start_ms() - start_ms,
                        layout.estimated_length_ms,
                        self.sample_rate(),
                    ));
                    track_sources.push(source.clone());
                    jobs.push(Job {
                        track: index,
                        phrase: phrase.clone(),
                        renderer,
                        source,
                        start_ms: layout.start_ms(),
                    });
                }
            }
            sources.push(track_sources);
        }
        jobs.sort_by(|a, b| a.start_ms.total_cmp(&b.start_ms));
        Ok((sources, jobs))
    }

    fn dispatch(&self, jobs: Vec<Job>, cancellation: &CancellationToken, is_pre_render: bool) -> RenderPass {
        let (tx, rx) = crossbeam_channel::unbounded();
        let total_phones = jobs.iter().map(|j| j.phrase.phones.len()).sum();
        let progress = Arc::new(Progress::new(total_phones, self.sink.clone()));
        let remaining = Arc::new(AtomicUsize::new(jobs.len()));
        let count = jobs.len();

        for job in jobs {
            let worker = Worker {
                tx: tx.clone(),
                progress: progress.clone(),
                remaining: remaining.clone(),
                sink: self.sink.clone(),
                cancellation: cancellation.clone(),
                is_pre_render,
            };
            self.pool.spawn_fifo(move || worker.run(job));
        }

        RenderPass {
            outcomes: rx,
            jobs: count,
        }
    }
}

impl std::fmt::Debug for RenderEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderEngine")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("threads", &self.num_threads())
            .finish_non_exhaustive()
    }
}

/// Per-job share of the pass state moved onto a worker thread.
struct Worker {
    tx: Sender<Outcome>,
    progress: Arc<Progress>,
    remaining: Arc<AtomicUsize>,
    sink: Arc<dyn NotificationSink>,
    cancellation: CancellationToken,
    is_pre_render: bool,
}

impl Worker {
    fn run(self, job: Job) {
        let track = job.track;
        let rendered = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            job.renderer.render(
                &job.phrase,
                &self.progress,
                track,
                &self.cancellation,
                self.is_pre_render,
            )
        }))
        .unwrap_or_else(|payload| {
            Err(cantare_core::Error::Inference(format!(
                "renderer panicked: {}",
                panic_message(&*payload)
            )))
        });
        let outcome = match rendered {
            Ok(result) if result.is_cancelled() => {
                job.source.set_empty();
                Outcome::Cancelled { track }
            }
            Ok(result) => {
                job.source.set_samples(result.samples);
                Outcome::Rendered { track }
            }
            Err(e) if e.is_cancelled() => {
                job.source.set_empty();
                Outcome::Cancelled { track }
            }
            Err(error) => {
                tracing::error!(track, position_ms = job.phrase.position_ms, error = %error, "failed to render phrase");
                self.sink.notify(Notification::error("Failed to render.", &error));
                job.source.set_empty();
                Outcome::Failed { track, error }
            }
        };

        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.progress.clear();
            tracing::debug!(pre_render = self.is_pre_render, "render pass finished");
        }
        // The pass handle may already be gone.
        let _ = self.tx.send(outcome);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
