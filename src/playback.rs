//! Playback and export commands on top of the render engine.

use crate::engine::{LiveMix, RenderPass};
use crate::project::Project;
use crate::{RenderEngine, Result};
use arc_swap::{ArcSwap, ArcSwapOption};
use cantare_core::music::decibel_to_volume;
use cantare_core::signal::{AudioOutput, ExportAdapter, Fader, MasterAdapter, PlaybackState, SineTone};
use cantare_core::{CancellationToken, Notification, TimeAxis};
use cantare_export::{check_writable, write_wav_mono, WavConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Playhead reported while playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayPosition {
    pub tick: i64,
    /// The master is emitting silence until the phrase under the playhead is rendered.
    pub waiting: bool,
}

struct LiveSession {
    master: Arc<MasterAdapter>,
    faders: Vec<Arc<Fader>>,
    start_ms: f64,
    time_axis: TimeAxis,
}

/// Owns the audio output and the cancellation handle of the current pass.
///
/// Every command that starts a pass (play, pre-render, export) cancels the
/// previous pass and installs a fresh handle. Fader commands take effect on
/// the next pulled buffer.
pub struct PlaybackManager {
    engine: Arc<RenderEngine>,
    output: Arc<dyn AudioOutput>,
    session: ArcSwapOption<LiveSession>,
    cancellation: ArcSwap<CancellationToken>,
}

impl PlaybackManager {
    pub fn new(engine: Arc<RenderEngine>, output: Arc<dyn AudioOutput>) -> Self {
        Self {
            engine,
            output,
            session: ArcSwapOption::empty(),
            cancellation: ArcSwap::from_pointee(CancellationToken::new()),
        }
    }

    pub fn engine(&self) -> &Arc<RenderEngine> {
        &self.engine
    }

    pub fn state(&self) -> PlaybackState {
        self.output.state()
    }

    pub fn is_playing(&self) -> bool {
        self.output.state() == PlaybackState::Playing
    }

    /// Cancel the current pass and hand out the handle for the next one.
    fn renew_cancellation(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = self.cancellation.swap(Arc::new(token.clone()));
        previous.cancel();
        token
    }

    fn notify(&self, notification: Notification) {
        self.engine.sink().notify(notification);
    }

    /// Resume if paused; otherwise render from `tick` and start playing.
    pub fn play(&self, project: &Project, tick: i64) -> Result<()> {
        if self.output.state() == PlaybackState::Paused && self.session.load().is_some() {
            self.output.play();
            return Ok(());
        }
        self.stop();

        let token = self.renew_cancellation();
        let LiveMix {
            master,
            faders,
            start_ms,
            pass,
        } = self.engine.render_project(project, tick, &token)?;
        tracing::info!(tick, start_ms, jobs = pass.jobs(), "start playback");
        // Workers fill the wave sources; the pass handle is not needed here.
        drop(pass);

        self.output.init(master.clone());
        self.session.store(Some(Arc::new(LiveSession {
            master,
            faders,
            start_ms,
            time_axis: project.time_axis.clone(),
        })));
        self.output.play();
        Ok(())
    }

    pub fn pause(&self) {
        self.output.pause();
    }

    pub fn stop(&self) {
        self.output.stop();
        self.session.store(None);
    }

    pub fn play_or_pause(&self, project: &Project, tick: i64) -> Result<()> {
        if self.is_playing() {
            self.pause();
            Ok(())
        } else {
            self.play(project, tick)
        }
    }

    /// Replace playback with a test tone. Call [`SineTone::stop`] to fade it out.
    pub fn play_tone(&self, freq: f32) -> Arc<SineTone> {
        self.stop();
        let tone = Arc::new(SineTone::new(freq, self.engine.sample_rate()));
        self.output.init(tone.clone());
        self.output.play();
        tone
    }

    /// `None` unless a rendered project is playing or paused.
    pub fn play_position(&self) -> Option<PlayPosition> {
        if self.output.state() == PlaybackState::Stopped {
            return None;
        }
        let session = self.session.load_full()?;
        let played = self.output.position().saturating_sub(session.master.waited());
        let ms = played as f64 * 1000.0 / session.master.sample_rate() as f64;
        Some(PlayPosition {
            tick: session.time_axis.ms_to_tick(session.start_ms + ms),
            waiting: session.master.is_waiting(),
        })
    }

    fn with_fader(&self, track: usize, apply: impl FnOnce(&Fader)) {
        let session = self.session.load();
        if let Some(session) = &*session {
            if let Some(fader) = session.faders.get(track) {
                apply(fader);
            }
        }
    }

    pub fn set_track_volume(&self, track: usize, db: f64) {
        self.with_fader(track, |f| f.set_scale(decibel_to_volume(db)));
    }

    pub fn set_track_pan(&self, track: usize, pan: f32) {
        self.with_fader(track, |f| f.set_pan(pan));
    }

    /// Muting only silences the fader; phrases of a track muted before play
    /// were never rendered.
    pub fn set_track_muted(&self, track: usize, muted: bool) {
        self.with_fader(track, |f| f.set_muted(muted));
    }

    /// Warm the render cache in the background. `None` when pre-rendering is
    /// disabled in the settings.
    pub fn schedule_pre_render(&self, project: &Project) -> Result<Option<RenderPass>> {
        if !self.engine.settings().pre_render {
            return Ok(None);
        }
        let token = self.renew_cancellation();
        tracing::debug!(phrases = project.phrase_count(), "schedule pre-render");
        self.engine.pre_render_project(project, &token).map(Some)
    }

    /// Render all unmuted tracks and write one mono file. Nothing is written
    /// unless every phrase rendered.
    pub fn render_mixdown(&self, project: &Project, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let token = self.renew_cancellation();
        let mix = match self.engine.render_mixdown(project, &token) {
            Ok(mix) => mix,
            Err(e) => {
                if !e.is_cancelled() {
                    tracing::error!(error = %e, "mixdown render failed");
                    self.notify(Notification::error("Failed to render.", &e));
                }
                return Err(e);
            }
        };
        let samples = ExportAdapter::new(mix).to_mono();
        self.export(path, &samples)
    }

    /// Render each unmuted track to `{dir}/{index:02}-{name}.wav`.
    ///
    /// A track that fails to render or write is reported and skipped. Returns
    /// the files written.
    pub fn render_to_files(&self, project: &Project, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        let token = self.renew_cancellation();
        let mixes = self.engine.render_tracks(project, &token)?;
        std::fs::create_dir_all(dir)?;

        let mut written = Vec::with_capacity(mixes.len());
        for track in mixes {
            let Some(mix) = track.mix else {
                tracing::warn!(track = track.index, "skipping export of failed track");
                continue;
            };
            let path = dir.join(project.tracks[track.index].export_file_name(track.index));
            let samples = ExportAdapter::new(mix).to_mono();
            if self.export(&path, &samples).is_ok() {
                written.push(path);
            }
        }
        Ok(written)
    }

    fn export(&self, path: &Path, samples: &[f32]) -> Result<()> {
        self.notify(Notification::status(format!("Exporting to {}.", path.display())));
        let config = WavConfig::pcm16(self.engine.sample_rate());
        let result = check_writable(path).and_then(|()| write_wav_mono(path, samples, &config));
        match result {
            Ok(()) => {
                tracing::info!(path = %path.display(), samples = samples.len(), "exported");
                self.notify(Notification::status(format!("Exported to {}.", path.display())));
                Ok(())
            }
            Err(e) => {
                let message = format!("Failed to export {}.", path.display());
                tracing::error!(path = %path.display(), error = %e, "export failed");
                self.notify(Notification::error(message.clone(), &e));
                self.notify(Notification::status(message));
                Err(e.into())
            }
        }
    }
}

impl std::fmt::Debug for PlaybackManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackManager")
            .field("state", &self.output.state())
            .field("live", &self.session.load().is_some())
            .finish_non_exhaustive()
    }
}
