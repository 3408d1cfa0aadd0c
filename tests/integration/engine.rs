//! Render engine integration tests
//!
//! Passes over small projects of scripted voices: phrase placement in the
//! mixes, cache reuse between passes, cancellation, serialization of model
//! calls and failure isolation.

use crate::helpers::*;
use approx::assert_abs_diff_eq;
use cantare::core::music::decibel_to_volume;
use cantare::core::signal::SampleProvider;
use cantare::neural::CacheKey;
use cantare::prelude::*;
use cantare::{
    ExpressionDescriptor, Error, Fader, Progress, Project, RenderLayout, RenderResult, Renderer,
    Singer, Track,
};
use std::any::Any;
use std::collections::BTreeMap;
use std::time::Duration;

fn wav_files(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "wav"))
                .count()
        })
        .unwrap_or(0)
}

/// Renderer whose model session blows up on every phrase.
struct Crashing;

impl Renderer for Crashing {
    fn kind(&self) -> &str {
        "crashing"
    }

    fn layout(&self, phrase: &RenderPhrase) -> RenderLayout {
        RenderLayout {
            leading_ms: 0.0,
            position_ms: phrase.position_ms,
            estimated_length_ms: phrase.duration_ms,
        }
    }

    fn supports_expression(&self, _descriptor: &ExpressionDescriptor) -> bool {
        false
    }

    fn suggested_expressions(&self, _singer: &dyn Singer) -> Vec<ExpressionDescriptor> {
        Vec::new()
    }

    fn render(
        &self,
        _phrase: &RenderPhrase,
        _progress: &Progress,
        _track_no: usize,
        _cancellation: &CancellationToken,
        _is_pre_render: bool,
    ) -> cantare::core::Result<RenderResult> {
        panic!("session exploded");
    }
}

struct CrashingSinger;

impl Singer for CrashingSinger {
    fn id(&self) -> &str {
        "crash"
    }

    fn renderer_kind(&self) -> &str {
        "crashing"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn test_mixdown_places_phrase_on_timeline() {
    let dir = tempfile::tempdir().unwrap();
    let trace = Trace::default();
    let voice = test_voice("alto", &trace, Duration::ZERO);
    let phrase = two_phone_phrase(voice, 1000.0);
    let hash = phrase.hash();
    let project = Project::default().with_track(Track::new("Lead").with_phrases(vec![phrase]));

    let engine = test_engine(test_settings(dir.path()));
    let mix = engine.render_mixdown(&project, &CancellationToken::new()).unwrap();
    let mono = ExportAdapter::new(mix).to_mono();

    // 50 ms head before the phrase, 500 ms phrase, 50 ms tail.
    let start = frames(950.0);
    assert_eq!(mono.len(), start + frames(600.0));
    assert!(mono[..start].iter().all(|&s| s == 0.0));
    for &s in &mono[start..] {
        assert_abs_diff_eq!(s, VOICE_LEVEL, epsilon = 1e-3);
    }

    assert_eq!(inference_calls(&trace, "acoustic"), 1);
    assert_eq!(inference_calls(&trace, "vocoder"), 1);
    let cached = dir.path().join(CacheKey::new("ds", hash, Some(390), 30).file_name());
    assert!(cached.exists(), "missing cache file {}", cached.display());
}

#[test]
fn test_second_pass_is_served_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let trace = Trace::default();
    let voice = test_voice("alto", &trace, Duration::ZERO);
    let project = Project::default().with_track(
        Track::new("Lead").with_phrases(vec![
            two_phone_phrase(voice.clone(), 0.0),
            two_phone_phrase(voice, 1000.0),
        ]),
    );
    let engine = test_engine(test_settings(dir.path()));

    let first = ExportAdapter::new(engine.render_mixdown(&project, &CancellationToken::new()).unwrap()).to_mono();
    assert_eq!(inference_calls(&trace, "acoustic"), 2);
    assert_eq!(wav_files(dir.path()), 2);

    let second = ExportAdapter::new(engine.render_mixdown(&project, &CancellationToken::new()).unwrap()).to_mono();
    assert_eq!(first, second);
    assert_eq!(inference_calls(&trace, "acoustic"), 2);
    assert_eq!(inference_calls(&trace, "vocoder"), 2);
}

#[test]
fn test_cancelled_pass_runs_no_inference() {
    let dir = tempfile::tempdir().unwrap();
    let trace = Trace::default();
    let voice = test_voice("alto", &trace, Duration::ZERO);
    let project = Project::default().with_track(
        Track::new("Lead").with_phrases(vec![two_phone_phrase(voice, 0.0)]),
    );
    let engine = test_engine(test_settings(dir.path()));

    let token = CancellationToken::new();
    token.cancel();
    let Err(err) = engine.render_mixdown(&project, &token) else {
        panic!("cancelled mixdown succeeded");
    };
    assert!(err.is_cancelled());
    assert!(trace.lock().is_empty());
    assert_eq!(wav_files(dir.path()), 0);
}

#[test]
fn test_model_calls_never_interleave() {
    let dir = tempfile::tempdir().unwrap();
    let trace = Trace::default();
    let voice = test_voice("alto", &trace, Duration::from_millis(5));
    let phrases = (0..6)
        .map(|i| two_phone_phrase(voice.clone(), i as f64 * 1000.0))
        .collect();
    let project = Project::default().with_track(Track::new("Lead").with_phrases(phrases));
    let engine = test_engine(test_settings(dir.path()));

    engine.render_mixdown(&project, &CancellationToken::new()).unwrap();

    let trace = trace.lock();
    assert_eq!(trace.len(), 6 * 2 * 2);
    for call in trace.chunks(2) {
        assert!(call[0].starts_with("enter "), "{call:?}");
        assert_eq!(call[1], call[0].replacen("enter", "exit", 1));
    }
}

#[test]
fn test_muted_track_is_left_out_of_mixdown() {
    let dir = tempfile::tempdir().unwrap();
    let lead_trace = Trace::default();
    let muted_trace = Trace::default();
    let lead = test_voice("alto", &lead_trace, Duration::ZERO);
    let backing = test_voice("tenor", &muted_trace, Duration::ZERO);
    let project = Project::default()
        .with_track(
            Track::new("Lead")
                .with_phrases(vec![two_phone_phrase(lead, 0.0)])
                .volume_db(-6.0)
                .pan(50.0),
        )
        .with_track(
            Track::new("Backing")
                .with_phrases(vec![two_phone_phrase(backing, 200.0)])
                .muted(true),
        );
    let engine = test_engine(test_settings(dir.path()));

    let mixdown = ExportAdapter::new(engine.render_mixdown(&project, &CancellationToken::new()).unwrap()).to_mono();
    assert_eq!(inference_calls(&muted_trace, "acoustic"), 0);

    let tracks = engine.render_tracks(&project, &CancellationToken::new()).unwrap();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].index, 0);
    let raw = tracks[0].mix.clone().unwrap();
    let lead_only = ExportAdapter::new(Arc::new(Fader::with_settings(raw, decibel_to_volume(-6.0), 50.0, false))).to_mono();

    assert_eq!(mixdown, lead_only);
    assert!(peak(&mixdown) < VOICE_LEVEL);
}

#[test]
fn test_failed_phrase_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let trace = Trace::default();
    let voice = test_voice("alto", &trace, Duration::ZERO);
    let broken = RenderPhrase::new(
        voice.clone(),
        0.0,
        300.0,
        vec![Phone::new("zz", 0.0, 300.0)],
        vec![Note::new(62, 0.0, 300.0)],
        Default::default(),
    );
    let project = Project::default()
        .with_track(Track::new("Lead").with_phrases(vec![two_phone_phrase(voice, 0.0)]))
        .with_track(Track::new("Broken").with_phrases(vec![broken]));

    let (sink, notifications) = ChannelSink::new();
    let engine = test_engine_with_sink(test_settings(dir.path()), Arc::new(sink));

    match engine.render_mixdown(&project, &CancellationToken::new()) {
        Err(Error::Render { failed, total, first }) => {
            assert_eq!((failed, total), (1, 2));
            assert!(first.is_config(), "{first}");
        }
        Err(other) => panic!("expected a render failure, got {other:?}"),
        Ok(_) => panic!("mixdown with a failed phrase succeeded"),
    }
    let failures: Vec<_> = notifications
        .try_iter()
        .filter(|n| matches!(n, Notification::Error { message, .. } if message == "Failed to render."))
        .collect();
    assert_eq!(failures.len(), 1);

    let tracks = engine.render_tracks(&project, &CancellationToken::new()).unwrap();
    assert!(tracks[0].mix.is_some());
    assert!(tracks[1].mix.is_none());
}

#[test]
fn test_live_pass_skips_phrases_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let trace = Trace::default();
    let voice = test_voice("alto", &trace, Duration::ZERO);
    let project = Project::default()
        .with_track(Track::new("Lead").with_phrases(vec![
            two_phone_phrase(voice.clone(), 0.0),
            two_phone_phrase(voice, 2000.0),
        ]))
        .with_track(Track::new("Empty").muted(true));
    let engine = test_engine(test_settings(dir.path()));

    // 1500 ms at 120 bpm
    let start_tick = project.time_axis.ms_to_tick(1500.0);
    let live = engine.render_project(&project, start_tick, &CancellationToken::new()).unwrap();
    assert_abs_diff_eq!(live.start_ms, 1500.0, epsilon = 1e-9);
    assert_eq!(live.faders.len(), 2);

    let report = live.pass.wait();
    assert_eq!(report.total, 1);
    assert!(report.is_complete());
    assert_eq!(inference_calls(&trace, "acoustic"), 1);
    // Second phrase starts 450 ms into the pass and lasts 600 ms.
    assert_eq!(live.master.end_frame(), frames(450.0) + frames(600.0));
}

#[test]
fn test_pre_render_includes_muted_tracks() {
    let dir = tempfile::tempdir().unwrap();
    let lead_trace = Trace::default();
    let muted_trace = Trace::default();
    let project = Project::default()
        .with_track(Track::new("Lead").with_phrases(vec![two_phone_phrase(
            test_voice("alto", &lead_trace, Duration::ZERO),
            0.0,
        )]))
        .with_track(
            Track::new("Backing")
                .with_phrases(vec![two_phone_phrase(
                    test_voice("tenor", &muted_trace, Duration::ZERO),
                    0.0,
                )])
                .muted(true),
        );
    let engine = test_engine(test_settings(dir.path()));

    let pass = engine.pre_render_project(&project, &CancellationToken::new()).unwrap();
    assert_eq!(pass.jobs(), 2);
    pass.wait().into_result().unwrap();

    assert_eq!(inference_calls(&lead_trace, "vocoder"), 1);
    assert_eq!(inference_calls(&muted_trace, "vocoder"), 1);
    assert_eq!(wav_files(dir.path()), 2);
}

#[test]
fn test_progress_reaches_total_phones() {
    let dir = tempfile::tempdir().unwrap();
    let trace = Trace::default();
    let voice = test_voice("alto", &trace, Duration::ZERO);
    let project = Project::default().with_track(Track::new("Lead").with_phrases(vec![
        two_phone_phrase(voice.clone(), 0.0),
        two_phone_phrase(voice, 1000.0),
    ]));
    let (sink, notifications) = ChannelSink::new();
    let engine = test_engine_with_sink(test_settings(dir.path()), Arc::new(sink));

    engine.render_mixdown(&project, &CancellationToken::new()).unwrap();

    let progress: Vec<_> = notifications
        .try_iter()
        .filter_map(|n| match n {
            Notification::Progress { completed, total, message } if total > 0 => Some((completed, total, message)),
            _ => None,
        })
        .collect();
    assert_eq!(progress.len(), 2);
    assert!(progress.iter().any(|(completed, total, _)| completed == total && *total == 4));
    assert!(progress.iter().all(|(_, _, m)| m == "Track 1: diffsinger30x \"a i\""), "{progress:?}");
}

#[test]
fn test_renderer_panic_is_reported_as_failure() {
    let dir = tempfile::tempdir().unwrap();
    let trace = Trace::default();
    let voice = test_voice("alto", &trace, Duration::ZERO);
    let crashing = RenderPhrase::new(
        Arc::new(CrashingSinger),
        200.0,
        300.0,
        vec![Phone::new("a", 0.0, 300.0)],
        vec![Note::new(60, 0.0, 300.0)],
        BTreeMap::new(),
    );
    let project = Project::default()
        .with_track(Track::new("Lead").with_phrases(vec![two_phone_phrase(voice, 0.0)]))
        .with_track(Track::new("Crash").with_phrases(vec![crashing]));

    init_tracing();
    let (sink, notifications) = ChannelSink::new();
    let engine = RenderEngine::builder()
        .settings(test_settings(dir.path()))
        .renderer(Arc::new(Crashing))
        .notifications(Arc::new(sink))
        .build()
        .unwrap();

    match engine.render_mixdown(&project, &CancellationToken::new()) {
        Err(Error::Render { failed, total, first }) => {
            assert_eq!((failed, total), (1, 2));
            assert!(first.to_string().contains("session exploded"), "{first}");
        }
        Err(other) => panic!("expected a render failure, got {other:?}"),
        Ok(_) => panic!("mixdown with a crashing renderer succeeded"),
    }
    let failures = notifications
        .try_iter()
        .filter(|n| matches!(n, Notification::Error { message, .. } if message == "Failed to render."))
        .count();
    assert_eq!(failures, 1);

    // The live mix still plays through the crashed phrase's extent.
    let live = engine.render_project(&project, 0, &CancellationToken::new()).unwrap();
    let report = live.pass.wait();
    assert_eq!(report.failures.len(), 1);
    assert!(report.track_failed(1));
    let mut buffer = vec![0.0; live.master.end_frame() * 2];
    live.master.read(&mut buffer);
    assert!(!live.master.is_waiting());
    assert_eq!(live.master.position(), live.master.end_frame());
}
