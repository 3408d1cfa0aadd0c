//! Playback manager integration tests
//!
//! Drives a `DummyAudioOutput` by hand the way a device callback would and
//! checks the play/pause state machine, play position, fader commands and the
//! export commands.

use crate::helpers::*;
use approx::assert_abs_diff_eq;
use cantare::export::read_wav_mono;
use cantare::prelude::*;
use cantare::{PlaybackState, Project, Track};
use std::time::Duration;

const BLOCK: usize = 400;

fn lead_project(trace: &Trace) -> Project {
    let voice = test_voice("alto", trace, Duration::ZERO);
    Project::default().with_track(Track::new("Lead").with_phrases(vec![two_phone_phrase(voice, 1000.0)]))
}

/// Pull blocks until the playhead reaches `ms` on rendered audio; returns the last block.
fn play_until(playback: &PlaybackManager, output: &DummyAudioOutput, project: &Project, ms: f64) -> Vec<f32> {
    let target = project.time_axis.ms_to_tick(ms);
    for _ in 0..10_000 {
        let block = output.pull(BLOCK);
        let position = playback.play_position().expect("playing");
        if position.waiting {
            std::thread::sleep(Duration::from_millis(1));
        } else if position.tick >= target {
            return block;
        }
    }
    panic!("playback never reached {ms} ms");
}

fn setup(dir: &std::path::Path) -> (Arc<DummyAudioOutput>, PlaybackManager) {
    let output = Arc::new(DummyAudioOutput::new());
    let playback = PlaybackManager::new(test_engine(test_settings(dir)), output.clone());
    (output, playback)
}

#[test]
fn test_play_position_follows_rendered_audio() {
    let dir = tempfile::tempdir().unwrap();
    let trace = Trace::default();
    let project = lead_project(&trace);
    let (output, playback) = setup(dir.path());

    assert!(playback.play_position().is_none());
    playback.play(&project, 0).unwrap();
    assert_eq!(playback.state(), PlaybackState::Playing);

    // Phrase audio starts at 950 ms; play through 1000 ms.
    let last = play_until(&playback, &output, &project, 1000.0);
    let position = playback.play_position().unwrap();
    assert!(!position.waiting);
    assert_eq!(position.tick, project.time_axis.ms_to_tick(1000.0));
    assert_abs_diff_eq!(peak(&last), VOICE_LEVEL, epsilon = 1e-3);
}

#[test]
fn test_pause_resumes_without_rendering_again() {
    let dir = tempfile::tempdir().unwrap();
    let trace = Trace::default();
    let project = lead_project(&trace);
    let (output, playback) = setup(dir.path());

    playback.play(&project, 0).unwrap();
    play_until(&playback, &output, &project, 1000.0);
    let before = playback.play_position().unwrap().tick;

    playback.play_or_pause(&project, 0).unwrap();
    assert_eq!(playback.state(), PlaybackState::Paused);
    assert!(output.pull(BLOCK).iter().all(|&s| s == 0.0));
    assert_eq!(playback.play_position().unwrap().tick, before);

    playback.play_or_pause(&project, 0).unwrap();
    assert_eq!(playback.state(), PlaybackState::Playing);
    output.pull(BLOCK);
    assert!(playback.play_position().unwrap().tick > before);
    assert_eq!(inference_calls(&trace, "acoustic"), 1);

    playback.stop();
    assert_eq!(playback.state(), PlaybackState::Stopped);
    assert!(playback.play_position().is_none());
}

#[test]
fn test_fader_commands_apply_to_next_block() {
    let dir = tempfile::tempdir().unwrap();
    let trace = Trace::default();
    let project = lead_project(&trace);
    let (output, playback) = setup(dir.path());

    playback.play(&project, 0).unwrap();
    play_until(&playback, &output, &project, 1000.0);

    playback.set_track_volume(0, -6.0);
    output.pull(BLOCK);
    let quieter = output.pull(BLOCK);
    assert_abs_diff_eq!(peak(&quieter), VOICE_LEVEL * 10f32.powf(-6.0 / 20.0), epsilon = 1e-3);

    playback.set_track_pan(0, -100.0);
    output.pull(BLOCK);
    let left_only = output.pull(BLOCK);
    assert!(left_only.chunks_exact(2).all(|frame| frame[1] == 0.0));
    assert!(peak(&left_only) > 0.0);

    playback.set_track_muted(0, true);
    output.pull(BLOCK);
    assert!(output.pull(BLOCK).iter().all(|&s| s == 0.0));

    // Unknown tracks are ignored.
    playback.set_track_volume(7, 0.0);
}

#[test]
fn test_play_tone_replaces_playback() {
    let dir = tempfile::tempdir().unwrap();
    let (output, playback) = setup(dir.path());

    let tone = playback.play_tone(440.0);
    assert!(playback.is_playing());
    assert!(peak(&output.pull(BLOCK)) > 0.0);
    assert!(playback.play_position().is_none());

    tone.stop();
    output.pull(BLOCK);
    assert_eq!(playback.state(), PlaybackState::Stopped);
}

#[test]
fn test_render_mixdown_writes_complete_file() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let trace = Trace::default();
    let project = lead_project(&trace);
    let (sink, notifications) = ChannelSink::new();
    let engine = test_engine_with_sink(test_settings(dir.path()), Arc::new(sink));
    let playback = PlaybackManager::new(engine, Arc::new(DummyAudioOutput::new()));

    let path = out_dir.path().join("mix.wav");
    playback.render_mixdown(&project, &path).unwrap();

    let (samples, sample_rate) = read_wav_mono(&path).unwrap();
    assert_eq!(sample_rate, TEST_SAMPLE_RATE);
    assert_eq!(samples.len(), frames(950.0) + frames(600.0));
    assert_abs_diff_eq!(samples[frames(1200.0)], VOICE_LEVEL, epsilon = 1e-3);

    let messages: Vec<String> = notifications
        .try_iter()
        .filter_map(|n| match n {
            Notification::Progress { total: 0, message, .. } if !message.is_empty() => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(
        messages,
        vec![
            format!("Exporting to {}.", path.display()),
            format!("Exported to {}.", path.display()),
        ]
    );
}

#[test]
fn test_export_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let trace = Trace::default();
    let project = lead_project(&trace);
    let (sink, notifications) = ChannelSink::new();
    let engine = test_engine_with_sink(test_settings(dir.path()), Arc::new(sink));
    let playback = PlaybackManager::new(engine, Arc::new(DummyAudioOutput::new()));

    let path = dir.path().join("missing").join("mix.wav");
    assert!(playback.render_mixdown(&project, &path).is_err());
    assert!(!path.exists());

    let expected = format!("Failed to export {}.", path.display());
    assert!(notifications
        .try_iter()
        .any(|n| matches!(n, Notification::Error { message, .. } if message == expected)));
}

#[test]
fn test_render_to_files_skips_muted_tracks() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let trace = Trace::default();
    let voice = test_voice("alto", &trace, Duration::ZERO);
    let project = Project::default()
        .with_track(
            Track::new("Lead")
                .with_phrases(vec![two_phone_phrase(voice.clone(), 0.0)])
                .volume_db(-12.0),
        )
        .with_track(
            Track::new("Harmony")
                .with_phrases(vec![two_phone_phrase(voice, 500.0)])
                .muted(true),
        );
    let (_, playback) = setup(dir.path());

    let written = playback.render_to_files(&project, out_dir.path().join("stems")).unwrap();
    assert_eq!(written, vec![out_dir.path().join("stems").join("00-Lead.wav")]);
    assert!(!out_dir.path().join("stems").join("01-Harmony.wav").exists());

    // Stems are raw track mixes; the fader is not applied.
    let (samples, _) = read_wav_mono(&written[0]).unwrap();
    assert_abs_diff_eq!(peak(&samples), VOICE_LEVEL, epsilon = 1e-3);
}

#[test]
fn test_pre_render_respects_settings() {
    let dir = tempfile::tempdir().unwrap();
    let trace = Trace::default();
    let project = lead_project(&trace);

    let mut settings = test_settings(dir.path());
    settings.pre_render = false;
    let playback = PlaybackManager::new(test_engine(settings), Arc::new(DummyAudioOutput::new()));
    assert!(playback.schedule_pre_render(&project).unwrap().is_none());

    let (_, playback) = setup(dir.path());
    let pass = playback.schedule_pre_render(&project).unwrap().unwrap();
    assert!(pass.wait().is_complete());
    assert_eq!(inference_calls(&trace, "vocoder"), 1);
}

#[test]
fn test_new_pass_cancels_previous_one() {
    let dir = tempfile::tempdir().unwrap();
    let trace = Trace::default();
    let voice = test_voice("alto", &trace, Duration::from_millis(20));
    let phrases = (0..6)
        .map(|i| two_phone_phrase(voice.clone(), i as f64 * 1000.0))
        .collect();
    let project = Project::default().with_track(Track::new("Lead").with_phrases(phrases));

    let mut settings = test_settings(dir.path());
    settings.num_render_threads = 1;
    let playback = PlaybackManager::new(test_engine(settings), Arc::new(DummyAudioOutput::new()));

    let pre_render = playback.schedule_pre_render(&project).unwrap().unwrap();
    let out = dir.path().join("mix.wav");
    playback.render_mixdown(&project, &out).unwrap();

    let report = pre_render.wait();
    assert!(!report.cancelled.is_empty(), "{report:?}");
    assert!(out.exists());
    // A phrase cancelled after its vocoder call is synthesized again by the mixdown.
    let calls = inference_calls(&trace, "vocoder");
    assert!((6..=7).contains(&calls), "{calls} vocoder calls");
}
