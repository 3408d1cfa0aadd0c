//! Test helpers and fixtures for cantare integration tests
//!
//! Voices are assembled from scripted inference sessions that record every
//! model call into a shared trace, so tests can count inference calls and
//! check their ordering without a model runtime.

#![allow(dead_code)]

use cantare::neural::config::{DsConfig, VocoderConfig};
use cantare::neural::{
    DiffSingerVoice, InferenceSession, NamedTensor, PhonemeTable, Tensor, Vocoder,
};
use cantare::prelude::*;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Engine sample rate, equal to the scripted vocoder's so no resampling happens.
pub const TEST_SAMPLE_RATE: u32 = 8000;

/// Vocoder hop; with [`TEST_SAMPLE_RATE`] one frame is 10 ms.
pub const TEST_HOP_SIZE: u32 = 80;

/// Level of every sample the scripted vocoder emits.
pub const VOICE_LEVEL: f32 = 0.5;

/// `"enter {stage}"` / `"exit {stage}"` events of every model call.
pub type Trace = std::sync::Arc<Mutex<Vec<String>>>;

pub fn inference_calls(trace: &Trace, stage: &str) -> usize {
    let enter = format!("enter {stage}");
    trace.lock().iter().filter(|e| **e == enter).count()
}

/// Install a fmt subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

type Script = Box<dyn Fn(&[NamedTensor]) -> Tensor + Send>;

/// Session with fixed input names whose output is computed from its inputs.
pub struct ScriptedSession {
    stage: &'static str,
    inputs: Vec<&'static str>,
    script: Script,
    trace: Trace,
    delay: Duration,
}

impl InferenceSession for ScriptedSession {
    fn input_names(&self) -> Vec<String> {
        self.inputs.iter().map(|s| s.to_string()).collect()
    }

    fn run(&mut self, inputs: Vec<NamedTensor>) -> cantare::neural::Result<Vec<NamedTensor>> {
        self.trace.lock().push(format!("enter {}", self.stage));
        std::thread::sleep(self.delay);
        let output = (self.script)(&inputs);
        self.trace.lock().push(format!("exit {}", self.stage));
        Ok(vec![NamedTensor::new("out", output)])
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn frames_of(inputs: &[NamedTensor], name: &str) -> usize {
    inputs
        .iter()
        .find(|t| t.name == name)
        .and_then(|t| t.tensor.shape.last().copied())
        .unwrap_or(0)
}

/// A shallow-diffusion voice named `id` with phonemes `SP`, `AP`, `a`, `i`, `u`.
///
/// The vocoder returns `hop_size` samples of [`VOICE_LEVEL`] per frame, so a
/// render covers exactly the phrase layout.
pub fn test_voice(id: &str, trace: &Trace, delay: Duration) -> Arc<DiffSingerVoice> {
    let acoustic = ScriptedSession {
        stage: "acoustic",
        inputs: vec!["tokens", "durations", "f0", "depth", "speedup"],
        script: Box::new(|inputs| {
            let frames = frames_of(inputs, "f0");
            Tensor::f32([1, frames, 4], vec![0.0; frames * 4])
        }),
        trace: trace.clone(),
        delay,
    };
    let vocoder = ScriptedSession {
        stage: "vocoder",
        inputs: vec!["mel", "f0"],
        script: Box::new(|inputs| {
            let frames = frames_of(inputs, "f0");
            Tensor::row_f32(vec![VOICE_LEVEL; frames * TEST_HOP_SIZE as usize])
        }),
        trace: trace.clone(),
        delay,
    };
    let config = DsConfig {
        phonemes: Some("phonemes.txt".into()),
        acoustic: Some("acoustic.onnx".into()),
        vocoder: Some("nsf".into()),
        use_shallow_diffusion: true,
        max_depth: 400,
        ..DsConfig::default()
    };
    let vocoder = Vocoder::from_parts(
        VocoderConfig {
            name: "nsf".into(),
            model: "nsf.onnx".into(),
            sample_rate: TEST_SAMPLE_RATE,
            hop_size: TEST_HOP_SIZE,
            ..VocoderConfig::default()
        },
        Box::new(vocoder),
    );
    let phonemes = ["SP", "AP", "a", "i", "u"].map(String::from).to_vec();
    Arc::new(
        DiffSingerVoice::from_parts(
            id,
            config,
            PhonemeTable::new(phonemes),
            Box::new(acoustic),
            vocoder,
            None,
            None,
        )
        .expect("valid test voice"),
    )
}

/// Settings with 50 ms head and tail at [`TEST_SAMPLE_RATE`], caching into `cache_dir`.
pub fn test_settings(cache_dir: &Path) -> RenderSettings {
    RenderSettings {
        cache_dir: cache_dir.to_path_buf(),
        sample_rate: TEST_SAMPLE_RATE,
        head_ms: 50.0,
        tail_ms: 50.0,
        depth: 1000,
        speedup: 30,
        num_render_threads: 4,
        ..RenderSettings::default()
    }
}

pub fn test_engine(settings: RenderSettings) -> Arc<RenderEngine> {
    test_engine_with_sink(settings, Arc::new(cantare::NullSink))
}

pub fn test_engine_with_sink(
    settings: RenderSettings,
    sink: Arc<dyn cantare::NotificationSink>,
) -> Arc<RenderEngine> {
    init_tracing();
    Arc::new(
        RenderEngine::builder()
            .settings(settings)
            .notifications(sink)
            .build()
            .expect("Failed to create test engine"),
    )
}

/// `"a"` for 200 ms then `"i"` for 300 ms, on middle C, starting at `position_ms`.
pub fn two_phone_phrase(voice: Arc<DiffSingerVoice>, position_ms: f64) -> RenderPhrase {
    RenderPhrase::new(
        voice,
        position_ms,
        500.0,
        vec![Phone::new("a", 0.0, 200.0), Phone::new("i", 200.0, 500.0)],
        vec![Note::new(60, 0.0, 500.0)],
        BTreeMap::new(),
    )
}

/// Frames of `ms` at [`TEST_SAMPLE_RATE`].
pub fn frames(ms: f64) -> usize {
    (ms * TEST_SAMPLE_RATE as f64 / 1000.0).round() as usize
}

/// Calculate peak amplitude of a signal.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |max, &s| max.max(s.abs()))
}
