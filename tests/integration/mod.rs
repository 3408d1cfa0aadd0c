//! Integration test modules for cantare
//!
//! - engine: phrase fan-out, mixdown, per-track mixes, pre-render
//! - playback: play/pause/stop, play position, fader commands, file export

pub mod engine;
pub mod playback;
