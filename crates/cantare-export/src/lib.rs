//! # Cantare Export
//!
//! Audio file plumbing for the cantare renderer:
//! - **WAV**: 16-bit mono writer used for render caches and exports, and a
//!   reader that folds any WAV file to mono
//! - **Resampling**: sample-rate conversion of rendered phrases via rubato
//!
//! Every write goes to a temporary file next to the target and is renamed into
//! place only once complete, so readers never observe a partial file.

pub mod error;

pub mod dsp;
pub mod format;

pub use error::{ExportError, Result};
pub use format::wav::{check_writable, quantize_i16, read_wav_mono, write_wav_mono, WavConfig};
pub use dsp::resample::{resample_mono, ResampleQuality};
