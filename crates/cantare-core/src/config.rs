//! Render settings.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings shared by every render pass.
///
/// Unset fields fall back to [`RenderSettings::default`] when loaded from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Requested shallow-diffusion depth before clamping to the model's maximum.
    pub depth: i32,
    pub speedup: i32,
    pub cache_dir: PathBuf,
    pub cache_enabled: bool,
    pub num_render_threads: usize,
    /// Warm the cache in the background whenever a project is loaded or edited.
    pub pre_render: bool,
    /// Output sample rate of the signal chain.
    pub sample_rate: u32,
    pub head_ms: f64,
    pub tail_ms: f64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            depth: 1000,
            speedup: 50,
            cache_dir: std::env::temp_dir().join("cantare-cache"),
            cache_enabled: true,
            num_render_threads: default_render_threads(),
            pre_render: true,
            sample_rate: 44100,
            head_ms: 100.0,
            tail_ms: 100.0,
        }
    }
}

fn default_render_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl RenderSettings {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate < 8000 || self.sample_rate > 384000 {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if self.speedup < 1 {
            return Err(Error::InvalidConfig(format!(
                "speedup must be at least 1, got {}",
                self.speedup
            )));
        }
        if self.depth < 0 {
            return Err(Error::InvalidConfig(format!(
                "depth must be non-negative, got {}",
                self.depth
            )));
        }
        if self.num_render_threads == 0 {
            return Err(Error::InvalidConfig(
                "num_render_threads must be at least 1".into(),
            ));
        }
        for (name, ms) in [("head_ms", self.head_ms), ("tail_ms", self.tail_ms)] {
            if !ms.is_finite() || ms < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {ms}"
                )));
            }
        }
        Ok(())
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Self = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
