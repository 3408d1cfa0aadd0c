//! Error types for cantare-core.

use thiserror::Error;

/// Error type for cantare-core operations.
///
/// Variants follow the render error taxonomy: configuration errors are fatal
/// for a voice, inference errors are fatal for one phrase, and cancellation is
/// reported separately so callers can tell it apart from failure.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Unknown phoneme \"{phoneme}\" for voice {voice}")]
    UnknownPhoneme { phoneme: String, voice: String },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("No renderer registered for kind: {0}")]
    UnknownRenderer(String),

    #[error("Render cancelled")]
    Cancelled,

    #[error("Failed to parse settings: {0}")]
    Settings(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Configuration errors need user action; retrying the same job cannot succeed.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_) | Self::UnknownPhoneme { .. } | Self::Settings(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
