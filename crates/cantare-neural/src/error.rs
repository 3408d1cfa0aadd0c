//! Error types for DiffSinger rendering.

use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse {file}: {source}")]
    Yaml {
        file: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Unknown phoneme \"{phoneme}\" for voice {voice}")]
    UnknownPhoneme { phoneme: String, voice: String },

    #[error("Model inputs do not match: {0}")]
    ModelMismatch(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Render error: {0}")]
    Core(#[from] cantare_core::Error),

    #[error("Audio file error: {0}")]
    Export(#[from] cantare_export::ExportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure of an in-flight render this request joined.
    #[error(transparent)]
    Joined(Arc<Error>),
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Core(e) => e.is_cancelled(),
            Self::Joined(e) => e.is_cancelled(),
            _ => false,
        }
    }
}

impl From<Error> for cantare_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Core(core) => core,
            Error::Joined(shared) => match Arc::try_unwrap(shared) {
                Ok(inner) => inner.into(),
                Err(shared) => classify(&shared),
            },
            other => classify(&other),
        }
    }
}

/// Map a borrowed error onto the core taxonomy, keeping the category.
fn classify(e: &Error) -> cantare_core::Error {
    use cantare_core::Error as CoreError;
    match e {
        Error::InvalidConfig(_) | Error::Yaml { .. } | Error::ModelLoad(_) => {
            CoreError::InvalidConfig(e.to_string())
        }
        Error::UnknownPhoneme { phoneme, voice } => CoreError::UnknownPhoneme {
            phoneme: phoneme.clone(),
            voice: voice.clone(),
        },
        Error::Core(core) if core.is_cancelled() => CoreError::Cancelled,
        Error::Core(core) if core.is_config() => CoreError::InvalidConfig(core.to_string()),
        Error::Joined(inner) => classify(inner),
        _ => CoreError::Inference(e.to_string()),
    }
}
