//! Error types for cantare-export

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Export error type
#[derive(Error, Debug)]
pub enum ExportError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Target file could not be written
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Resampling error
    #[error("Resampling error: {0}")]
    Resample(String),

    /// Invalid audio data
    #[error("Invalid audio data: {0}")]
    InvalidData(String),
}

impl ExportError {
    pub(crate) fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ExportError::Write {
            path: path.into(),
            source,
        }
    }
}

/// Result type for export operations
pub type Result<T> = std::result::Result<T, ExportError>;

// Keep external error types out of the public API.

impl From<hound::Error> for ExportError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => ExportError::Io(io),
            other => ExportError::InvalidData(other.to_string()),
        }
    }
}

impl From<rubato::ResamplerConstructionError> for ExportError {
    fn from(e: rubato::ResamplerConstructionError) -> Self {
        ExportError::Resample(e.to_string())
    }
}

impl From<rubato::ResampleError> for ExportError {
    fn from(e: rubato::ResampleError) -> Self {
        ExportError::Resample(e.to_string())
    }
}
