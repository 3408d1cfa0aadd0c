//! Centralized error type for the cantare umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] cantare_core::Error),

    #[cfg(feature = "neural")]
    #[error("Neural: {0}")]
    Neural(#[from] cantare_neural::Error),

    #[error("Export: {0}")]
    Export(#[from] cantare_export::ExportError),

    #[error("Render pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Some phrases of a pass failed; the first failure is kept.
    #[error("{failed} of {total} phrases failed to render: {first}")]
    Render {
        failed: usize,
        total: usize,
        first: cantare_core::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Core(e) => e.is_cancelled(),
            #[cfg(feature = "neural")]
            Self::Neural(e) => e.is_cancelled(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
