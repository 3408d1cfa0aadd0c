//! Cooperative cancellation for render passes.

use crate::lockfree::AtomicFlag;
use crate::{Error, Result};
use std::sync::Arc;

/// Shared cancellation flag for one render pass.
///
/// Clones observe the same flag. Jobs poll it at entry, before inference and
/// before writing the cache; nothing is preempted.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicFlag>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.flag.swap(true) {
            tracing::debug!("render pass cancelled");
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.get()
    }

    /// `Err(Error::Cancelled)` once cancellation was requested.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
