use crate::backend::{verify_input_names, InferenceSession, NamedTensor};
use crate::Result;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Exclusive access to the inference backend for one renderer kind.
///
/// Held for a single model call only, so feature building of other jobs
/// overlaps with inference. Renderer kinds with their own gate do not block
/// each other.
#[derive(Debug, Default)]
pub struct InferenceGate {
    lock: Mutex<()>,
    calls: AtomicU64,
}

impl InferenceGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `session` under the gate after checking its declared inputs.
    pub fn run(
        &self,
        stage: &str,
        session: &Mutex<Box<dyn InferenceSession>>,
        inputs: Vec<NamedTensor>,
    ) -> Result<Vec<NamedTensor>> {
        let _guard = self.lock.lock();
        let mut session = session.lock();
        verify_input_names(session.as_ref(), &inputs)?;
        self.calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(stage, inputs = inputs.len(), "inference");
        session.run(inputs)
    }

    /// Model calls made through this gate.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}
