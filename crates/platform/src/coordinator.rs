//! Flush coordination across the intake pipeline.

use braid_wiring::{FlushHandle, ObjectCounter};
use std::sync::Arc;
use tracing::debug;

/// Flushes the intake pipeline in topological order.
///
/// The order is fixed at wiring time, not re-derived per flush. After
/// `flush_intake_pipeline` returns, every event enqueued at the hasher
/// before the call has either produced a consensus round or been dropped by
/// a validator.
pub struct PlatformCoordinator {
    hashing_counter: Arc<ObjectCounter>,
    stages: Vec<FlushHandle>,
}

impl PlatformCoordinator {
    pub fn new(hashing_counter: Arc<ObjectCounter>, stages: Vec<FlushHandle>) -> Self {
        Self {
            hashing_counter,
            stages,
        }
    }

    /// Drain the pipeline front to back.
    pub fn flush_intake_pipeline(&self) {
        // The hashing counter spans the hasher and the post-hash
        // collector; once empty, every in-flight event has been emitted in
        // order.
        self.hashing_counter.wait_until_empty();
        for stage in &self.stages {
            debug!(stage = stage.name(), "flushing");
            stage.flush();
        }
    }
}
