//! The wiring model: owns the shared pool and every stage.

use crate::scheduler::{SchedulerBuilder, StageCore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::info;

/// Errors from constructing the wiring model.
#[derive(Debug, Error)]
pub enum WiringError {
    #[error("failed to build worker pool: {0}")]
    PoolBuild(String),
}

/// Owns the shared worker pool and the registry of stages.
///
/// Stages register at build time; registration order is the flush order, so
/// the platform registers stages in topological order and a full flush
/// drains the pipeline front to back without re-deriving the topology.
pub struct WiringModel {
    pool: Arc<rayon::ThreadPool>,
    stages: Mutex<Vec<Arc<StageCore>>>,
    started: AtomicBool,
}

impl WiringModel {
    /// Create a model with a shared pool of `parallelism` workers.
    pub fn new(parallelism: usize) -> Result<Self, WiringError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallelism.max(1))
            .thread_name(|i| format!("braid-pool-{i}"))
            .build()
            .map_err(|e| WiringError::PoolBuild(e.to_string()))?;
        Ok(Self {
            pool: Arc::new(pool),
            stages: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    pub(crate) fn pool(&self) -> Arc<rayon::ThreadPool> {
        Arc::clone(&self.pool)
    }

    pub(crate) fn register(&self, core: Arc<StageCore>) {
        self.stages
            .lock()
            .expect("wiring model lock poisoned")
            .push(core);
    }

    /// Begin a stage definition.
    pub fn scheduler(&self, name: impl Into<String>) -> SchedulerBuilder<'_> {
        SchedulerBuilder::new(self, name)
    }

    /// Mark the model started.
    ///
    /// Workers are live from the moment a stage is built; `start` exists to
    /// mark the point after which soldering is complete.
    pub fn start(&self) {
        self.started.store(true, Ordering::Release);
        let stages = self.stages.lock().expect("wiring model lock poisoned");
        info!(stages = stages.len(), "wiring model started");
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Stop every stage. Pending queue items are dropped; dedicated worker
    /// threads are joined.
    pub fn stop(&self) {
        let stages = self.stages.lock().expect("wiring model lock poisoned");
        for stage in stages.iter() {
            stage.stop();
        }
        info!(stages = stages.len(), "wiring model stopped");
    }

    /// Flush every stage, in registration order.
    pub fn flush_all(&self) {
        let stages: Vec<_> = {
            let guard = self.stages.lock().expect("wiring model lock poisoned");
            guard.clone()
        };
        for stage in &stages {
            stage.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SchedulerPolicy;

    #[test]
    fn test_flush_all_in_registration_order() {
        let model = WiringModel::new(2).unwrap();
        let first = model
            .scheduler("first")
            .policy(SchedulerPolicy::Sequential)
            .build(Vec::<u32>::new());
        let second = model
            .scheduler("second")
            .policy(SchedulerPolicy::Sequential)
            .build(Vec::<u32>::new());
        let first_in = first.input_with("in", |v: &mut Vec<u32>, n| v.push(n));
        let second_in = second.input_with("in", |v: &mut Vec<u32>, n| v.push(n));
        first_in.put(1);
        second_in.put(2);
        model.start();
        model.flush_all();
        first.with_component(|v| assert_eq!(v, &vec![1]));
        second.with_component(|v| assert_eq!(v, &vec![2]));
        model.stop();
    }
}
