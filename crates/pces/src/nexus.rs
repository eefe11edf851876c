//! The durability nexus.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const NONE: u64 = u64::MAX;

/// Publishes the latest durable stream sequence number.
///
/// The writer's stage updates it; the application side reads it to gate
/// round release: a consensus round may only reach the state machine once
/// its keystone event's sequence number is durable. Cheap to clone; all
/// clones share the same cell.
#[derive(Clone)]
pub struct DurabilityNexus {
    latest: Arc<AtomicU64>,
}

impl DurabilityNexus {
    pub fn new() -> Self {
        Self {
            latest: Arc::new(AtomicU64::new(NONE)),
        }
    }

    /// Record a new latest durable sequence number. Never regresses.
    pub fn set_latest_durable(&self, sequence: u64) {
        self.latest.fetch_max(sequence.min(NONE - 1), Ordering::Release);
    }

    /// The latest durable sequence number, if any event is durable yet.
    pub fn latest_durable(&self) -> Option<u64> {
        match self.latest.load(Ordering::Acquire) {
            NONE => None,
            sequence => Some(sequence),
        }
    }

    /// Whether the event with the given sequence number is durable.
    pub fn is_durable(&self, sequence: u64) -> bool {
        self.latest_durable().is_some_and(|latest| latest >= sequence)
    }
}

impl Default for DurabilityNexus {
    fn default() -> Self {
        Self::new()
    }
}
