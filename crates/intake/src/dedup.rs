//! Event deduplication.

use braid_types::{EventWindow, GossipEvent, Hash};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Drops events whose hash has already been seen inside the non-ancient
/// window.
///
/// The map is bounded by the window: entries whose ancient identifier falls
/// below the window's minimum are evicted on each window update.
pub struct EventDeduplicator {
    window: EventWindow,
    /// hash -> ancient identifier, for eviction.
    seen: HashMap<Hash, u64>,
    duplicates: AtomicU64,
}

impl EventDeduplicator {
    pub fn new(window: EventWindow) -> Self {
        Self {
            window,
            seen: HashMap::new(),
            duplicates: AtomicU64::new(0),
        }
    }

    /// Pass the event through unless its hash was already seen.
    pub fn dedup(&mut self, event: Arc<GossipEvent>) -> Option<Arc<GossipEvent>> {
        let ancient_id = event.ancient_identifier(self.window.ancient_mode);
        if self.seen.insert(event.hash(), ancient_id).is_some() {
            self.duplicates.fetch_add(1, Ordering::Relaxed);
            trace!(hash = %event.hash(), "dropped duplicate event");
            return None;
        }
        Some(event)
    }

    /// Apply a window update, evicting entries that fell ancient.
    pub fn update_window(&mut self, window: EventWindow) {
        self.window = window;
        let threshold = window.ancient_threshold;
        self.seen.retain(|_, ancient_id| *ancient_id >= threshold);
    }

    /// Number of duplicates dropped so far.
    pub fn duplicates(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    /// Number of hashes currently tracked.
    pub fn tracked(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{event, genesis_event};
    use braid_types::AncientMode;

    fn dedup() -> EventDeduplicator {
        EventDeduplicator::new(EventWindow::genesis(AncientMode::Generation))
    }

    #[test]
    fn test_same_hash_emitted_once() {
        let mut d = dedup();
        let e = genesis_event(1, 100);
        assert!(d.dedup(Arc::clone(&e)).is_some());
        assert!(d.dedup(e).is_none());
        assert_eq!(d.duplicates(), 1);
    }

    #[test]
    fn test_distinct_events_pass() {
        let mut d = dedup();
        assert!(d.dedup(genesis_event(1, 100)).is_some());
        assert!(d.dedup(genesis_event(2, 100)).is_some());
        assert_eq!(d.duplicates(), 0);
    }

    #[test]
    fn test_window_update_evicts_ancient_entries() {
        let mut d = dedup();
        let genesis = genesis_event(1, 100);
        let mut tip = Arc::clone(&genesis);
        for i in 1..6u64 {
            tip = event(1, Some(&tip), None, 0, 100 + i);
            d.dedup(Arc::clone(&tip));
        }
        d.dedup(Arc::clone(&genesis));
        assert_eq!(d.tracked(), 6);

        let window = EventWindow {
            latest_consensus_round: 1,
            ancient_threshold: 3,
            min_round_generation: 3,
            ancient_mode: AncientMode::Generation,
        };
        d.update_window(window);
        // Generations 0, 1, 2 evicted; 3, 4, 5 remain.
        assert_eq!(d.tracked(), 3);

        // An evicted hash would be admitted again; that is the orphan
        // buffer's ancient filter's problem, not the deduplicator's.
        assert!(d.dedup(genesis).is_some());
    }
}
