//! Buffering of events born one round ahead of the window.

use braid_types::{EventWindow, GossipEvent};
use std::collections::BTreeMap;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Holds events whose birth round is exactly one ahead of the window's
/// latest round, releasing them when the window advances. Events further
/// ahead are malformed or malicious and are dropped.
pub struct FutureEventBuffer {
    window: EventWindow,
    held: BTreeMap<u64, Vec<Arc<GossipEvent>>>,
    dropped: AtomicU64,
}

impl FutureEventBuffer {
    pub fn new(window: EventWindow) -> Self {
        Self {
            window,
            held: BTreeMap::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Pass through, hold, or drop one event by its birth round.
    pub fn handle_event(&mut self, event: Arc<GossipEvent>) -> Vec<Arc<GossipEvent>> {
        let latest = self.window.latest_consensus_round;
        let birth_round = event.birth_round();
        if birth_round <= latest {
            vec![event]
        } else if birth_round == latest + 1 {
            self.held.entry(birth_round).or_default().push(event);
            vec![]
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(
                birth_round,
                latest, "dropped event born too far in the future"
            );
            vec![]
        }
    }

    /// Apply a window update, releasing events whose birth round is now
    /// within the window.
    pub fn update_window(&mut self, window: EventWindow) -> Vec<Arc<GossipEvent>> {
        self.window = window;
        let still_future = self
            .held
            .split_off(&(window.latest_consensus_round + 1));
        let released = mem::replace(&mut self.held, still_future);
        released.into_values().flatten().collect()
    }

    /// Number of events currently held.
    pub fn held_count(&self) -> usize {
        self.held.values().map(Vec::len).sum()
    }

    /// Number of events dropped as too far ahead.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::event;
    use braid_types::AncientMode;

    fn window(latest: u64) -> EventWindow {
        EventWindow {
            latest_consensus_round: latest,
            ancient_threshold: 0,
            min_round_generation: 0,
            ancient_mode: AncientMode::Generation,
        }
    }

    #[test]
    fn test_current_round_passes_through() {
        let mut buf = FutureEventBuffer::new(window(3));
        let e = event(1, None, None, 3, 100);
        assert_eq!(buf.handle_event(e).len(), 1);
    }

    #[test]
    fn test_one_round_ahead_held_until_window_advances() {
        let mut buf = FutureEventBuffer::new(window(3));
        let e = event(1, None, None, 4, 100);
        assert!(buf.handle_event(Arc::clone(&e)).is_empty());
        assert_eq!(buf.held_count(), 1);

        let released = buf.update_window(window(4));
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].hash(), e.hash());
        assert_eq!(buf.held_count(), 0);
    }

    #[test]
    fn test_two_rounds_ahead_dropped() {
        let mut buf = FutureEventBuffer::new(window(3));
        let e = event(1, None, None, 5, 100);
        assert!(buf.handle_event(e).is_empty());
        assert_eq!(buf.held_count(), 0);
        assert_eq!(buf.dropped(), 1);
    }
}
