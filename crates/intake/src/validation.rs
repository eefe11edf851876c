//! Structural event validation.

use crate::IntakeConfig;
use braid_types::{EventWindow, GossipEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Rejects events that violate structural invariants.
///
/// Malformed events are dropped and counted; valid events pass through
/// unchanged. Timestamp monotonicity against the self parent is enforced by
/// the in-order linker, which is the first stage holding the resolved
/// parent.
pub struct InternalEventValidator {
    max_transaction_bytes: usize,
    birth_round_lookahead: u64,
    window: EventWindow,
    dropped: AtomicU64,
}

impl InternalEventValidator {
    pub fn new(config: &IntakeConfig, window: EventWindow) -> Self {
        Self {
            max_transaction_bytes: config.max_transaction_bytes,
            birth_round_lookahead: config.birth_round_lookahead,
            window,
            dropped: AtomicU64::new(0),
        }
    }

    /// Validate one event. Returns `None` when the event is dropped.
    pub fn validate(&mut self, event: Arc<GossipEvent>) -> Option<Arc<GossipEvent>> {
        if let Some(reason) = self.rejection_reason(&event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(event = ?event, reason, "dropped malformed event");
            return None;
        }
        Some(event)
    }

    fn rejection_reason(&self, event: &GossipEvent) -> Option<&'static str> {
        let hash = event.hash();
        if event.parents().any(|p| p.hash == hash) {
            return Some("self-referential parent");
        }
        if let Some(sp) = event.self_parent() {
            if sp.creator != event.creator() {
                return Some("self parent by different creator");
            }
        }
        if let Some(op) = event.other_parent() {
            if op.creator == event.creator() {
                return Some("other parent by own creator");
            }
        }
        if let (Some(sp), Some(op)) = (event.self_parent(), event.other_parent()) {
            if sp.hash == op.hash {
                return Some("duplicate parent");
            }
        }
        if event.core().transaction_bytes() > self.max_transaction_bytes {
            return Some("transaction payload over limit");
        }
        if event.birth_round() > self.window.latest_consensus_round + self.birth_round_lookahead {
            return Some("birth round too far in the future");
        }
        None
    }

    /// Apply a window update. Applied between events, never mid-event.
    pub fn update_window(&mut self, window: EventWindow) {
        self.window = window;
    }

    /// Number of events dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{event, genesis_event};
    use braid_types::{
        AncientMode, EventCore, EventSignature, GossipEvent, Hash, NodeId, Timestamp,
    };

    fn validator() -> InternalEventValidator {
        InternalEventValidator::new(
            &IntakeConfig::default(),
            EventWindow::genesis(AncientMode::Generation),
        )
    }

    #[test]
    fn test_valid_event_passes() {
        let mut v = validator();
        let genesis = genesis_event(1, 100);
        assert!(v.validate(genesis).is_some());
        assert_eq!(v.dropped(), 0);
    }

    #[test]
    fn test_other_parent_by_own_creator_rejected() {
        let mut v = validator();
        let parent = genesis_event(1, 100);
        let child = event(1, None, Some(&parent), 0, 200);
        assert!(v.validate(child).is_none());
        assert_eq!(v.dropped(), 1);
    }

    #[test]
    fn test_self_parent_by_other_creator_rejected() {
        let mut v = validator();
        let parent = genesis_event(2, 100);
        let child = event(1, Some(&parent), None, 0, 200);
        assert!(v.validate(child).is_none());
    }

    #[test]
    fn test_duplicate_parent_rejected() {
        let mut v = validator();
        let parent = genesis_event(1, 100);
        // Forge an event naming the same hash as both parents.
        let mut sp = parent.descriptor();
        sp.creator = NodeId(1);
        let mut op = parent.descriptor();
        op.creator = NodeId(2);
        let core = EventCore {
            creator: NodeId(1),
            self_parent: Some(sp),
            other_parent: Some(op),
            birth_round: 0,
            time_created: Timestamp::from_nanos(200),
            transactions: vec![],
        };
        let forged = GossipEvent::new(core, EventSignature::zero());
        forged.set_hash(Hash::from_bytes(b"forged"));
        assert!(v.validate(Arc::new(forged)).is_none());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let config = IntakeConfig::default().with_max_transaction_bytes(8);
        let mut v = InternalEventValidator::new(
            &config,
            EventWindow::genesis(AncientMode::Generation),
        );
        let core = EventCore {
            creator: NodeId(1),
            self_parent: None,
            other_parent: None,
            birth_round: 0,
            time_created: Timestamp::UNIX_EPOCH,
            transactions: vec![vec![0u8; 9]],
        };
        let event = GossipEvent::new(core, EventSignature::zero());
        event.set_hash(Hash::from_bytes(b"big"));
        assert!(v.validate(Arc::new(event)).is_none());
    }

    #[test]
    fn test_future_birth_round_rejected() {
        let mut v = validator();
        // Window is at round 0; lookahead 1 admits birth round 1, not 2.
        let near = event(1, None, None, 1, 100);
        let far = event(2, None, None, 2, 100);
        assert!(v.validate(near).is_some());
        assert!(v.validate(far).is_none());
    }
}
