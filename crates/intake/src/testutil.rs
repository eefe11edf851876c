//! Shared fixtures for intake component tests.

use braid_types::{
    EventCore, EventSignature, GossipEvent, Hash, NodeId, Timestamp,
};
use std::sync::Arc;

/// An unhashed event with no parents, distinguished by creator and time.
pub(crate) fn unhashed_event(creator: u64, time_nanos: u64) -> GossipEvent {
    GossipEvent::new(
        EventCore {
            creator: NodeId(creator),
            self_parent: None,
            other_parent: None,
            birth_round: 0,
            time_created: Timestamp::from_nanos(time_nanos as i128),
            transactions: vec![],
        },
        EventSignature::zero(),
    )
}

/// Build a hashed event. Parents are passed as already-built events; their
/// descriptors are embedded and the generation follows from them.
pub(crate) fn event(
    creator: u64,
    self_parent: Option<&Arc<GossipEvent>>,
    other_parent: Option<&Arc<GossipEvent>>,
    birth_round: u64,
    time_nanos: u64,
) -> Arc<GossipEvent> {
    let core = EventCore {
        creator: NodeId(creator),
        self_parent: self_parent.map(|p| p.descriptor()),
        other_parent: other_parent.map(|p| p.descriptor()),
        birth_round,
        time_created: Timestamp::from_nanos(time_nanos as i128),
        transactions: vec![],
    };
    let event = GossipEvent::new(core, EventSignature::zero());
    let bytes = braid_types::encode(event.core()).expect("event encoding must succeed");
    event.set_hash(Hash::from_bytes(&bytes));
    Arc::new(event)
}

/// A hashed genesis event (no parents).
pub(crate) fn genesis_event(creator: u64, time_nanos: u64) -> Arc<GossipEvent> {
    event(creator, None, None, 0, time_nanos)
}
