//! Shared fixtures for PCES tests.

use braid_types::{
    EventCore, EventDescriptor, EventSignature, GossipEvent, Hash, NodeId, Timestamp,
};

/// An event with the given stream sequence number and ancient identifier
/// (used for both generation and birth round). Generations above zero are
/// arranged through a synthetic self-parent descriptor.
pub(crate) fn sequenced_event(sequence: u64, ancient_id: u64) -> GossipEvent {
    let self_parent = (ancient_id > 0).then(|| EventDescriptor {
        hash: Hash::from_bytes(&ancient_id.to_be_bytes()),
        creator: NodeId(1),
        generation: ancient_id - 1,
        birth_round: ancient_id.saturating_sub(1),
    });
    let event = GossipEvent::new(
        EventCore {
            creator: NodeId(1),
            self_parent,
            other_parent: None,
            birth_round: ancient_id,
            time_created: Timestamp::from_nanos(1_000 * (sequence as i128 + 1)),
            transactions: vec![],
        },
        EventSignature::zero(),
    );
    event.set_stream_sequence(sequence);
    event
}
