//! Test fixtures: a deterministic gossiping network of signing nodes.

use braid_types::{
    event_signing_message, AddressBook, AddressBookEntry, Ed25519Signer, EventCore,
    EventDescriptor, GossipEvent, Hash, NodeId, Signer, Timestamp,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a stream of valid, signed events from `gossiping_nodes` creators
/// in an all-to-all pattern: each event's other parent is the latest event
/// of the previous creator, so every event sees the whole graph before it.
///
/// Events are handed out unhashed, exactly as they would arrive from
/// gossip; the fixture computes hashes privately to chain descriptors.
pub struct TestNetwork {
    signers: Vec<Arc<Ed25519Signer>>,
    gossiping_nodes: u64,
    latest: HashMap<NodeId, EventDescriptor>,
    clock: u64,
    counter: u64,
}

impl TestNetwork {
    /// A network of `total_nodes`, of which the first `gossiping_nodes`
    /// emit fixture events (leave a gap to play a non-gossiping self node).
    pub fn new(total_nodes: u64, gossiping_nodes: u64) -> Self {
        assert!(gossiping_nodes <= total_nodes);
        let signers = (0..total_nodes)
            .map(|i| {
                let mut seed = [0u8; 32];
                seed[0] = (i + 1) as u8;
                Arc::new(Ed25519Signer::from_seed(&seed))
            })
            .collect();
        Self {
            signers,
            gossiping_nodes,
            latest: HashMap::new(),
            clock: 1_000_000,
            counter: 0,
        }
    }

    pub fn address_book(&self) -> AddressBook {
        AddressBook::new(
            0,
            self.signers
                .iter()
                .enumerate()
                .map(|(i, signer)| AddressBookEntry {
                    node_id: NodeId(i as u64),
                    public_key: signer.public_key(),
                    weight: 1,
                    active: true,
                })
                .collect(),
        )
    }

    pub fn signer(&self, node: u64) -> Arc<Ed25519Signer> {
        Arc::clone(&self.signers[node as usize])
    }

    /// The next event in the gossip pattern, unhashed and signed.
    pub fn next_event(&mut self) -> GossipEvent {
        let creator = NodeId(self.counter % self.gossiping_nodes);
        let previous = NodeId((self.counter + self.gossiping_nodes - 1) % self.gossiping_nodes);
        self.counter += 1;
        self.clock += 1_000;

        let self_parent = self.latest.get(&creator).copied();
        let other_parent = self
            .latest
            .get(&previous)
            .filter(|d| Some(d.hash) != self_parent.map(|s| s.hash))
            .copied();

        let core = EventCore {
            creator,
            self_parent,
            other_parent,
            birth_round: 0,
            time_created: Timestamp::from_nanos(self.clock as i128),
            transactions: vec![],
        };
        let bytes = braid_types::encode(&core).expect("event encoding must succeed");
        let hash = Hash::from_bytes(&bytes);
        let signature = self.signers[creator.0 as usize].sign(&event_signing_message(&hash));

        self.latest.insert(
            creator,
            EventDescriptor {
                hash,
                creator,
                generation: core.generation(),
                birth_round: core.birth_round,
            },
        );
        GossipEvent::new(core, signature)
    }

    /// A batch of events in gossip order.
    pub fn events(&mut self, count: usize) -> Vec<GossipEvent> {
        (0..count).map(|_| self.next_event()).collect()
    }
}

/// Poll until `predicate` holds, failing after a few seconds.
pub fn wait_until(what: &str, predicate: impl Fn() -> bool) {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while std::time::Instant::now() < deadline {
        if predicate() {
            return;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    panic!("timed out waiting for {what}");
}
