//! Parallel hashing with serial emission.
//!
//! The hasher runs on a concurrent stage: each event's canonical encoding is
//! hashed independently, so events may finish out of order. The post-hash
//! collector restores the original input order using a ticket assigned at
//! the hasher's input, so every stage downstream of the collector may assume
//! FIFO.
//!
//! The two stages share one backpressure counter spanning the pair: it is
//! on-ramped at the hasher input and off-ramped here, once per event the
//! collector emits.

use braid_types::{GossipEvent, Hash};
use braid_wiring::ObjectCounter;
use std::collections::BTreeMap;
use std::sync::Arc;

/// An item tagged with its position in the hasher's input order.
#[derive(Debug, Clone)]
pub struct Ticketed<T> {
    pub ticket: u64,
    pub item: T,
}

/// Computes and stamps event hashes. Stateless; safe to run N-way.
pub struct EventHasher;

impl EventHasher {
    pub fn new() -> Self {
        Self
    }

    /// Hash the event's canonical encoding and stamp it. The event becomes
    /// immutable and shareable from here on.
    pub fn hash_event(&self, event: GossipEvent) -> Arc<GossipEvent> {
        let bytes = braid_types::encode(event.core()).expect("event encoding must succeed");
        event.set_hash(Hash::from_bytes(&bytes));
        Arc::new(event)
    }
}

impl Default for EventHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Restores hasher input order before downstream validators see events.
pub struct PostHashCollector {
    next_ticket: u64,
    pending: BTreeMap<u64, Arc<GossipEvent>>,
    hashing_counter: Arc<ObjectCounter>,
}

impl PostHashCollector {
    pub fn new(hashing_counter: Arc<ObjectCounter>) -> Self {
        Self {
            next_ticket: 0,
            pending: BTreeMap::new(),
            hashing_counter,
        }
    }

    /// Accept an out-of-order hashed event; emit the run of events that is
    /// now in order.
    pub fn collect(&mut self, hashed: Ticketed<Arc<GossipEvent>>) -> Vec<Arc<GossipEvent>> {
        self.pending.insert(hashed.ticket, hashed.item);
        let mut ready = Vec::new();
        while let Some(event) = self.pending.remove(&self.next_ticket) {
            self.next_ticket += 1;
            self.hashing_counter.off_ramp();
            ready.push(event);
        }
        ready
    }

    /// Events held waiting for an earlier ticket.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
