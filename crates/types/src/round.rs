//! Consensus round output records.

use crate::{CodecError, EventWindow, GossipEvent, Hash, NodeId, Timestamp};
use std::sync::Arc;

/// Minimal state needed to resume consensus from a decided round.
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct ConsensusSnapshot {
    /// The decided round this snapshot belongs to.
    pub round: u64,
    /// The unique famous witnesses (judges) of the round: creator and hash,
    /// ordered by creator.
    pub judges: Vec<(NodeId, Hash)>,
    /// Minimum generation among the judges.
    pub min_round_generation: u64,
}

/// An event with its consensus timestamp.
#[derive(Debug, Clone)]
pub struct ConsensusEvent {
    pub event: Arc<GossipEvent>,
    pub consensus_timestamp: Timestamp,
}

impl ConsensusEvent {
    /// Consensus timestamp of one transaction inside this event.
    ///
    /// Transactions are spread a nanosecond apart starting at the event's
    /// own timestamp; consecutive events are spaced far enough apart that
    /// these never collide.
    pub fn transaction_timestamp(&self, index: usize) -> Timestamp {
        self.consensus_timestamp.plus_nanos(index as u64)
    }
}

/// A decided consensus round. Immutable once emitted.
///
/// Events are in deterministic consensus order; the keystone event is the
/// last one. The window carried here is the window that takes effect once
/// this round is decided, broadcast by the event window manager.
#[derive(Debug, Clone)]
pub struct ConsensusRound {
    pub round: u64,
    pub events: Vec<ConsensusEvent>,
    /// Timestamp of the round: the keystone event's consensus timestamp.
    pub consensus_timestamp: Timestamp,
    pub snapshot: ConsensusSnapshot,
    pub window: EventWindow,
}

impl ConsensusRound {
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// The keystone event: last in deterministic order. Its durability gates
    /// the release of this round to the application.
    pub fn keystone(&self) -> Option<&Arc<GossipEvent>> {
        self.events.last().map(|e| &e.event)
    }

    /// Stream sequence number of the keystone event, if the round is
    /// non-empty.
    pub fn keystone_sequence_number(&self) -> Option<u64> {
        self.keystone().map(|e| e.stream_sequence())
    }

    /// Canonical encoding of the emitted record.
    ///
    /// Two engines fed the same event sequence must produce byte-identical
    /// encodings.
    pub fn encoded(&self) -> Result<Vec<u8>, CodecError> {
        let keystone_hash = self.keystone().map(|e| e.hash()).unwrap_or(Hash::ZERO);
        let events: Vec<(&GossipEvent, Timestamp)> = self
            .events
            .iter()
            .map(|e| (e.event.as_ref(), e.consensus_timestamp))
            .collect();
        crate::encode(&(
            self.round,
            self.consensus_timestamp,
            keystone_hash,
            events,
            &self.snapshot,
        ))
    }
}
