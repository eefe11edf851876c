//! Stream sequence assignment.

use braid_types::GossipEvent;
use std::sync::Arc;

/// Stamps each event with a strictly monotone global stream sequence
/// number. The sequence is the event's identity within the PCES; it feeds
/// both the writer (durability path) and the linker (consensus path).
pub struct PcesSequencer {
    next: u64,
}

impl PcesSequencer {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    /// The next sequence number to be assigned.
    pub fn next_sequence(&self) -> u64 {
        self.next
    }

    /// Stamp one event and pass it through.
    pub fn assign(&mut self, event: Arc<GossipEvent>) -> Arc<GossipEvent> {
        event.set_stream_sequence(self.next);
        self.next += 1;
        event
    }
}

impl Default for PcesSequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_types::{EventCore, EventSignature, NodeId, Timestamp};

    fn event() -> Arc<GossipEvent> {
        Arc::new(GossipEvent::new(
            EventCore {
                creator: NodeId(0),
                self_parent: None,
                other_parent: None,
                birth_round: 0,
                time_created: Timestamp::UNIX_EPOCH,
                transactions: vec![],
            },
            EventSignature::zero(),
        ))
    }

    #[test]
    fn test_sequences_are_strictly_monotone() {
        let mut sequencer = PcesSequencer::new();
        for expected in 0..10u64 {
            let stamped = sequencer.assign(event());
            assert_eq!(stamped.stream_sequence(), expected);
        }
        assert_eq!(sequencer.next_sequence(), 10);
    }
}
