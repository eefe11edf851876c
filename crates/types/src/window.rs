//! The non-ancient event window.

use crate::{EventDescriptor, GossipEvent};

/// How the ancient threshold is interpreted.
///
/// Fixed at genesis; switching modes at runtime is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub enum AncientMode {
    /// An event is ancient iff its generation is below the threshold.
    Generation,
    /// An event is ancient iff its birth round is below the threshold.
    BirthRound,
}

/// The interval of events still capable of influencing consensus.
///
/// Produced once per consensus round by the event window manager (the sole
/// writer) and injected to every stage that filters by ancient-ness. Stages
/// apply a window update between events, never mid-event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWindow {
    /// The latest round that has reached consensus.
    pub latest_consensus_round: u64,
    /// Minimum non-ancient generation or birth round, per `ancient_mode`.
    pub ancient_threshold: u64,
    /// Minimum judge generation of the latest consensus round.
    pub min_round_generation: u64,
    /// How `ancient_threshold` is interpreted.
    pub ancient_mode: AncientMode,
}

impl EventWindow {
    /// The window in effect before any round has reached consensus.
    pub fn genesis(ancient_mode: AncientMode) -> Self {
        Self {
            latest_consensus_round: 0,
            ancient_threshold: 0,
            min_round_generation: 0,
            ancient_mode,
        }
    }

    /// The round currently being built on top of consensus.
    pub fn pending_round(&self) -> u64 {
        self.latest_consensus_round + 1
    }

    /// Whether an event has fallen out of the window.
    pub fn is_ancient(&self, event: &GossipEvent) -> bool {
        event.ancient_identifier(self.ancient_mode) < self.ancient_threshold
    }

    /// Whether a parent descriptor references an ancient event.
    pub fn is_descriptor_ancient(&self, descriptor: &EventDescriptor) -> bool {
        descriptor.ancient_identifier(self.ancient_mode) < self.ancient_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventCore, EventSignature, NodeId, Timestamp};

    fn event_with_birth_round(birth_round: u64) -> GossipEvent {
        GossipEvent::new(
            EventCore {
                creator: NodeId(0),
                self_parent: None,
                other_parent: None,
                birth_round,
                time_created: Timestamp::UNIX_EPOCH,
                transactions: vec![],
            },
            EventSignature::zero(),
        )
    }

    #[test]
    fn test_genesis_window_admits_everything() {
        let window = EventWindow::genesis(AncientMode::Generation);
        assert!(!window.is_ancient(&event_with_birth_round(0)));
        assert_eq!(window.pending_round(), 1);
    }

    #[test]
    fn test_birth_round_mode() {
        let window = EventWindow {
            latest_consensus_round: 30,
            ancient_threshold: 5,
            min_round_generation: 0,
            ancient_mode: AncientMode::BirthRound,
        };
        assert!(window.is_ancient(&event_with_birth_round(4)));
        assert!(!window.is_ancient(&event_with_birth_round(5)));
    }
}
