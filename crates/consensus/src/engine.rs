//! The consensus engine: rounds in, consensus rounds out.

use crate::config::ConsensusConfig;
use crate::election::Elections;
use crate::graph::{EventGraph, EventId};
use braid_types::{
    AddressBook, AncientMode, ConsensusEvent, ConsensusRound, ConsensusSnapshot, EventWindow,
    LinkedEvent, Timestamp,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Hashgraph-style virtual-voting consensus.
///
/// Owned by the linked-event-intake stage; the only externally visible
/// state is the stream of emitted [`ConsensusRound`]s.
pub struct ConsensusEngine {
    config: ConsensusConfig,
    graph: EventGraph,
    elections: Elections,
    /// Events not yet assigned a received round, in insertion order.
    undecided: Vec<EventId>,
    /// The next round whose fame is to be decided. Rounds below this are
    /// final.
    next_round_to_decide: u64,
    /// Round assigned to events whose parents cannot be resolved; 1 at
    /// genesis, the snapshot round after a snapshot load.
    round_floor: u64,
    /// Minimum judge generation per decided round, for the window's
    /// ancient threshold.
    round_min_judge_generation: BTreeMap<u64, u64>,
    /// Timestamp and transaction count of the last event given a consensus
    /// timestamp, for strict monotonicity with room for transaction
    /// spreading.
    last_assigned: Option<(Timestamp, usize)>,
}

impl ConsensusEngine {
    pub fn new(config: ConsensusConfig, address_book: &AddressBook) -> Self {
        Self {
            graph: EventGraph::new(address_book),
            elections: Elections::new(),
            undecided: Vec::new(),
            next_round_to_decide: 1,
            round_floor: 1,
            round_min_judge_generation: BTreeMap::new(),
            last_assigned: None,
            config,
        }
    }

    /// The round most recently decided, 0 before any.
    pub fn last_decided_round(&self) -> u64 {
        self.next_round_to_decide - 1
    }

    /// The highest round created so far.
    pub fn max_round(&self) -> u64 {
        self.graph.max_round
    }

    /// The window in effect for the last decided round.
    pub fn current_window(&self) -> EventWindow {
        let round = self.last_decided_round();
        if round == 0 {
            return EventWindow::genesis(self.config.ancient_mode);
        }
        EventWindow {
            latest_consensus_round: round,
            ancient_threshold: self.ancient_threshold(round),
            min_round_generation: self
                .round_min_judge_generation
                .get(&round)
                .copied()
                .unwrap_or(0),
            ancient_mode: self.config.ancient_mode,
        }
    }

    /// Resume from a snapshot: the graph starts empty, rounds continue
    /// after the snapshot round, and parentless replayed events land at the
    /// snapshot round instead of round 1.
    pub fn load_snapshot(&mut self, snapshot: &ConsensusSnapshot) {
        self.graph.clear();
        self.elections = Elections::new();
        self.undecided.clear();
        self.next_round_to_decide = snapshot.round + 1;
        self.round_floor = snapshot.round.max(1);
        self.round_min_judge_generation.clear();
        self.round_min_judge_generation
            .insert(snapshot.round, snapshot.min_round_generation);
        self.last_assigned = None;
        info!(round = snapshot.round, "consensus resumed from snapshot");
    }

    /// Fold one linked event into the graph. Returns the rounds this event
    /// decided, in strictly increasing round order (usually empty).
    pub fn add_event(&mut self, linked: &LinkedEvent) -> Vec<ConsensusRound> {
        let Some(id) = self.graph.insert(linked, self.round_floor) else {
            return Vec::new();
        };
        self.undecided.push(id);

        let (witness, round_created) = {
            let meta = self.graph.meta(id);
            (meta.witness, meta.round_created)
        };
        if witness {
            if round_created < self.next_round_to_decide {
                // Fame for that round is already settled; the event can
                // still reach consensus as an ordinary event.
                self.graph.meta_mut(id).late_witness = true;
            } else {
                self.elections.open_election(round_created, id);
                self.elections.recompute(&mut self.graph, &self.config);
            }
        }

        let mut rounds = Vec::new();
        while let Some(round) = self.try_decide_next_round() {
            rounds.push(round);
        }
        rounds
    }

    /// Decide `next_round_to_decide` if its witness set is complete and
    /// every witness's fame is settled.
    fn try_decide_next_round(&mut self) -> Option<ConsensusRound> {
        let round = self.next_round_to_decide;
        // Two later rounds must exist before the witness set of this round
        // can be treated as complete and its elections as mature.
        if self.graph.max_round < round + 2 {
            return None;
        }
        let witnesses: Vec<EventId> = self
            .graph
            .witnesses_of(round)
            .iter()
            .copied()
            .filter(|&w| !self.graph.meta(w).late_witness)
            .collect();
        if witnesses.is_empty()
            || witnesses
                .iter()
                .any(|&w| self.graph.meta(w).famous.is_none())
        {
            return None;
        }
        let judges: Vec<EventId> = witnesses
            .iter()
            .copied()
            .filter(|&w| self.graph.meta(w).famous == Some(true))
            .collect();
        self.next_round_to_decide += 1;
        Some(self.build_round(round, judges))
    }

    fn build_round(&mut self, round: u64, mut judges: Vec<EventId>) -> ConsensusRound {
        judges.sort_by_key(|&j| self.graph.meta(j).creator_idx);
        if judges.is_empty() {
            warn!(round, "round decided with no famous witnesses");
        }

        let whitening = self.whitening(&judges);

        // Events seen by every judge receive this round.
        let graph = &self.graph;
        let mut received: Vec<EventId> = Vec::new();
        self.undecided.retain(|&event| {
            if judges.iter().all(|&j| graph.sees(j, event)) {
                received.push(event);
                false
            } else {
                true
            }
        });

        // Median first-receive timestamp across judges, whitened hash as
        // the tiebreak.
        let mut ordered: Vec<(EventId, Timestamp, [u8; 32])> = received
            .into_iter()
            .map(|event| {
                let mut times: Vec<Timestamp> = judges
                    .iter()
                    .map(|&j| self.graph.first_receive_time(j, event))
                    .collect();
                times.sort();
                let median = times
                    .get((times.len().saturating_sub(1)) / 2)
                    .copied()
                    .unwrap_or(Timestamp::UNIX_EPOCH);
                let hash = self.graph.meta(event).event.hash();
                let tiebreak = *blake3::Hasher::new()
                    .update(hash.as_bytes())
                    .update(&whitening)
                    .finalize()
                    .as_bytes();
                (event, median, tiebreak)
            })
            .collect();
        ordered.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.2.cmp(&b.2)));

        // Assign strictly increasing consensus timestamps, leaving room to
        // spread each event's transactions a nanosecond apart.
        let mut events = Vec::with_capacity(ordered.len());
        for (event, median, _) in ordered {
            let timestamp = match self.last_assigned {
                Some((last, transactions)) => {
                    median.max(last.plus_nanos(transactions.max(1) as u64))
                }
                None => median,
            };
            let (event_arc, transactions) = {
                let meta = self.graph.meta_mut(event);
                meta.round_received = Some(round);
                (Arc::clone(&meta.event), meta.event.transactions().len())
            };
            self.last_assigned = Some((timestamp, transactions));
            events.push(ConsensusEvent {
                event: event_arc,
                consensus_timestamp: timestamp,
            });
        }

        let consensus_timestamp = events
            .last()
            .map(|e| e.consensus_timestamp)
            .or(self.last_assigned.map(|(t, _)| t))
            .unwrap_or(Timestamp::UNIX_EPOCH);

        let min_round_generation = judges
            .iter()
            .map(|&j| self.graph.meta(j).event.generation())
            .min()
            .unwrap_or(0);
        self.round_min_judge_generation
            .insert(round, min_round_generation);

        let snapshot = ConsensusSnapshot {
            round,
            judges: judges
                .iter()
                .map(|&j| {
                    let meta = self.graph.meta(j);
                    (meta.event.creator(), meta.event.hash())
                })
                .collect(),
            min_round_generation,
        };

        let window = EventWindow {
            latest_consensus_round: round,
            ancient_threshold: self.ancient_threshold(round),
            min_round_generation,
            ancient_mode: self.config.ancient_mode,
        };

        self.expire_ancient(round, window.ancient_threshold);

        debug!(
            round,
            events = events.len(),
            judges = snapshot.judges.len(),
            "consensus round decided"
        );

        ConsensusRound {
            round,
            events,
            consensus_timestamp,
            snapshot,
            window,
        }
    }

    /// The ancient threshold once `round` is the latest decided round.
    fn ancient_threshold(&self, round: u64) -> u64 {
        let anchor = (round + 1)
            .saturating_sub(self.config.rounds_non_ancient)
            .max(1);
        match self.config.ancient_mode {
            AncientMode::Generation => self
                .round_min_judge_generation
                .get(&anchor)
                .copied()
                .unwrap_or(0),
            AncientMode::BirthRound => (round + 1).saturating_sub(self.config.rounds_non_ancient),
        }
    }

    /// Drop ancient state: graph events, undecided entries, orphaned
    /// elections and stale round history.
    fn expire_ancient(&mut self, round: u64, threshold: u64) {
        if threshold > 0 {
            self.graph.prune(self.config.ancient_mode, threshold);
            let graph = &self.graph;
            self.undecided.retain(|&id| graph.contains(id));
            self.elections.retain_known(graph);
        }
        let keep_from = (round + 1).saturating_sub(self.config.rounds_non_ancient);
        self.round_min_judge_generation
            .retain(|&r, _| r >= keep_from);
    }

    /// XOR of the judges' signatures; mixed into ordering tiebreaks so
    /// they cannot be ground out in advance.
    fn whitening(&self, judges: &[EventId]) -> [u8; 64] {
        let mut whitening = [0u8; 64];
        for &j in judges {
            let signature = self.graph.meta(j).event.signature();
            for (w, b) in whitening.iter_mut().zip(signature.as_bytes()) {
                *w ^= b;
            }
        }
        whitening
    }

    /// Events currently tracked by the graph.
    pub fn tracked_events(&self) -> usize {
        self.graph.event_count()
    }

    /// Forked events rejected so far.
    pub fn forks_rejected(&self) -> u64 {
        self.graph.forks_rejected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_types::{
        AddressBookEntry, EventCore, EventSignature, GossipEvent, Hash, NodeId, PublicKey,
    };
    use std::collections::HashMap;

    fn address_book(nodes: u64) -> AddressBook {
        AddressBook::new(
            0,
            (0..nodes)
                .map(|i| AddressBookEntry {
                    node_id: NodeId(i),
                    public_key: PublicKey([0u8; 32]),
                    weight: 1,
                    active: true,
                })
                .collect(),
        )
    }

    /// Deterministic all-to-all gossip: creator `t % n` makes an event
    /// whose other parent is the latest event of the previous creator.
    /// Every event therefore sees the entire graph before it.
    struct GossipFixture {
        latest: HashMap<NodeId, Arc<GossipEvent>>,
        clock: u64,
        counter: u64,
    }

    impl GossipFixture {
        fn new() -> Self {
            Self {
                latest: HashMap::new(),
                clock: 1_000_000,
                counter: 0,
            }
        }

        fn next(&mut self, nodes: u64) -> LinkedEvent {
            let creator = NodeId(self.counter % nodes);
            let previous = NodeId((self.counter + nodes - 1) % nodes);
            self.counter += 1;
            self.clock += 1_000;

            let self_parent = self.latest.get(&creator).cloned();
            let other_parent = self
                .latest
                .get(&previous)
                .filter(|p| Some(p.hash()) != self_parent.as_ref().map(|s| s.hash()))
                .cloned();

            let mut signature = [0u8; 64];
            signature[32] = (self.counter % 251) as u8;
            let core = EventCore {
                creator,
                self_parent: self_parent.as_ref().map(|p| p.descriptor()),
                other_parent: other_parent.as_ref().map(|p| p.descriptor()),
                birth_round: 0,
                time_created: Timestamp::from_nanos(self.clock as i128),
                transactions: vec![],
            };
            let event = GossipEvent::new(core, EventSignature(signature));
            let bytes = braid_types::encode(event.core()).unwrap();
            event.set_hash(Hash::from_bytes(&bytes));
            event.set_stream_sequence(self.counter);
            let event = Arc::new(event);
            self.latest.insert(creator, Arc::clone(&event));

            LinkedEvent {
                event,
                self_parent,
                other_parent,
            }
        }
    }

    fn run(engine: &mut ConsensusEngine, steps: u64, nodes: u64) -> Vec<ConsensusRound> {
        let mut fixture = GossipFixture::new();
        let mut rounds = Vec::new();
        for _ in 0..steps {
            rounds.extend(engine.add_event(&fixture.next(nodes)));
        }
        rounds
    }

    #[test]
    fn test_rounds_are_decided_and_strictly_increasing() {
        let book = address_book(4);
        let mut engine = ConsensusEngine::new(ConsensusConfig::default(), &book);
        let rounds = run(&mut engine, 40, 4);
        assert!(
            rounds.len() >= 3,
            "expected several decided rounds, got {}",
            rounds.len()
        );
        for (i, round) in rounds.iter().enumerate() {
            assert_eq!(round.round, i as u64 + 1);
        }
        assert_eq!(engine.last_decided_round(), rounds.len() as u64);
    }

    #[test]
    fn test_every_round_has_judges_and_events() {
        let book = address_book(4);
        let mut engine = ConsensusEngine::new(ConsensusConfig::default(), &book);
        let rounds = run(&mut engine, 40, 4);
        for round in &rounds {
            assert!(!round.snapshot.judges.is_empty());
            assert!(!round.events.is_empty());
            assert_eq!(
                round.keystone().unwrap().hash(),
                round.events.last().unwrap().event.hash()
            );
        }
    }

    #[test]
    fn test_consensus_timestamps_strictly_increase() {
        let book = address_book(4);
        let mut engine = ConsensusEngine::new(ConsensusConfig::default(), &book);
        let rounds = run(&mut engine, 60, 4);
        let mut previous: Option<Timestamp> = None;
        for round in &rounds {
            for event in &round.events {
                if let Some(p) = previous {
                    assert!(event.consensus_timestamp > p);
                }
                previous = Some(event.consensus_timestamp);
            }
        }
    }

    #[test]
    fn test_no_event_reaches_consensus_twice() {
        let book = address_book(4);
        let mut engine = ConsensusEngine::new(ConsensusConfig::default(), &book);
        let rounds = run(&mut engine, 60, 4);
        let mut seen = std::collections::HashSet::new();
        for round in &rounds {
            for event in &round.events {
                assert!(seen.insert(event.event.hash()), "event in two rounds");
            }
        }
    }

    #[test]
    fn test_identical_inputs_give_byte_identical_rounds() {
        let book = address_book(4);
        let mut a = ConsensusEngine::new(ConsensusConfig::default(), &book);
        let mut b = ConsensusEngine::new(ConsensusConfig::default(), &book);

        let mut fixture_a = GossipFixture::new();
        let mut fixture_b = GossipFixture::new();
        let mut rounds_a = Vec::new();
        let mut rounds_b = Vec::new();
        for _ in 0..60 {
            rounds_a.extend(a.add_event(&fixture_a.next(4)));
            rounds_b.extend(b.add_event(&fixture_b.next(4)));
        }

        assert!(!rounds_a.is_empty());
        assert_eq!(rounds_a.len(), rounds_b.len());
        for (ra, rb) in rounds_a.iter().zip(&rounds_b) {
            assert_eq!(ra.encoded().unwrap(), rb.encoded().unwrap());
        }
    }

    #[test]
    fn test_window_advances_with_rounds() {
        let book = address_book(4);
        let config = ConsensusConfig::default().with_rounds_non_ancient(2);
        let mut engine = ConsensusEngine::new(config, &book);
        let rounds = run(&mut engine, 80, 4);
        let last = rounds.last().unwrap();
        assert_eq!(
            last.window.latest_consensus_round,
            engine.last_decided_round()
        );
        // With a two-round window the threshold must have moved off zero.
        assert!(last.window.ancient_threshold > 0);
        // And pruning must keep the graph bounded well below the total
        // number of events fed in.
        assert!(engine.tracked_events() < 80);
    }

    #[test]
    fn test_unknown_creator_ignored() {
        let book = address_book(2);
        let mut engine = ConsensusEngine::new(ConsensusConfig::default(), &book);
        let mut fixture = GossipFixture::new();
        // Creators 0..3 but the book only knows 0 and 1.
        for _ in 0..8 {
            engine.add_event(&fixture.next(4));
        }
        assert!(engine.tracked_events() <= 4);
    }

    #[test]
    fn test_load_snapshot_resumes_round_numbering() {
        let book = address_book(4);
        let mut engine = ConsensusEngine::new(ConsensusConfig::default(), &book);
        let snapshot = ConsensusSnapshot {
            round: 10,
            judges: vec![],
            min_round_generation: 40,
        };
        engine.load_snapshot(&snapshot);
        assert_eq!(engine.last_decided_round(), 10);

        let rounds = run(&mut engine, 60, 4);
        assert!(!rounds.is_empty());
        // Rounds resume after the snapshot: parentless events land at the
        // snapshot round, so the first decided round follows it.
        assert_eq!(rounds[0].round, 11);
    }
}
