//! Fame elections.
//!
//! Each witness W of round r is voted on by the witnesses of later rounds.
//! Round r+1 witnesses vote YES iff they see W. From round r+2 on, a voter
//! takes the weighted majority of the votes of the previous-round witnesses
//! it strongly sees, and decides the election when those witnesses agree
//! with supermajority weight. Every `coin_freq` rounds the vote of an
//! undecided voter is a deterministic pseudorandom bit derived from its own
//! signature, which prevents a forked network from stalling forever.
//!
//! Votes are recomputed from the graph whenever a new witness arrives. That
//! keeps late-arriving witnesses (slower creators) correct without vote
//! backfill bookkeeping, and every input sequence yields the same decisions.

use crate::config::ConsensusConfig;
use crate::graph::{EventGraph, EventId};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::error;

pub(crate) struct Elections {
    /// Open elections: (witness round, witness id).
    open: BTreeSet<(u64, EventId)>,
    /// Elections already reported as exceeding the depth cap.
    stall_reported: HashSet<EventId>,
}

impl Elections {
    pub fn new() -> Self {
        Self {
            open: BTreeSet::new(),
            stall_reported: HashSet::new(),
        }
    }

    /// Open the election for a newly arrived witness.
    pub fn open_election(&mut self, round: u64, witness: EventId) {
        self.open.insert((round, witness));
    }

    /// Drop elections whose witness was pruned.
    pub fn retain_known(&mut self, graph: &EventGraph) {
        self.open.retain(|&(_, id)| graph.contains(id));
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Recompute every open election against the current graph, recording
    /// decided fame on the witnesses.
    pub fn recompute(&mut self, graph: &mut EventGraph, config: &ConsensusConfig) {
        let elections: Vec<(u64, EventId)> = self.open.iter().copied().collect();
        for (witness_round, witness) in elections {
            if let Some(famous) = self.run_election(graph, config, witness_round, witness) {
                graph.meta_mut(witness).famous = Some(famous);
                self.open.remove(&(witness_round, witness));
                self.stall_reported.remove(&witness);
            }
        }
    }

    fn run_election(
        &mut self,
        graph: &EventGraph,
        config: &ConsensusConfig,
        witness_round: u64,
        witness: EventId,
    ) -> Option<bool> {
        let mut votes: HashMap<EventId, bool> = HashMap::new();

        for voting_round in (witness_round + 1)..=graph.max_round {
            let depth = voting_round - witness_round;
            for &voter in graph.witnesses_of(voting_round) {
                if graph.meta(voter).late_witness {
                    continue;
                }
                let vote = if depth == 1 {
                    graph.sees(voter, witness)
                } else {
                    let (yes_weight, no_weight) =
                        self.tally_previous_round(graph, &votes, voter, voting_round - 1);
                    if depth % config.coin_freq == 0 {
                        // Coin round: no decisions, supermajorities carry
                        // over, everyone else flips a deterministic coin.
                        if graph.is_supermajority(yes_weight) {
                            true
                        } else if graph.is_supermajority(no_weight) {
                            false
                        } else {
                            coin_flip(graph, voter)
                        }
                    } else if graph.is_supermajority(yes_weight) {
                        return Some(true);
                    } else if graph.is_supermajority(no_weight) {
                        return Some(false);
                    } else {
                        yes_weight >= no_weight
                    }
                };
                votes.insert(voter, vote);
            }
            if depth > config.election_depth_cap && self.stall_reported.insert(witness) {
                error!(
                    witness_round,
                    depth, "fame election exceeded depth cap without deciding"
                );
            }
        }
        None
    }

    /// Weight of yes and no votes among previous-round witnesses the voter
    /// strongly sees.
    fn tally_previous_round(
        &self,
        graph: &EventGraph,
        votes: &HashMap<EventId, bool>,
        voter: EventId,
        previous_round: u64,
    ) -> (u64, u64) {
        let mut yes_weight = 0u64;
        let mut no_weight = 0u64;
        for &previous in graph.witnesses_of(previous_round) {
            let Some(&vote) = votes.get(&previous) else {
                continue;
            };
            if graph.strongly_sees(voter, previous) {
                if vote {
                    yes_weight += graph.weight_of(previous);
                } else {
                    no_weight += graph.weight_of(previous);
                }
            }
        }
        (yes_weight, no_weight)
    }
}

/// Deterministic pseudorandom bit from the voter's own signature.
fn coin_flip(graph: &EventGraph, voter: EventId) -> bool {
    let signature = graph.meta(voter).event.signature();
    signature.as_bytes()[32] & 1 == 1
}
