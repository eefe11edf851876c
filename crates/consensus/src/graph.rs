//! The event graph: ancestry bookkeeping behind the consensus engine.
//!
//! Events live in an id-keyed arena. Per-creator events form a self-parent
//! chain; each event carries, per creator, the highest chain position of an
//! ancestor by that creator. Seeing and strongly-seeing reduce to O(1) and
//! O(creators) lookups over those vectors.
//!
//! Forks (a second event claiming an occupied chain position) are rejected
//! first-seen-wins; fork evidence collection is out of scope.

use braid_types::{is_supermajority, AddressBook, GossipEvent, Hash, LinkedEvent, NodeId, Timestamp};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::warn;

pub(crate) type EventId = u64;

pub(crate) struct EventMeta {
    pub id: EventId,
    pub event: Arc<GossipEvent>,
    pub creator_idx: usize,
    /// Position in the creator's self-parent chain.
    pub seq: u64,
    pub self_parent: Option<EventId>,
    pub other_parent: Option<EventId>,
    pub round_created: u64,
    pub witness: bool,
    /// Decided fame, for witnesses.
    pub famous: Option<bool>,
    pub round_received: Option<u64>,
    /// Per creator index: highest chain position of an ancestor by that
    /// creator, `-1` for none. Includes the event itself.
    pub latest_ancestor_seq: Vec<i64>,
    /// A witness of a round whose fame was already decided when it
    /// arrived. Excluded from elections and judge sets; still receivable
    /// as an ordinary event.
    pub late_witness: bool,
}

struct CreatorChain {
    base_seq: u64,
    ids: VecDeque<EventId>,
}

impl CreatorChain {
    fn get(&self, seq: u64) -> Option<EventId> {
        seq.checked_sub(self.base_seq)
            .and_then(|i| self.ids.get(i as usize))
            .copied()
    }

    fn next_seq(&self) -> u64 {
        self.base_seq + self.ids.len() as u64
    }
}

pub(crate) struct EventGraph {
    creators: Vec<NodeId>,
    creator_index: HashMap<NodeId, usize>,
    weights: Vec<u64>,
    total_weight: u64,
    events: HashMap<EventId, EventMeta>,
    by_hash: HashMap<Hash, EventId>,
    chains: Vec<CreatorChain>,
    /// round -> witness ids, in insertion order.
    witnesses: BTreeMap<u64, Vec<EventId>>,
    pub max_round: u64,
    next_id: EventId,
    forks_rejected: u64,
}

impl EventGraph {
    pub fn new(address_book: &AddressBook) -> Self {
        let creators: Vec<NodeId> = address_book.node_ids().collect();
        let creator_index = creators
            .iter()
            .enumerate()
            .map(|(i, &n)| (n, i))
            .collect();
        let weights: Vec<u64> = creators.iter().map(|&n| address_book.weight(n)).collect();
        let total_weight = weights.iter().sum();
        let chains = creators
            .iter()
            .map(|_| CreatorChain {
                base_seq: 0,
                ids: VecDeque::new(),
            })
            .collect();
        Self {
            creators,
            creator_index,
            weights,
            total_weight,
            events: HashMap::new(),
            by_hash: HashMap::new(),
            chains,
            witnesses: BTreeMap::new(),
            max_round: 0,
            next_id: 0,
            forks_rejected: 0,
        }
    }

    /// Insert a linked event. Returns `None` for unknown creators, known
    /// hashes and forks.
    ///
    /// `round_floor` is the round assigned to events with no resolvable
    /// parents; it is 1 at genesis and the snapshot round after a snapshot
    /// load.
    pub fn insert(&mut self, linked: &LinkedEvent, round_floor: u64) -> Option<EventId> {
        let creator = linked.creator();
        let Some(&creator_idx) = self.creator_index.get(&creator) else {
            warn!(%creator, "event from creator outside the address book");
            return None;
        };
        if self.by_hash.contains_key(&linked.hash()) {
            return None;
        }

        let self_parent = linked
            .self_parent
            .as_ref()
            .and_then(|p| self.by_hash.get(&p.hash()).copied());
        let other_parent = linked
            .other_parent
            .as_ref()
            .and_then(|p| self.by_hash.get(&p.hash()).copied());

        let seq = match self_parent {
            Some(id) => self.events[&id].seq + 1,
            None => self.chains[creator_idx].next_seq(),
        };
        if seq != self.chains[creator_idx].next_seq() {
            self.forks_rejected += 1;
            warn!(%creator, seq, "rejected fork branch");
            return None;
        }

        let mut latest_ancestor_seq = vec![-1i64; self.creators.len()];
        for parent in [self_parent, other_parent].into_iter().flatten() {
            let parent = &self.events[&parent];
            for (mine, theirs) in latest_ancestor_seq
                .iter_mut()
                .zip(&parent.latest_ancestor_seq)
            {
                *mine = (*mine).max(*theirs);
            }
        }
        latest_ancestor_seq[creator_idx] = latest_ancestor_seq[creator_idx].max(seq as i64);

        let parent_round = [self_parent, other_parent]
            .into_iter()
            .flatten()
            .map(|id| self.events[&id].round_created)
            .max();
        let base_round = parent_round.unwrap_or_else(|| round_floor.max(1));
        let round_created = if self.advances_round(&latest_ancestor_seq, creator_idx, seq, base_round)
        {
            base_round + 1
        } else {
            base_round
        };

        let witness = match self_parent {
            Some(id) => self.events[&id].round_created < round_created,
            None => true,
        };

        let id = self.next_id;
        self.next_id += 1;
        self.by_hash.insert(linked.hash(), id);
        self.chains[creator_idx].ids.push_back(id);
        if witness {
            self.witnesses.entry(round_created).or_default().push(id);
        }
        self.max_round = self.max_round.max(round_created);
        self.events.insert(
            id,
            EventMeta {
                id,
                event: Arc::clone(&linked.event),
                creator_idx,
                seq,
                self_parent,
                other_parent,
                round_created,
                witness,
                famous: None,
                round_received: None,
                latest_ancestor_seq,
                late_witness: false,
            },
        );
        Some(id)
    }

    /// Whether an event with the given ancestry strongly sees a
    /// supermajority (by weight) of the witnesses of `round`.
    fn advances_round(
        &self,
        latest_ancestor_seq: &[i64],
        creator_idx: usize,
        seq: u64,
        round: u64,
    ) -> bool {
        let Some(witnesses) = self.witnesses.get(&round) else {
            return false;
        };
        let mut seen_weight = 0u64;
        for &w in witnesses {
            let w_meta = &self.events[&w];
            if self.strongly_sees_inner(latest_ancestor_seq, creator_idx, seq, w_meta) {
                seen_weight += self.weights[w_meta.creator_idx];
            }
        }
        is_supermajority(seen_weight, self.total_weight)
    }

    /// `x` strongly sees witness `w` iff creators holding a supermajority
    /// of weight each have an event that is an ancestor of `x` and sees
    /// `w`. Seeing is monotone along a creator's chain, so only the latest
    /// ancestor per creator needs checking.
    pub fn strongly_sees(&self, x: EventId, w: EventId) -> bool {
        let x = &self.events[&x];
        let w = &self.events[&w];
        self.strongly_sees_inner(&x.latest_ancestor_seq, x.creator_idx, x.seq, w)
    }

    fn strongly_sees_inner(
        &self,
        latest_ancestor_seq: &[i64],
        creator_idx: usize,
        seq: u64,
        w: &EventMeta,
    ) -> bool {
        let mut weight = 0u64;
        for (c, &la) in latest_ancestor_seq.iter().enumerate() {
            if la < 0 {
                continue;
            }
            let sees = if c == creator_idx && la == seq as i64 {
                // The event itself; its ancestry is the vector in hand.
                latest_ancestor_seq[w.creator_idx] >= w.seq as i64
            } else {
                match self.chains[c].get(la as u64) {
                    Some(id) => self.sees(id, w.id),
                    None => false,
                }
            };
            if sees {
                weight += self.weights[c];
            }
        }
        is_supermajority(weight, self.total_weight)
    }

    /// Whether `w` is an ancestor of `x` (or `x` itself).
    pub fn sees(&self, x: EventId, w: EventId) -> bool {
        let x = &self.events[&x];
        let w = &self.events[&w];
        x.latest_ancestor_seq[w.creator_idx] >= w.seq as i64
    }

    /// The earliest event by `judge`'s creator that is an ancestor of
    /// `judge` and sees `target`: the moment the judge's creator first
    /// received the target. The caller guarantees the judge sees the
    /// target.
    pub fn first_receive_time(&self, judge: EventId, target: EventId) -> Timestamp {
        let j = &self.events[&judge];
        let chain = &self.chains[j.creator_idx];
        let mut lo = chain.base_seq;
        let mut hi = j.seq;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let sees = chain
                .get(mid)
                .map(|id| self.sees(id, target))
                .unwrap_or(false);
            if sees {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        let first = chain.get(lo).unwrap_or(judge);
        self.events[&first].event.time_created()
    }

    pub fn meta(&self, id: EventId) -> &EventMeta {
        &self.events[&id]
    }

    pub fn meta_mut(&mut self, id: EventId) -> &mut EventMeta {
        self.events.get_mut(&id).expect("unknown event id")
    }

    pub fn contains(&self, id: EventId) -> bool {
        self.events.contains_key(&id)
    }

    /// Witnesses of a round, in insertion order.
    pub fn witnesses_of(&self, round: u64) -> &[EventId] {
        self.witnesses
            .get(&round)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn weight_of(&self, id: EventId) -> u64 {
        self.weights[self.events[&id].creator_idx]
    }

    pub fn is_supermajority(&self, weight: u64) -> bool {
        is_supermajority(weight, self.total_weight)
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn forks_rejected(&self) -> u64 {
        self.forks_rejected
    }

    /// Remove events whose ancient identifier fell below the threshold.
    pub fn prune(&mut self, mode: braid_types::AncientMode, threshold: u64) -> usize {
        let removed: Vec<EventId> = self
            .events
            .values()
            .filter(|m| m.event.ancient_identifier(mode) < threshold)
            .map(|m| m.id)
            .collect();
        for id in &removed {
            let meta = self.events.remove(id).expect("id collected above");
            self.by_hash.remove(&meta.event.hash());
        }
        for chain in &mut self.chains {
            while let Some(&front) = chain.ids.front() {
                if self.events.contains_key(&front) {
                    break;
                }
                chain.ids.pop_front();
                chain.base_seq += 1;
            }
        }
        let events = &self.events;
        self.witnesses.retain(|_, ids| {
            ids.retain(|id| events.contains_key(id));
            !ids.is_empty()
        });
        removed.len()
    }

    /// Drop all graph state, keeping the address book derived tables.
    pub fn clear(&mut self) {
        self.events.clear();
        self.by_hash.clear();
        for chain in &mut self.chains {
            chain.ids.clear();
            chain.base_seq = 0;
        }
        self.witnesses.clear();
        self.max_round = 0;
    }
}
