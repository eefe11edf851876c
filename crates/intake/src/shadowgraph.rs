//! Shadowgraph: ancestry index of recent events for the gossip sync
//! protocol.
//!
//! Mirrors the linker's accepted events. Owned by its stage; gossip reads
//! through snapshot methods that take the internal read lock, so the stage
//! can keep inserting while peers are served. Not on the consensus critical
//! path.

use braid_types::{EventDescriptor, EventWindow, GossipEvent, Hash, LinkedEvent, NodeId};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, RwLock};

struct ShadowEvent {
    event: Arc<GossipEvent>,
    self_parent: Option<Hash>,
    other_parent: Option<Hash>,
}

struct Inner {
    /// Events below this ancient identifier are not tracked.
    expiry_threshold: u64,
    by_hash: HashMap<Hash, ShadowEvent>,
    by_creator_generation: HashMap<(NodeId, u64), Vec<Hash>>,
}

pub struct Shadowgraph {
    window: RwLock<EventWindow>,
    inner: RwLock<Inner>,
}

impl Shadowgraph {
    pub fn new(window: EventWindow) -> Self {
        Self {
            window: RwLock::new(window),
            inner: RwLock::new(Inner {
                expiry_threshold: window.ancient_threshold,
                by_hash: HashMap::new(),
                by_creator_generation: HashMap::new(),
            }),
        }
    }

    /// Insert a linked event. Events below the expiry threshold are
    /// ignored.
    pub fn insert(&self, linked: &LinkedEvent) {
        let window = *self.window.read().expect("shadowgraph lock poisoned");
        let mut inner = self.inner.write().expect("shadowgraph lock poisoned");
        if linked.event.ancient_identifier(window.ancient_mode) < inner.expiry_threshold {
            return;
        }
        let hash = linked.hash();
        let shadow = ShadowEvent {
            event: Arc::clone(&linked.event),
            self_parent: linked.self_parent.as_ref().map(|p| p.hash()),
            other_parent: linked.other_parent.as_ref().map(|p| p.hash()),
        };
        inner
            .by_creator_generation
            .entry((linked.creator(), linked.generation()))
            .or_default()
            .push(hash);
        inner.by_hash.insert(hash, shadow);
    }

    /// Look up an event by hash.
    pub fn get(&self, hash: &Hash) -> Option<Arc<GossipEvent>> {
        let inner = self.inner.read().expect("shadowgraph lock poisoned");
        inner.by_hash.get(hash).map(|s| Arc::clone(&s.event))
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        let inner = self.inner.read().expect("shadowgraph lock poisoned");
        inner.by_hash.contains_key(hash)
    }

    /// Events by a creator at a generation (more than one under forks).
    pub fn events_by_creator_generation(
        &self,
        creator: NodeId,
        generation: u64,
    ) -> Vec<Arc<GossipEvent>> {
        let inner = self.inner.read().expect("shadowgraph lock poisoned");
        inner
            .by_creator_generation
            .get(&(creator, generation))
            .map(|hashes| {
                hashes
                    .iter()
                    .filter_map(|h| inner.by_hash.get(h))
                    .map(|s| Arc::clone(&s.event))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Descriptors of all tracked ancestors of the given tips, for peer
    /// sync queries. Sorted by hash for a deterministic response; excludes
    /// the tips themselves.
    pub fn ancestor_descriptors(&self, tips: &[Hash]) -> Vec<EventDescriptor> {
        let inner = self.inner.read().expect("shadowgraph lock poisoned");
        let mut visited: BTreeSet<Hash> = BTreeSet::new();
        let mut work: VecDeque<Hash> = tips.iter().copied().collect();
        while let Some(hash) = work.pop_front() {
            let Some(shadow) = inner.by_hash.get(&hash) else {
                continue;
            };
            for parent in [shadow.self_parent, shadow.other_parent].into_iter().flatten() {
                if visited.insert(parent) {
                    work.push_back(parent);
                }
            }
        }
        visited
            .iter()
            .filter_map(|h| inner.by_hash.get(h))
            .map(|s| s.event.descriptor())
            .collect()
    }

    /// Apply a window update, expiring events that fell below the
    /// threshold.
    pub fn expire(&self, window: EventWindow) {
        *self.window.write().expect("shadowgraph lock poisoned") = window;
        let mut inner = self.inner.write().expect("shadowgraph lock poisoned");
        let inner = &mut *inner;
        inner.expiry_threshold = window.ancient_threshold;
        let threshold = window.ancient_threshold;
        let mode = window.ancient_mode;
        inner
            .by_hash
            .retain(|_, shadow| shadow.event.ancient_identifier(mode) >= threshold);
        let by_hash = &inner.by_hash;
        inner.by_creator_generation.retain(|_, hashes| {
            hashes.retain(|h| by_hash.contains_key(h));
            !hashes.is_empty()
        });
    }

    /// Drop everything, e.g. before loading a snapshot.
    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("shadowgraph lock poisoned");
        inner.by_hash.clear();
        inner.by_creator_generation.clear();
    }

    /// Reset to an explicit expiry threshold after a snapshot load.
    pub fn start_from_threshold(&self, threshold: u64) {
        self.clear();
        let mut inner = self.inner.write().expect("shadowgraph lock poisoned");
        inner.expiry_threshold = threshold;
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("shadowgraph lock poisoned")
            .by_hash
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{event, genesis_event};
    use braid_types::AncientMode;

    fn linked(
        event: &Arc<GossipEvent>,
        self_parent: Option<&Arc<GossipEvent>>,
        other_parent: Option<&Arc<GossipEvent>>,
    ) -> LinkedEvent {
        LinkedEvent {
            event: Arc::clone(event),
            self_parent: self_parent.cloned(),
            other_parent: other_parent.cloned(),
        }
    }

    fn graph() -> Shadowgraph {
        Shadowgraph::new(EventWindow::genesis(AncientMode::Generation))
    }

    #[test]
    fn test_insert_and_lookup() {
        let g = graph();
        let a = genesis_event(1, 100);
        g.insert(&linked(&a, None, None));
        assert!(g.contains(&a.hash()));
        assert_eq!(g.get(&a.hash()).unwrap().hash(), a.hash());
        assert_eq!(g.events_by_creator_generation(NodeId(1), 0).len(), 1);
    }

    #[test]
    fn test_ancestor_query() {
        let g = graph();
        let a = genesis_event(1, 100);
        let b = genesis_event(2, 110);
        let c = event(1, Some(&a), Some(&b), 0, 200);
        let d = event(1, Some(&c), None, 0, 300);
        g.insert(&linked(&a, None, None));
        g.insert(&linked(&b, None, None));
        g.insert(&linked(&c, Some(&a), Some(&b)));
        g.insert(&linked(&d, Some(&c), None));

        let ancestors = g.ancestor_descriptors(&[d.hash()]);
        let hashes: BTreeSet<Hash> = ancestors.iter().map(|d| d.hash).collect();
        assert_eq!(
            hashes,
            BTreeSet::from([a.hash(), b.hash(), c.hash()])
        );
    }

    #[test]
    fn test_expire_removes_exactly_the_ancient() {
        let g = graph();
        let genesis = genesis_event(1, 100);
        let mut tip = Arc::clone(&genesis);
        let mut prev = None;
        let mut events = vec![];
        for i in 0..6u64 {
            let e = if i == 0 {
                Arc::clone(&genesis)
            } else {
                event(1, Some(&tip), None, 0, 100 + i)
            };
            g.insert(&linked(&e, prev.as_ref(), None));
            prev = Some(Arc::clone(&e));
            tip = Arc::clone(&e);
            events.push(e);
        }
        assert_eq!(g.len(), 6);

        g.expire(EventWindow {
            latest_consensus_round: 1,
            ancient_threshold: 3,
            min_round_generation: 3,
            ancient_mode: AncientMode::Generation,
        });
        assert_eq!(g.len(), 3);
        assert!(!g.contains(&events[2].hash()));
        assert!(g.contains(&events[3].hash()));

        // Insertions below the threshold are ignored from now on.
        let stale = event(2, None, None, 0, 50);
        g.insert(&linked(&stale, None, None));
        assert!(!g.contains(&stale.hash()));
    }

    #[test]
    fn test_clear_and_restart() {
        let g = graph();
        g.insert(&linked(&genesis_event(1, 100), None, None));
        g.start_from_threshold(10);
        assert!(g.is_empty());
    }
}
