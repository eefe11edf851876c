//! Orphan buffering.
//!
//! An event is an orphan if a declared parent is neither ancient nor yet
//! known here. Orphans are held, indexed by the missing parent's
//! `(creator, generation)`, and released in arrival order when the parent
//! shows up. Parents below the ancient threshold are treated as present
//! immediately. On a window update, orphans whose missing parent fell
//! ancient are emitted anyway: consensus treats them as having only the
//! known parent.

use braid_types::{EventWindow, GossipEvent, Hash, NodeId};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

type ParentKey = (NodeId, u64);

pub struct OrphanBuffer {
    window: EventWindow,
    /// Non-ancient events already emitted, with their ancient identifier
    /// for eviction.
    known_recent: HashMap<Hash, u64>,
    /// Orphans, indexed by each missing parent. An orphan missing both
    /// parents is stored under both keys; the `orphans` set keeps the
    /// bookkeeping exact.
    pending: BTreeMap<ParentKey, Vec<Arc<GossipEvent>>>,
    orphans: HashSet<Hash>,
    dropped_ancient: AtomicU64,
}

impl OrphanBuffer {
    pub fn new(window: EventWindow) -> Self {
        Self {
            window,
            known_recent: HashMap::new(),
            pending: BTreeMap::new(),
            orphans: HashSet::new(),
            dropped_ancient: AtomicU64::new(0),
        }
    }

    /// Handle one incoming event. Returns the events emitted, parents
    /// before children, stable by arrival within one release.
    pub fn handle_event(&mut self, event: Arc<GossipEvent>) -> Vec<Arc<GossipEvent>> {
        let mut emitted = Vec::new();
        self.process(VecDeque::from([event]), &mut emitted);
        emitted
    }

    /// Apply a window update. Returns orphans released because their
    /// missing parents fell ancient; orphans that fell ancient themselves
    /// are dropped.
    pub fn update_window(&mut self, window: EventWindow) -> Vec<Arc<GossipEvent>> {
        self.window = window;
        let threshold = window.ancient_threshold;
        self.known_recent
            .retain(|_, ancient_id| *ancient_id >= threshold);

        // Re-evaluate every held orphan: ancient parents now count as
        // present, and orphans that fell ancient are dropped on re-entry.
        let held: VecDeque<Arc<GossipEvent>> = {
            let mut seen = HashSet::new();
            self.pending
                .iter()
                .flat_map(|(_, events)| events.iter())
                .filter(|e| seen.insert(e.hash()))
                .cloned()
                .collect()
        };
        self.pending.clear();
        self.orphans.clear();

        let mut emitted = Vec::new();
        self.process(held, &mut emitted);
        emitted
    }

    fn process(&mut self, mut work: VecDeque<Arc<GossipEvent>>, emitted: &mut Vec<Arc<GossipEvent>>) {
        while let Some(event) = work.pop_front() {
            let hash = event.hash();
            if self.window.is_ancient(&event) {
                self.dropped_ancient.fetch_add(1, Ordering::Relaxed);
                self.orphans.remove(&hash);
                trace!(hash = %hash, "dropped ancient event");
                continue;
            }
            if self.known_recent.contains_key(&hash) {
                // Already emitted; a second copy can reach here when an
                // orphan was indexed under both of its missing parents.
                continue;
            }

            let missing: Vec<ParentKey> = event
                .parents()
                .filter(|p| {
                    !self.window.is_descriptor_ancient(p)
                        && !self.known_recent.contains_key(&p.hash)
                })
                .map(|p| (p.creator, p.generation))
                .collect();

            if missing.is_empty() {
                self.orphans.remove(&hash);
                self.known_recent
                    .insert(hash, event.ancient_identifier(self.window.ancient_mode));
                let key = (event.creator(), event.generation());
                if let Some(waiters) = self.pending.remove(&key) {
                    work.extend(waiters);
                }
                emitted.push(event);
            } else {
                self.orphans.insert(hash);
                for key in missing {
                    self.pending.entry(key).or_default().push(Arc::clone(&event));
                }
            }
        }
    }

    /// Number of orphans currently held.
    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    /// Number of events dropped as ancient.
    pub fn dropped_ancient(&self) -> u64 {
        self.dropped_ancient.load(Ordering::Relaxed)
    }
}
