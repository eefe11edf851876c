//! Self-event creation.

use crate::IntakeConfig;
use braid_types::{
    event_signing_message, EventCore, EventWindow, GossipEvent, Hash, NodeId, Signer, Timestamp,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::trace;

/// Source of transactions for self-created events.
///
/// The transaction pool itself is outside the pipeline; this is its
/// capability surface. The token bucket on the creation manager is the
/// backpressure tie-in: creation pauses when the bucket is dry.
pub trait TransactionSupplier: Send + Sync {
    /// Take up to `max_bytes` worth of transactions for the next event.
    fn take(&self, max_bytes: usize) -> Vec<Vec<u8>>;
}

/// A supplier with nothing to supply. Events are still created: empty
/// events carry ancestry, which is what consensus feeds on.
pub struct NoTransactions;

impl TransactionSupplier for NoTransactions {
    fn take(&self, _max_bytes: usize) -> Vec<Vec<u8>> {
        vec![]
    }
}

/// Creates this node's own events.
///
/// The self parent is the node's latest own event; the other parent is
/// chosen by a least-recently-chosen heuristic over creators with a known
/// non-ancient latest event. Created events are hashed and signed here and
/// re-enter the pipeline through an inject solder into the internal
/// validator, closing the only cycle in the wiring.
pub struct EventCreationManager {
    self_id: NodeId,
    signer: Arc<dyn Signer>,
    supplier: Arc<dyn TransactionSupplier>,
    max_transaction_bytes: usize,
    window: EventWindow,
    latest_by_creator: BTreeMap<NodeId, Arc<GossipEvent>>,
    last_chosen: HashMap<NodeId, u64>,
    choice_tick: u64,
    last_self_event: Option<Arc<GossipEvent>>,
    // Token bucket for rate limiting.
    tokens: f64,
    max_tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl EventCreationManager {
    pub fn new(
        config: &IntakeConfig,
        self_id: NodeId,
        signer: Arc<dyn Signer>,
        supplier: Arc<dyn TransactionSupplier>,
        window: EventWindow,
    ) -> Self {
        let max_tokens = config.max_creation_rate.max(1.0);
        Self {
            self_id,
            signer,
            supplier,
            max_transaction_bytes: config.max_transaction_bytes,
            window,
            latest_by_creator: BTreeMap::new(),
            last_chosen: HashMap::new(),
            choice_tick: 0,
            last_self_event: None,
            tokens: max_tokens,
            max_tokens,
            refill_per_sec: config.max_creation_rate,
            last_refill: Instant::now(),
        }
    }

    /// Track an event as a potential other parent.
    pub fn register_event(&mut self, event: Arc<GossipEvent>) {
        if self.window.is_ancient(&event) {
            return;
        }
        let creator = event.creator();
        match self.latest_by_creator.get(&creator) {
            Some(latest) if latest.generation() >= event.generation() => {}
            _ => {
                self.latest_by_creator.insert(creator, event);
            }
        }
    }

    /// Apply a window update, evicting ancient candidates.
    pub fn update_window(&mut self, window: EventWindow) {
        self.window = window;
        self.latest_by_creator
            .retain(|_, event| !window.is_ancient(event));
    }

    /// Try to create one event. Returns `None` when rate-limited or when
    /// there is nothing to build on at startup.
    pub fn maybe_create(&mut self) -> Option<Arc<GossipEvent>> {
        if !self.take_token() {
            return None;
        }

        let self_parent = self.last_self_event.clone();
        let other_parent = self.choose_other_parent();

        let time_created = self.next_time_created(self_parent.as_deref());
        let core = EventCore {
            creator: self.self_id,
            self_parent: self_parent.as_ref().map(|p| p.descriptor()),
            other_parent: other_parent.as_ref().map(|p| p.descriptor()),
            birth_round: self.window.latest_consensus_round,
            time_created,
            transactions: self.supplier.take(self.max_transaction_bytes),
        };

        let bytes = braid_types::encode(&core).expect("event encoding must succeed");
        let hash = Hash::from_bytes(&bytes);
        let signature = self.signer.sign(&event_signing_message(&hash));
        let event = GossipEvent::new(core, signature);
        event.set_hash(hash);
        let event = Arc::new(event);

        if let Some(other) = &other_parent {
            self.choice_tick += 1;
            self.last_chosen.insert(other.creator(), self.choice_tick);
        }
        self.last_self_event = Some(Arc::clone(&event));
        trace!(event = ?event, "created self event");
        Some(event)
    }

    /// Least-recently-chosen creator with a non-ancient latest event,
    /// excluding self. Ties break by node id for determinism.
    fn choose_other_parent(&self) -> Option<Arc<GossipEvent>> {
        self.latest_by_creator
            .iter()
            .filter(|(creator, _)| **creator != self.self_id)
            .min_by_key(|(creator, _)| {
                (self.last_chosen.get(*creator).copied().unwrap_or(0), **creator)
            })
            .map(|(_, event)| Arc::clone(event))
    }

    /// Wall-clock time, bumped to stay strictly monotone per creator.
    fn next_time_created(&self, self_parent: Option<&GossipEvent>) -> Timestamp {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| Timestamp::from_nanos(d.as_nanos() as i128))
            .unwrap_or(Timestamp::UNIX_EPOCH);
        match self_parent {
            Some(parent) if now <= parent.time_created() => {
                parent.time_created().plus_nanos(1)
            }
            _ => now,
        }
    }

    fn take_token(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.max_tokens);
        if self.tokens < 1.0 {
            return false;
        }
        self.tokens -= 1.0;
        true
    }

    /// Number of creators currently eligible as other parents.
    pub fn candidate_count(&self) -> usize {
        self.latest_by_creator
            .keys()
            .filter(|creator| **creator != self.self_id)
            .count()
    }
}
