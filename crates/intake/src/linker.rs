//! In-order event linking.

use braid_types::{EventDescriptor, EventWindow, GossipEvent, Hash, LinkedEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::error;

/// Resolves parent hashes to in-memory event references.
///
/// Downstream of the orphan buffer, every non-ancient parent must be
/// resolvable. A parent that should be present but is not indicates a logic
/// bug upstream: the event is dropped with a fatal-level log and a counter
/// bump, and the node keeps running.
pub struct InOrderLinker {
    window: EventWindow,
    events: HashMap<Hash, Arc<GossipEvent>>,
    invariant_violations: AtomicU64,
}

enum ParentLink {
    /// Parent resolved (or legitimately absent: undeclared or ancient).
    Resolved(Option<Arc<GossipEvent>>),
    /// Parent should have been present; the child must be dropped.
    Broken,
}

impl InOrderLinker {
    pub fn new(window: EventWindow) -> Self {
        Self {
            window,
            events: HashMap::new(),
            invariant_violations: AtomicU64::new(0),
        }
    }

    /// Link one event. Returns `None` when the event is dropped.
    pub fn link(&mut self, event: Arc<GossipEvent>) -> Option<LinkedEvent> {
        if self.window.is_ancient(&event) {
            // Fell ancient between the orphan buffer and here; not an error.
            return None;
        }

        let self_parent = match self.resolve(&event, event.self_parent()) {
            ParentLink::Resolved(parent) => parent,
            ParentLink::Broken => return None,
        };
        let other_parent = match self.resolve(&event, event.other_parent()) {
            ParentLink::Resolved(parent) => parent,
            ParentLink::Broken => return None,
        };

        if let Some(sp) = &self_parent {
            if event.time_created() <= sp.time_created() {
                self.invariant_violations.fetch_add(1, Ordering::Relaxed);
                error!(
                    event = ?event,
                    parent = ?sp,
                    "event time created does not advance past self parent"
                );
                return None;
            }
        }

        self.events.insert(event.hash(), Arc::clone(&event));
        Some(LinkedEvent {
            event,
            self_parent,
            other_parent,
        })
    }

    fn resolve(
        &self,
        child: &Arc<GossipEvent>,
        descriptor: Option<&EventDescriptor>,
    ) -> ParentLink {
        let Some(descriptor) = descriptor else {
            return ParentLink::Resolved(None);
        };
        if self.window.is_descriptor_ancient(descriptor) {
            return ParentLink::Resolved(None);
        }
        match self.events.get(&descriptor.hash) {
            Some(parent) => ParentLink::Resolved(Some(Arc::clone(parent))),
            None => {
                self.invariant_violations.fetch_add(1, Ordering::Relaxed);
                error!(
                    child = ?child,
                    parent_hash = %descriptor.hash,
                    "non-ancient parent missing from linker; orphan buffer invariant broken"
                );
                ParentLink::Broken
            }
        }
    }

    /// Apply a window update, evicting linked events that fell ancient.
    pub fn update_window(&mut self, window: EventWindow) {
        self.window = window;
        self.events.retain(|_, event| !window.is_ancient(event));
    }

    /// Number of invariant violations observed.
    pub fn invariant_violations(&self) -> u64 {
        self.invariant_violations.load(Ordering::Relaxed)
    }

    /// Number of linked events currently held.
    pub fn tracked(&self) -> usize {
        self.events.len()
    }
}
