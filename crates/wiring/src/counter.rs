//! Backpressure object counter.

use std::sync::{Condvar, Mutex};

/// Counts objects in some region of the pipeline, blocking on-ramps while a
/// configured capacity is reached.
///
/// Normally a counter spans a single scheduler (its unhandled tasks). The
/// hasher / post-hash collector pair shares one counter spanning both
/// stages: on-ramped at the hasher input, off-ramped when the collector
/// emits, so the pair behaves as a single backpressured region.
pub struct ObjectCounter {
    name: String,
    capacity: u64,
    count: Mutex<u64>,
    changed: Condvar,
}

impl ObjectCounter {
    /// Create a counter. `capacity = None` disables backpressure.
    pub fn new(name: impl Into<String>, capacity: Option<u64>) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.unwrap_or(u64::MAX),
            count: Mutex::new(0),
            changed: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Increment the count, blocking while the counter is at capacity.
    pub fn on_ramp(&self) {
        let mut count = self.count.lock().expect("counter lock poisoned");
        while *count >= self.capacity {
            count = self.changed.wait(count).expect("counter lock poisoned");
        }
        *count += 1;
    }

    /// Increment the count if below capacity.
    pub fn try_on_ramp(&self) -> bool {
        let mut count = self.count.lock().expect("counter lock poisoned");
        if *count >= self.capacity {
            return false;
        }
        *count += 1;
        true
    }

    /// Increment the count regardless of capacity. Used by inject solders.
    pub fn force_on_ramp(&self) {
        let mut count = self.count.lock().expect("counter lock poisoned");
        *count += 1;
    }

    /// Decrement the count, waking blocked on-ramps and flushers.
    pub fn off_ramp(&self) {
        let mut count = self.count.lock().expect("counter lock poisoned");
        *count = count
            .checked_sub(1)
            .unwrap_or_else(|| panic!("off_ramp without matching on_ramp on {}", self.name));
        self.changed.notify_all();
    }

    /// Current count.
    pub fn count(&self) -> u64 {
        *self.count.lock().expect("counter lock poisoned")
    }

    /// Block until the count reaches zero.
    pub fn wait_until_empty(&self) {
        let mut count = self.count.lock().expect("counter lock poisoned");
        while *count > 0 {
            count = self.changed.wait(count).expect("counter lock poisoned");
        }
    }
}
