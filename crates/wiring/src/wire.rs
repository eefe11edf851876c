//! Typed wires connecting stages.

use std::sync::{Arc, RwLock};

/// How an output is soldered to an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolderType {
    /// Enqueue into the target, honoring its backpressure.
    Normal,
    /// Enqueue bypassing capacity. Never blocks. Cycles in the wiring are
    /// permitted only through inject solders.
    Inject,
}

/// A named input of a stage.
///
/// Created by [`TaskScheduler`](crate::TaskScheduler) input builders; each
/// `put` enqueues one task on the owning scheduler.
pub struct InputWire<T> {
    name: Arc<str>,
    push: Arc<dyn Fn(T, SolderType) + Send + Sync>,
}

impl<T> Clone for InputWire<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            push: Arc::clone(&self.push),
        }
    }
}

impl<T: Send + 'static> InputWire<T> {
    pub(crate) fn new(
        name: impl Into<Arc<str>>,
        push: impl Fn(T, SolderType) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            push: Arc::new(push),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue an item, blocking while the target stage is at capacity.
    pub fn put(&self, item: T) {
        (self.push)(item, SolderType::Normal);
    }

    /// Enqueue an item bypassing backpressure.
    pub fn inject(&self, item: T) {
        (self.push)(item, SolderType::Inject);
    }

    /// An input wire that applies `transform` on the caller's thread before
    /// enqueueing.
    ///
    /// The transform runs at `put` time, in caller order, which makes it the
    /// right place to assign order-sensitive markers such as the hasher's
    /// ticket numbers.
    pub fn with_transform<U, F>(&self, name: impl Into<Arc<str>>, transform: F) -> InputWire<U>
    where
        U: Send + 'static,
        F: Fn(U) -> T + Send + Sync + 'static,
    {
        let inner = self.clone();
        InputWire::new(name, move |item: U, solder| {
            (inner.push)(transform(item), solder)
        })
    }
}

type Target<T> = (Arc<str>, Box<dyn Fn(T) + Send + Sync>);

/// A named output of a stage, soldered to any number of inputs.
///
/// Forwarding clones the item for every target but the last, so events are
/// shared as cheap `Arc` handles in practice.
pub struct OutputWire<T> {
    name: Arc<str>,
    targets: Arc<RwLock<Vec<Target<T>>>>,
}

impl<T> Clone for OutputWire<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            targets: Arc::clone(&self.targets),
        }
    }
}

impl<T: Clone + Send + 'static> OutputWire<T> {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            targets: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Solder this output to an input, honoring the target's backpressure.
    pub fn solder_to(&self, input: &InputWire<T>) {
        let target = input.clone();
        self.push_target(Arc::clone(&input.name), Box::new(move |item| target.put(item)));
    }

    /// Solder this output to an input, bypassing the target's backpressure.
    pub fn solder_to_injecting(&self, input: &InputWire<T>) {
        let target = input.clone();
        self.push_target(
            Arc::clone(&input.name),
            Box::new(move |item| target.inject(item)),
        );
    }

    /// Solder this output to an arbitrary consumer (external components,
    /// test taps).
    pub fn solder_fn(&self, name: impl Into<Arc<str>>, f: impl Fn(T) + Send + Sync + 'static) {
        self.push_target(name.into(), Box::new(f));
    }

    fn push_target(&self, name: Arc<str>, f: Box<dyn Fn(T) + Send + Sync>) {
        self.targets
            .write()
            .expect("output wire lock poisoned")
            .push((name, f));
    }

    /// Forward an item to every soldered target, in solder order.
    pub fn forward(&self, item: T) {
        let targets = self.targets.read().expect("output wire lock poisoned");
        let Some((last, rest)) = targets.split_last() else {
            return;
        };
        for (_, target) in rest {
            target(item.clone());
        }
        (last.1)(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn collector() -> (InputWire<u32>, Arc<Mutex<Vec<u32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let wire = InputWire::new("collector", move |item, _| {
            sink.lock().unwrap().push(item);
        });
        (wire, seen)
    }

    #[test]
    fn test_forward_reaches_all_targets_in_order() {
        let out = OutputWire::new("out");
        let (a, seen_a) = collector();
        let (b, seen_b) = collector();
        out.solder_to(&a);
        out.solder_to(&b);
        out.forward(1);
        out.forward(2);
        assert_eq!(*seen_a.lock().unwrap(), vec![1, 2]);
        assert_eq!(*seen_b.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_forward_without_targets_is_a_no_op() {
        OutputWire::new("out").forward(7u32);
    }

    #[test]
    fn test_with_transform_runs_on_put() {
        let (wire, seen) = collector();
        let doubled = wire.with_transform("doubler", |x: u32| x * 2);
        doubled.put(21);
        assert_eq!(*seen.lock().unwrap(), vec![42]);
    }
}
