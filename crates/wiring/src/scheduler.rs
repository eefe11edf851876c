//! Task schedulers: the worker behind each stage.

use crate::counter::ObjectCounter;
use crate::model::WiringModel;
use crate::wire::{InputWire, SolderType};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Worker policy of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPolicy {
    /// One task at a time, chained onto the shared pool. FIFO. For light
    /// stages that never block on a bounded downstream queue.
    Sequential,
    /// One dedicated OS thread. FIFO. For stages that may block (forwarding
    /// into bounded queues, file I/O).
    SequentialThread,
    /// Every task spawned onto the shared pool; no ordering guarantee.
    Concurrent,
    /// Tasks run inline on the caller's thread.
    Direct,
}

type Task = Box<dyn FnOnce() + Send>;

struct SeqState {
    queue: VecDeque<Task>,
    draining: bool,
}

/// Policy-independent stage machinery: queue, counters, worker lifecycle.
pub(crate) struct StageCore {
    name: String,
    policy: SchedulerPolicy,
    /// Tasks enqueued but not yet completed. Carries this stage's own
    /// backpressure capacity and is what `flush` waits on.
    unprocessed: ObjectCounter,
    /// Additional counter on-ramped at this stage's input, for a
    /// backpressure region spanning several stages. The region's off-ramp
    /// is applied by whichever component ends the region.
    extra_on_ramp: Option<Arc<ObjectCounter>>,
    pool: Arc<rayon::ThreadPool>,
    seq: Mutex<SeqState>,
    thread_tx: Mutex<Option<crossbeam::channel::Sender<Task>>>,
    thread_handle: Mutex<Option<std::thread::JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl StageCore {
    fn finish_one(&self) {
        self.unprocessed.off_ramp();
    }

    fn submit(self: &Arc<Self>, task: Task, solder: SolderType) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        match solder {
            SolderType::Normal => {
                if let Some(counter) = &self.extra_on_ramp {
                    counter.on_ramp();
                }
                self.unprocessed.on_ramp();
            }
            SolderType::Inject => {
                if let Some(counter) = &self.extra_on_ramp {
                    counter.force_on_ramp();
                }
                self.unprocessed.force_on_ramp();
            }
        }
        match self.policy {
            SchedulerPolicy::Direct => {
                task();
                self.finish_one();
            }
            SchedulerPolicy::Concurrent => {
                let core = Arc::clone(self);
                self.pool.spawn(move || {
                    task();
                    core.finish_one();
                });
            }
            SchedulerPolicy::SequentialThread => {
                let guard = self.thread_tx.lock().expect("scheduler lock poisoned");
                match guard.as_ref() {
                    Some(tx) => {
                        if tx.send(task).is_err() {
                            // Stage already stopped; the task is dropped.
                            self.finish_one();
                        }
                    }
                    None => self.finish_one(),
                }
            }
            SchedulerPolicy::Sequential => {
                let spawn_drain = {
                    let mut seq = self.seq.lock().expect("scheduler lock poisoned");
                    seq.queue.push_back(task);
                    if seq.draining {
                        false
                    } else {
                        seq.draining = true;
                        true
                    }
                };
                if spawn_drain {
                    let core = Arc::clone(self);
                    self.pool.spawn(move || core.drain());
                }
            }
        }
    }

    /// Run queued tasks one at a time until the queue empties.
    fn drain(&self) {
        loop {
            let task = {
                let mut seq = self.seq.lock().expect("scheduler lock poisoned");
                match seq.queue.pop_front() {
                    Some(task) => task,
                    None => {
                        seq.draining = false;
                        return;
                    }
                }
            };
            task();
            self.finish_one();
        }
    }

    fn start_thread(self: &Arc<Self>) {
        let (tx, rx) = crossbeam::channel::unbounded::<Task>();
        *self.thread_tx.lock().expect("scheduler lock poisoned") = Some(tx);
        let core = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                for task in rx.iter() {
                    if core.stopped.load(Ordering::Acquire) {
                        break;
                    }
                    task();
                    core.finish_one();
                }
            })
            .expect("failed to spawn scheduler worker thread");
        *self.thread_handle.lock().expect("scheduler lock poisoned") = Some(handle);
    }

    /// Signal the stage to stop and join its worker. Pending tasks are
    /// dropped.
    pub(crate) fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        drop(self.thread_tx.lock().expect("scheduler lock poisoned").take());
        if let Some(handle) = self
            .thread_handle
            .lock()
            .expect("scheduler lock poisoned")
            .take()
        {
            let _ = handle.join();
        }
        debug!(stage = %self.name, "stage stopped");
    }

    pub(crate) fn flush(&self) {
        self.unprocessed.wait_until_empty();
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn unprocessed_count(&self) -> u64 {
        self.unprocessed.count()
    }
}

enum ComponentCell<C> {
    /// Sequential and direct stages: one task at a time, so the lock is
    /// uncontended and exists only to satisfy the borrow rules.
    Exclusive(Arc<Mutex<C>>),
    /// Concurrent stages: handlers take `&C` and may run in parallel.
    Shared(Arc<C>),
}

impl<C> Clone for ComponentCell<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Exclusive(c) => Self::Exclusive(Arc::clone(c)),
            Self::Shared(c) => Self::Shared(Arc::clone(c)),
        }
    }
}

/// A stage: a component plus its worker.
///
/// Input wires are built from the scheduler; each wire enqueues one task per
/// item, applying a bound handler to the component.
pub struct TaskScheduler<C> {
    core: Arc<StageCore>,
    component: ComponentCell<C>,
}

impl<C: Send + Sync + 'static> TaskScheduler<C> {
    /// Build an input wire for a sequential, sequential-thread or direct
    /// stage.
    ///
    /// # Panics
    ///
    /// Panics if the stage is concurrent; use
    /// [`concurrent_input`](Self::concurrent_input) there.
    pub fn input_with<T, F>(&self, name: &str, handler: F) -> InputWire<T>
    where
        T: Send + 'static,
        F: Fn(&mut C, T) + Send + Sync + 'static,
    {
        let ComponentCell::Exclusive(component) = &self.component else {
            panic!(
                "sequential input built on concurrent stage {}",
                self.core.name()
            );
        };
        let component = Arc::clone(component);
        let handler = Arc::new(handler);
        let core = Arc::clone(&self.core);
        InputWire::new(name.to_owned(), move |item: T, solder| {
            let component = Arc::clone(&component);
            let handler = Arc::clone(&handler);
            let task: Task = Box::new(move || {
                let mut guard = component.lock().expect("component lock poisoned");
                handler(&mut guard, item);
            });
            core.submit(task, solder);
        })
    }

    /// Build an input wire for a concurrent stage.
    ///
    /// # Panics
    ///
    /// Panics if the stage is not concurrent.
    pub fn concurrent_input<T, F>(&self, name: &str, handler: F) -> InputWire<T>
    where
        T: Send + 'static,
        F: Fn(&C, T) + Send + Sync + 'static,
    {
        let ComponentCell::Shared(component) = &self.component else {
            panic!(
                "concurrent input built on non-concurrent stage {}",
                self.core.name()
            );
        };
        let component = Arc::clone(component);
        let handler = Arc::new(handler);
        let core = Arc::clone(&self.core);
        InputWire::new(name.to_owned(), move |item: T, solder| {
            let component = Arc::clone(&component);
            let handler = Arc::clone(&handler);
            let task: Task = Box::new(move || handler(&component, item));
            core.submit(task, solder);
        })
    }

    /// Run `f` against the component.
    ///
    /// For sequential stages this locks the component, so it must not be
    /// called from inside the stage's own handler. Intended for idle-time
    /// inspection (tests, gossip snapshot reads).
    pub fn with_component<R>(&self, f: impl FnOnce(&C) -> R) -> R {
        match &self.component {
            ComponentCell::Exclusive(c) => f(&c.lock().expect("component lock poisoned")),
            ComponentCell::Shared(c) => f(c),
        }
    }

    /// Block until the queue is empty and every enqueued handler returned.
    pub fn flush(&self) {
        self.core.flush();
    }

    /// A cheap handle for flushing this stage from elsewhere (the platform
    /// coordinator keeps these in topological order).
    pub fn flush_handle(&self) -> FlushHandle {
        FlushHandle {
            core: Arc::clone(&self.core),
        }
    }

    /// Number of enqueued-but-unfinished tasks.
    pub fn unprocessed_count(&self) -> u64 {
        self.core.unprocessed_count()
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }
}

/// A cloneable handle that flushes one stage.
#[derive(Clone)]
pub struct FlushHandle {
    core: Arc<StageCore>,
}

impl FlushHandle {
    /// Block until the stage's queue is empty and every enqueued handler
    /// returned.
    pub fn flush(&self) {
        self.core.flush();
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }
}

/// Builder for a stage.
pub struct SchedulerBuilder<'m> {
    model: &'m WiringModel,
    name: String,
    policy: SchedulerPolicy,
    capacity: Option<u64>,
    extra_on_ramp: Option<Arc<ObjectCounter>>,
}

impl<'m> SchedulerBuilder<'m> {
    pub(crate) fn new(model: &'m WiringModel, name: impl Into<String>) -> Self {
        Self {
            model,
            name: name.into(),
            policy: SchedulerPolicy::Sequential,
            capacity: None,
            extra_on_ramp: None,
        }
    }

    pub fn policy(mut self, policy: SchedulerPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bound the stage's own unhandled-task counter; normal enqueues block
    /// at this capacity.
    pub fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Additionally on-ramp the given counter at this stage's input (for
    /// backpressure regions spanning stages).
    pub fn extra_on_ramp(mut self, counter: Arc<ObjectCounter>) -> Self {
        self.extra_on_ramp = Some(counter);
        self
    }

    /// Finish the stage, registering it with the model for flush (in
    /// registration order) and shutdown.
    pub fn build<C: Send + Sync + 'static>(self, component: C) -> TaskScheduler<C> {
        let core = Arc::new(StageCore {
            unprocessed: ObjectCounter::new(format!("{} unprocessed", self.name), self.capacity),
            name: self.name,
            policy: self.policy,
            extra_on_ramp: self.extra_on_ramp,
            pool: self.model.pool(),
            seq: Mutex::new(SeqState {
                queue: VecDeque::new(),
                draining: false,
            }),
            thread_tx: Mutex::new(None),
            thread_handle: Mutex::new(None),
            stopped: AtomicBool::new(false),
        });
        if core.policy == SchedulerPolicy::SequentialThread {
            core.start_thread();
        }
        self.model.register(Arc::clone(&core));
        let component = match core.policy {
            SchedulerPolicy::Concurrent => ComponentCell::Shared(Arc::new(component)),
            _ => ComponentCell::Exclusive(Arc::new(Mutex::new(component))),
        };
        TaskScheduler { core, component }
    }
}
