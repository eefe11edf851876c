//! Task scheduler and wire framework for the Braid pipeline.
//!
//! A pipeline is a directed acyclic graph of **stages**. Each stage wraps a
//! pure component with a [`TaskScheduler`] that owns a queue, a worker
//! policy and a backpressure capacity. Stages are connected by **wires**: a
//! named [`OutputWire`] of one stage is soldered to a named [`InputWire`] of
//! another, either normally (honoring the target's backpressure) or by
//! inject (bypassing capacity, for control broadcasts where blocking would
//! deadlock a feedback loop).
//!
//! # Worker policies
//!
//! | Policy | Concurrency | Ordering |
//! |---|---|---|
//! | [`SchedulerPolicy::Sequential`] | one task at a time, chained onto the shared pool | FIFO |
//! | [`SchedulerPolicy::SequentialThread`] | one dedicated thread | FIFO |
//! | [`SchedulerPolicy::Concurrent`] | shared pool, N-way | none |
//! | [`SchedulerPolicy::Direct`] | caller's thread | inline |
//!
//! # Backpressure
//!
//! Every scheduler tracks its unhandled tasks with an [`ObjectCounter`];
//! configuring a capacity makes normal enqueues block while the stage is
//! full. A counter can also span two stages that cannot backpressure each
//! other directly (the hasher / post-hash collector pair): it is on-ramped
//! at the first stage's input and off-ramped when the second stage finishes.
//!
//! # Flush
//!
//! [`TaskScheduler::flush`] blocks until the stage's queue is empty and its
//! handler has returned for every previously enqueued item. The
//! [`WiringModel`] flushes stages in registration order, so registering
//! stages in topological order gives a correct pipeline-wide flush.

mod counter;
mod model;
mod scheduler;
mod wire;

pub use counter::ObjectCounter;
pub use model::{WiringError, WiringModel};
pub use scheduler::{FlushHandle, SchedulerBuilder, SchedulerPolicy, TaskScheduler};
pub use wire::{InputWire, OutputWire, SolderType};
