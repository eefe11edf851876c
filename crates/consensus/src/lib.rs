//! Hashgraph-style virtual-voting consensus engine.
//!
//! Linked events are folded into an event graph; witnesses hold virtual
//! elections on each other's fame; once every witness of a round is decided,
//! the round's famous witnesses (judges) assign a consensus order and
//! timestamps to the events they all see. Rounds are emitted strictly in
//! increasing round number, and the whole computation is deterministic: two
//! engines fed the same event sequence produce byte-identical rounds.
//!
//! The engine owns all of its internal tables; external readers only ever
//! see the immutable [`braid_types::ConsensusRound`] outputs.

mod config;
mod election;
mod engine;
mod graph;

pub use config::ConsensusConfig;
pub use engine::ConsensusEngine;
