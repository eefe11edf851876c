//! The Braid platform: assembles the consensus event-intake pipeline.
//!
//! [`PlatformWiring`] builds every stage, solders the topology and exposes
//! the platform's surface: the gossip input, the consensus round output,
//! the PCES replay entry point, the durability gate and the flush
//! coordinator. See the crate-level docs of `braid_wiring`,
//! `braid_intake`, `braid_consensus` and `braid_pces` for the pieces.

mod config;
mod coordinator;
mod status;
mod window_manager;
mod wiring;

pub use config::PlatformConfig;
pub use coordinator::PlatformCoordinator;
pub use status::{PlatformStatus, StatusNexus};
pub use window_manager::EventWindowManager;
pub use wiring::{PlatformError, PlatformHooks, PlatformWiring};
