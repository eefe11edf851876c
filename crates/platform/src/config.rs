//! Platform configuration.

use braid_consensus::ConsensusConfig;
use braid_intake::IntakeConfig;
use braid_pces::PcesWriterConfig;
use braid_types::AncientMode;
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Top-level configuration: scheduler sizing plus the per-subsystem
/// configs. The ancient mode set here is authoritative and is copied into
/// the consensus config at build time.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Capacity of the backpressure counter spanning the hasher and the
    /// post-hash collector.
    pub event_hasher_unhandled_capacity: u64,

    /// Queue capacity of the orphan buffer stage.
    pub orphan_buffer_capacity: u64,

    /// Queue capacity of the future event buffer stage.
    pub future_event_buffer_capacity: u64,

    /// Queue capacity of the remaining bounded stages.
    pub default_scheduler_capacity: u64,

    /// Worker pool parallelism is
    /// `default_pool_multiplier * cores + default_pool_constant`.
    pub default_pool_multiplier: f64,
    pub default_pool_constant: usize,

    /// How ancient-ness is judged. Fixed at genesis.
    pub ancient_mode: AncientMode,

    pub intake: IntakeConfig,
    pub consensus: ConsensusConfig,
    pub pces: PcesWriterConfig,
}

impl PlatformConfig {
    /// A configuration with defaults, writing PCES segments under the
    /// given directory.
    pub fn new(pces_directory: impl Into<PathBuf>) -> Self {
        Self {
            event_hasher_unhandled_capacity: 500,
            orphan_buffer_capacity: 500,
            future_event_buffer_capacity: 500,
            default_scheduler_capacity: 500,
            default_pool_multiplier: 1.0,
            default_pool_constant: 8,
            ancient_mode: AncientMode::Generation,
            intake: IntakeConfig::default(),
            consensus: ConsensusConfig::default(),
            pces: PcesWriterConfig::new(pces_directory),
        }
    }

    pub fn with_ancient_mode(mut self, mode: AncientMode) -> Self {
        self.ancient_mode = mode;
        self
    }

    pub fn with_event_hasher_unhandled_capacity(mut self, capacity: u64) -> Self {
        self.event_hasher_unhandled_capacity = capacity;
        self
    }

    pub fn with_consensus(mut self, consensus: ConsensusConfig) -> Self {
        self.consensus = consensus;
        self
    }

    pub fn with_intake(mut self, intake: IntakeConfig) -> Self {
        self.intake = intake;
        self
    }

    pub fn with_pces(mut self, pces: PcesWriterConfig) -> Self {
        self.pces = pces;
        self
    }

    /// Worker pool size derived from the machine's core count.
    pub fn pool_parallelism(&self) -> usize {
        let cores = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(4);
        ((self.default_pool_multiplier * cores as f64) as usize + self.default_pool_constant)
            .max(1)
    }
}
