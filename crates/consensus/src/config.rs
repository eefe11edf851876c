//! Consensus configuration.

use braid_types::AncientMode;

/// Configuration for the consensus engine.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// How ancient-ness is judged. Fixed at genesis; the engine never
    /// changes mode at runtime.
    pub ancient_mode: AncientMode,

    /// Rounds between coin-round votes in a fame election.
    pub coin_freq: u64,

    /// Election depth after which a stalled election is reported. The
    /// election keeps running; progress resumes once connectivity heals.
    pub election_depth_cap: u64,

    /// How many decided rounds stay non-ancient.
    pub rounds_non_ancient: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            ancient_mode: AncientMode::Generation,
            coin_freq: 10,
            election_depth_cap: 64,
            rounds_non_ancient: 26,
        }
    }
}

impl ConsensusConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ancient_mode(mut self, mode: AncientMode) -> Self {
        self.ancient_mode = mode;
        self
    }

    pub fn with_coin_freq(mut self, coin_freq: u64) -> Self {
        assert!(coin_freq >= 2, "coin_freq must be at least 2");
        self.coin_freq = coin_freq;
        self
    }

    pub fn with_election_depth_cap(mut self, cap: u64) -> Self {
        self.election_depth_cap = cap;
        self
    }

    pub fn with_rounds_non_ancient(mut self, rounds: u64) -> Self {
        assert!(rounds >= 1, "rounds_non_ancient must be at least 1");
        self.rounds_non_ancient = rounds;
        self
    }
}
