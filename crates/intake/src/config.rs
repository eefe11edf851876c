//! Intake configuration.

/// Configuration for the intake components.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Maximum total transaction payload bytes per event.
    pub max_transaction_bytes: usize,

    /// How many rounds ahead of the current window an event's birth round
    /// may be before the internal validator rejects it as malformed.
    pub birth_round_lookahead: u64,

    /// Token-bucket rate for self-event creation, in events per second.
    pub max_creation_rate: f64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_transaction_bytes: 245_760,
            birth_round_lookahead: 1,
            max_creation_rate: 100.0,
        }
    }
}

impl IntakeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_transaction_bytes(mut self, bytes: usize) -> Self {
        self.max_transaction_bytes = bytes;
        self
    }

    pub fn with_birth_round_lookahead(mut self, rounds: u64) -> Self {
        self.birth_round_lookahead = rounds;
        self
    }

    pub fn with_max_creation_rate(mut self, rate: f64) -> Self {
        self.max_creation_rate = rate;
        self
    }
}
