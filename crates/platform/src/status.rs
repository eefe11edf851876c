//! Platform status.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Lifecycle status of the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformStatus {
    /// Wiring built, replay not yet started.
    Starting,
    /// Streaming the PCES back through the pipeline; gossip not admitted.
    ReplayingEvents,
    /// Normal operation.
    Active,
    /// A non-recoverable failure (PCES I/O, disk space). The node must be
    /// restarted by an operator.
    Down,
}

impl PlatformStatus {
    fn as_u8(self) -> u8 {
        match self {
            Self::Starting => 0,
            Self::ReplayingEvents => 1,
            Self::Active => 2,
            Self::Down => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Starting,
            1 => Self::ReplayingEvents,
            2 => Self::Active,
            _ => Self::Down,
        }
    }
}

/// Shared holder of the current platform status. Cheap to clone; all
/// clones share the same cell. `Down` is terminal.
#[derive(Clone)]
pub struct StatusNexus {
    status: Arc<AtomicU8>,
}

impl StatusNexus {
    pub fn new() -> Self {
        Self {
            status: Arc::new(AtomicU8::new(PlatformStatus::Starting.as_u8())),
        }
    }

    pub fn get(&self) -> PlatformStatus {
        PlatformStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn set(&self, status: PlatformStatus) {
        if self.get() == PlatformStatus::Down {
            // Down is terminal; nothing upgrades out of it.
            return;
        }
        self.status.store(status.as_u8(), Ordering::Release);
        if status == PlatformStatus::Down {
            warn!("platform status is now DOWN");
        } else {
            info!(?status, "platform status changed");
        }
    }
}

impl Default for StatusNexus {
    fn default() -> Self {
        Self::new()
    }
}
