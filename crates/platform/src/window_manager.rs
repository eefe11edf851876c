//! The event window manager: sole writer of the non-ancient event window.

use braid_types::{ConsensusRound, EventWindow};
use tracing::debug;

/// Derives window updates from decided consensus rounds and re-broadcasts
/// them. The broadcast uses inject solders, so a window update can never
/// deadlock against the event flow it controls; consumers apply it between
/// events.
pub struct EventWindowManager {
    current: EventWindow,
}

impl EventWindowManager {
    pub fn new(initial: EventWindow) -> Self {
        Self { current: initial }
    }

    pub fn current(&self) -> EventWindow {
        self.current
    }

    /// A round was decided; returns the window to broadcast if it moved
    /// forward.
    pub fn on_consensus_round(&mut self, round: &ConsensusRound) -> Option<EventWindow> {
        self.advance(round.window)
    }

    /// An externally supplied window (snapshot load); returns it if it
    /// moved forward.
    pub fn on_manual_window(&mut self, window: EventWindow) -> Option<EventWindow> {
        self.advance(window)
    }

    fn advance(&mut self, window: EventWindow) -> Option<EventWindow> {
        assert_eq!(
            window.ancient_mode, self.current.ancient_mode,
            "ancient mode must not change at runtime"
        );
        if window.latest_consensus_round <= self.current.latest_consensus_round
            && self.current.latest_consensus_round != 0
        {
            return None;
        }
        debug!(
            round = window.latest_consensus_round,
            ancient_threshold = window.ancient_threshold,
            "event window advanced"
        );
        self.current = window;
        Some(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_types::AncientMode;

    fn window(round: u64) -> EventWindow {
        EventWindow {
            latest_consensus_round: round,
            ancient_threshold: round,
            min_round_generation: round,
            ancient_mode: AncientMode::Generation,
        }
    }

    #[test]
    fn test_only_advances_forward() {
        let mut manager = EventWindowManager::new(EventWindow::genesis(AncientMode::Generation));
        assert!(manager.on_manual_window(window(3)).is_some());
        assert!(manager.on_manual_window(window(3)).is_none());
        assert!(manager.on_manual_window(window(2)).is_none());
        assert!(manager.on_manual_window(window(4)).is_some());
        assert_eq!(manager.current().latest_consensus_round, 4);
    }

    #[test]
    #[should_panic(expected = "ancient mode must not change")]
    fn test_mode_switch_rejected() {
        let mut manager = EventWindowManager::new(EventWindow::genesis(AncientMode::Generation));
        manager.on_manual_window(EventWindow::genesis(AncientMode::BirthRound));
    }
}
