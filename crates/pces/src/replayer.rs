//! PCES replay at startup.

use crate::PcesError;
use braid_types::GossipEvent;
use braid_wiring::OutputWire;
use tracing::info;

/// Emitted once the whole stream has been replayed and both flushes have
/// completed; unblocks the writer and admits gossip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoneStreamingPces {
    /// How many events were forwarded into the intake pipeline.
    pub events_replayed: u64,
}

/// Streams durable events back through the intake pipeline.
///
/// Runs single-shot on a direct scheduler before gossip is admitted. Every
/// replayed event enters the hasher exactly like a gossip event; replay is
/// idempotent, so the deduplicator and the consensus engine end up in the
/// same state as in the original run.
pub struct PcesReplayer {
    event_output: OutputWire<GossipEvent>,
    flush_intake: Box<dyn Fn() + Send + Sync>,
    flush_transaction_handling: Box<dyn Fn() + Send + Sync>,
}

impl PcesReplayer {
    pub fn new(
        event_output: OutputWire<GossipEvent>,
        flush_intake: impl Fn() + Send + Sync + 'static,
        flush_transaction_handling: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            event_output,
            flush_intake: Box::new(flush_intake),
            flush_transaction_handling: Box::new(flush_transaction_handling),
        }
    }

    /// The output wire feeding replayed events into the hasher.
    pub fn event_output(&self) -> &OutputWire<GossipEvent> {
        &self.event_output
    }

    /// Replay the whole stream, then flush the intake pipeline and
    /// transaction handling, in that order, before signalling completion.
    pub fn replay(
        &self,
        events: impl IntoIterator<Item = Result<GossipEvent, PcesError>>,
    ) -> Result<DoneStreamingPces, PcesError> {
        let mut events_replayed = 0u64;
        for event in events {
            self.event_output.forward(event?);
            events_replayed += 1;
        }
        (self.flush_intake)();
        (self.flush_transaction_handling)();
        info!(events_replayed, "PCES replay streamed and flushed");
        Ok(DoneStreamingPces { events_replayed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::sequenced_event;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_replay_forwards_everything_then_flushes_in_order() {
        let forwarded = Arc::new(AtomicU64::new(0));
        let calls: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let output = OutputWire::new("replayer out");
        let sink = Arc::clone(&forwarded);
        output.solder_fn("counter", move |_event: GossipEvent| {
            sink.fetch_add(1, Ordering::Relaxed);
        });

        let intake_calls = Arc::clone(&calls);
        let tx_calls = Arc::clone(&calls);
        let replayer = PcesReplayer::new(
            output,
            move || intake_calls.lock().unwrap().push("flush_intake"),
            move || tx_calls.lock().unwrap().push("flush_transaction_handling"),
        );

        let events = (0..100u64).map(|i| Ok(sequenced_event(i, i)));
        let done = replayer.replay(events).unwrap();

        assert_eq!(done.events_replayed, 100);
        assert_eq!(forwarded.load(Ordering::Relaxed), 100);
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["flush_intake", "flush_transaction_handling"]
        );
    }

    #[test]
    fn test_replay_stops_on_stream_error() {
        let output = OutputWire::new("replayer out");
        let replayer = PcesReplayer::new(output, || {}, || {});
        let events = vec![
            Ok(sequenced_event(0, 0)),
            Err(PcesError::BadMagic),
            Ok(sequenced_event(1, 1)),
        ];
        assert!(replayer.replay(events).is_err());
    }
}
