//! Pre-consensus event stream (PCES).
//!
//! The PCES is the durable append-only log of events ahead of consensus:
//! every event is written before it may influence application state. The
//! [`PcesSequencer`] stamps each event with a global stream sequence number,
//! the [`PcesWriter`] appends to rotating segment files and fsyncs when a
//! round's keystone event must become durable, the [`DurabilityNexus`]
//! publishes the latest durable sequence number, and the [`PcesReplayer`]
//! streams the log back through the intake pipeline at startup.

mod nexus;
mod replayer;
mod segment;
mod sequencer;
#[cfg(test)]
mod testutil;
mod writer;

pub use nexus::DurabilityNexus;
pub use replayer::{DoneStreamingPces, PcesReplayer};
pub use segment::{SegmentHeader, SegmentReader, SegmentRecord, SegmentWriter};
pub use sequencer::PcesSequencer;
pub use writer::{open_event_stream, PcesEventStream, PcesWriter, PcesWriterConfig};

use thiserror::Error;

/// Failures in the PCES subsystem.
///
/// Durability is non-negotiable: the writer retries I/O a bounded number of
/// times and the platform takes the node down when an error escapes.
#[derive(Debug, Error)]
pub enum PcesError {
    #[error("PCES I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PCES codec error: {0}")]
    Codec(#[from] braid_types::CodecError),

    #[error("not a PCES segment file (bad magic)")]
    BadMagic,

    #[error("unsupported PCES segment format version {0}")]
    BadVersion(u32),

    #[error("invalid ancient mode byte {0}")]
    BadAncientMode(u8),

    #[error("free disk space below minimum: {available} < {required} bytes")]
    DiskFull { required: u64, available: u64 },
}
