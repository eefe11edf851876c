//! The PCES writer: rotating segment files, fsync on demand, retention.

use crate::segment::{SegmentReader, SegmentRecord, SegmentWriter};
use crate::PcesError;
use braid_types::{AncientMode, EventWindow, GossipEvent};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the PCES writer.
#[derive(Debug, Clone)]
pub struct PcesWriterConfig {
    /// Directory holding the segment files.
    pub directory: PathBuf,

    /// Maximum span of ancient identifiers (birth rounds or generations)
    /// per segment file before rotation.
    pub max_segment_span: u64,

    /// Free disk space below which writes are refused. Durability is
    /// non-negotiable, so running out of space takes the node down.
    pub min_free_space: u64,

    /// I/O retry attempts before an error is fatal.
    pub retry_attempts: u32,

    /// Backoff between I/O retries.
    pub retry_backoff: Duration,
}

impl PcesWriterConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            max_segment_span: 64,
            min_free_space: 64 * 1024 * 1024,
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }

    pub fn with_max_segment_span(mut self, span: u64) -> Self {
        assert!(span >= 1, "max_segment_span must be at least 1");
        self.max_segment_span = span;
        self
    }

    pub fn with_min_free_space(mut self, bytes: u64) -> Self {
        self.min_free_space = bytes;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

struct CompletedSegment {
    path: PathBuf,
    max_ancient_id: u64,
}

/// Appends sequenced events to segment files and tracks durability.
///
/// Sole owner of the open append file. During replay the writer is inert:
/// replayed events are durable by definition, so it only advances the
/// durable sequence as they pass. Appending begins at the done-streaming
/// trigger.
pub struct PcesWriter {
    config: PcesWriterConfig,
    ancient_mode: AncientMode,
    window: EventWindow,
    current: Option<SegmentWriter>,
    completed: Vec<CompletedSegment>,
    streaming_done: bool,
    last_written_sequence: Option<u64>,
    latest_durable_sequence: Option<u64>,
    /// Keystone sequence awaiting durability; the fsync happens as soon as
    /// the keystone event has been written.
    pending_flush: Option<u64>,
    minimum_ancient_to_store: u64,
    next_sequence: u64,
}

impl PcesWriter {
    pub fn new(config: PcesWriterConfig, ancient_mode: AncientMode) -> Result<Self, PcesError> {
        std::fs::create_dir_all(&config.directory)?;
        Ok(Self {
            config,
            ancient_mode,
            window: EventWindow::genesis(ancient_mode),
            current: None,
            completed: Vec::new(),
            streaming_done: false,
            last_written_sequence: None,
            latest_durable_sequence: None,
            pending_flush: None,
            minimum_ancient_to_store: 0,
            next_sequence: 0,
        })
    }

    /// Handle one sequenced event. Returns a new latest durable sequence
    /// number to publish, if durability advanced.
    pub fn handle_event(&mut self, event: &Arc<GossipEvent>) -> Result<Option<u64>, PcesError> {
        let sequence = event.stream_sequence();
        self.next_sequence = sequence + 1;

        if !self.streaming_done {
            // Replay: the event came from disk and is durable already.
            self.latest_durable_sequence = Some(sequence);
            if self.pending_flush.is_some_and(|keystone| sequence >= keystone) {
                self.pending_flush = None;
            }
            return Ok(Some(sequence));
        }

        let ancient_id = event.ancient_identifier(self.ancient_mode);
        if self.window.is_ancient(event) {
            // An ancient event can no longer influence consensus; it does
            // not belong in the stream.
            debug!(sequence, ancient_id, "skipping ancient event");
            return Ok(None);
        }
        self.roll_if_needed(sequence, ancient_id)?;
        if self.current.is_none() {
            self.open_segment(sequence, ancient_id)?;
        }

        let segment = self.current.as_mut().expect("segment opened above");
        retrying(&self.config, || segment.append(event, sequence))?;
        self.last_written_sequence = Some(sequence);

        // A requested flush may have been waiting for this event.
        if self
            .pending_flush
            .is_some_and(|keystone| sequence >= keystone)
        {
            self.pending_flush = None;
            return self.sync_current().map(Some);
        }
        Ok(None)
    }

    /// Handle a keystone flush request from the consensus engine. Returns
    /// a new latest durable sequence number once the keystone is durable.
    pub fn handle_flush_request(&mut self, keystone: u64) -> Result<Option<u64>, PcesError> {
        if self
            .latest_durable_sequence
            .is_some_and(|durable| durable >= keystone)
        {
            return Ok(None);
        }
        if self
            .last_written_sequence
            .is_some_and(|written| written >= keystone)
        {
            return self.sync_current().map(Some);
        }
        // The keystone is still in flight; sync as soon as it lands.
        self.pending_flush = Some(self.pending_flush.unwrap_or(0).max(keystone));
        Ok(None)
    }

    /// Replay finished: begin appending after the replayed stream.
    pub fn handle_done_streaming(&mut self) {
        self.streaming_done = true;
        info!(
            next_sequence = self.next_sequence,
            "PCES replay complete; writer now appending"
        );
    }

    /// External discontinuity (e.g. reconnect): mark, close the current
    /// segment and start fresh.
    pub fn register_discontinuity(&mut self) -> Result<(), PcesError> {
        let Some(mut segment) = self.current.take() else {
            debug!("discontinuity with no open segment; nothing to mark");
            return Ok(());
        };
        let next_sequence = self.next_sequence;
        retrying(&self.config, || {
            segment.append_discontinuity(next_sequence)
        })?;
        self.finish_segment(segment)?;
        info!(next_sequence, "PCES discontinuity recorded");
        Ok(())
    }

    /// Apply a window update. Applied between events.
    pub fn update_window(&mut self, window: EventWindow) {
        self.window = window;
    }

    /// New lower bound on the ancient identifiers that must stay on disk
    /// (fed from the state file manager). Returns the number of segment
    /// files deleted.
    pub fn update_minimum_ancient_to_store(&mut self, minimum: u64) -> usize {
        self.minimum_ancient_to_store = minimum;
        let mut deleted = 0;
        self.completed.retain(|segment| {
            if segment.max_ancient_id >= minimum {
                return true;
            }
            match std::fs::remove_file(&segment.path) {
                Ok(()) => {
                    debug!(path = %segment.path.display(), "deleted expired PCES segment");
                    deleted += 1;
                    false
                }
                Err(err) => {
                    warn!(path = %segment.path.display(), %err, "failed to delete segment");
                    true
                }
            }
        });
        deleted
    }

    /// Close the current segment cleanly, syncing everything.
    pub fn close(&mut self) -> Result<(), PcesError> {
        if let Some(segment) = self.current.take() {
            self.finish_segment(segment)?;
        }
        Ok(())
    }

    pub fn latest_durable_sequence(&self) -> Option<u64> {
        self.latest_durable_sequence
    }

    pub fn completed_segment_count(&self) -> usize {
        self.completed.len()
    }

    fn roll_if_needed(&mut self, sequence: u64, ancient_id: u64) -> Result<(), PcesError> {
        let must_roll = self
            .current
            .as_ref()
            .is_some_and(|segment| {
                ancient_id.saturating_sub(segment.header().min_ancient_id)
                    > self.config.max_segment_span
            });
        if must_roll {
            let segment = self.current.take().expect("checked above");
            self.finish_segment(segment)?;
            self.open_segment(sequence, ancient_id)?;
        }
        Ok(())
    }

    fn open_segment(&mut self, first_sequence: u64, ancient_id: u64) -> Result<(), PcesError> {
        self.check_free_space()?;
        // The first event's ancient identifier anchors the segment's span.
        let min_ancient = ancient_id;
        let path = self
            .config
            .directory
            .join(format!("{first_sequence:020}.pces"));
        let segment = retrying(&self.config, || {
            SegmentWriter::create(&path, first_sequence, min_ancient, self.ancient_mode)
        })?;
        debug!(path = %path.display(), first_sequence, "opened PCES segment");
        self.current = Some(segment);
        Ok(())
    }

    fn finish_segment(&mut self, segment: SegmentWriter) -> Result<(), PcesError> {
        let max_ancient_id = segment.max_ancient_id();
        let path = segment.finish()?;
        self.completed.push(CompletedSegment {
            path,
            max_ancient_id,
        });
        Ok(())
    }

    fn sync_current(&mut self) -> Result<u64, PcesError> {
        let durable = self
            .last_written_sequence
            .expect("flush requested before anything was written");
        // A just-finished segment was synced on close; only an open
        // segment needs an explicit sync.
        if let Some(segment) = self.current.as_mut() {
            let config = self.config.clone();
            retrying(&config, || segment.sync())?;
        }
        self.latest_durable_sequence = Some(durable);
        Ok(durable)
    }

    fn check_free_space(&self) -> Result<(), PcesError> {
        if self.config.min_free_space == 0 {
            return Ok(());
        }
        if let Some(available) = available_disk_space(&self.config.directory) {
            if available < self.config.min_free_space {
                return Err(PcesError::DiskFull {
                    required: self.config.min_free_space,
                    available,
                });
            }
        }
        Ok(())
    }
}

/// Run an I/O operation with bounded retries and backoff.
fn retrying<T>(
    config: &PcesWriterConfig,
    mut op: impl FnMut() -> Result<T, PcesError>,
) -> Result<T, PcesError> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < config.retry_attempts => {
                attempt += 1;
                warn!(%err, attempt, "PCES I/O failed; retrying");
                std::thread::sleep(config.retry_backoff);
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(unix)]
fn available_disk_space(path: &Path) -> Option<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut stats: libc::statvfs = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::statvfs(c_path.as_ptr(), &mut stats) };
    if result != 0 {
        return None;
    }
    Some(stats.f_bavail as u64 * stats.f_frsize as u64)
}

#[cfg(not(unix))]
fn available_disk_space(_path: &Path) -> Option<u64> {
    None
}

/// Streams every event in a PCES directory in sequence order, skipping
/// events already ancient at `starting_ancient_threshold`. Discontinuity
/// markers reset per-file derivation state.
pub struct PcesEventStream {
    segments: VecDeque<SegmentReader>,
    current: Option<SegmentReader>,
    starting_ancient_threshold: u64,
    ancient_mode: AncientMode,
}

/// Open the PCES directory for replay.
pub fn open_event_stream(
    directory: impl AsRef<Path>,
    starting_ancient_threshold: u64,
    ancient_mode: AncientMode,
) -> Result<PcesEventStream, PcesError> {
    let mut readers = Vec::new();
    if directory.as_ref().is_dir() {
        for entry in std::fs::read_dir(directory.as_ref())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("pces") {
                continue;
            }
            match SegmentReader::open(&path) {
                Ok(reader) => readers.push(reader),
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping unreadable segment");
                }
            }
        }
    }
    readers.sort_by_key(|reader| reader.header().first_sequence);
    info!(
        segments = readers.len(),
        starting_ancient_threshold, "opened PCES stream for replay"
    );
    Ok(PcesEventStream {
        segments: readers.into(),
        current: None,
        starting_ancient_threshold,
        ancient_mode,
    })
}

impl Iterator for PcesEventStream {
    type Item = Result<GossipEvent, PcesError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() {
                self.current = self.segments.pop_front();
                self.current.as_ref()?;
            }
            let reader = self.current.as_mut().expect("set above");
            match reader.next_record() {
                Ok(Some(SegmentRecord::Event { event, .. })) => {
                    if event.ancient_identifier(self.ancient_mode)
                        < self.starting_ancient_threshold
                    {
                        continue;
                    }
                    return Some(Ok(event));
                }
                Ok(Some(SegmentRecord::Discontinuity { next_sequence })) => {
                    debug!(next_sequence, "replay crossing a discontinuity");
                    continue;
                }
                Ok(None) => {
                    self.current = None;
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
