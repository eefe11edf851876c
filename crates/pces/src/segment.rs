//! PCES segment file format.
//!
//! ```text
//! Header:  magic(4) | formatVersion(u32) | firstSeqNum(u64)
//!          | minAncientId(u64) | ancientMode(u8)
//! Records: repeat { len(u32) | event-bytes(len) | seqNum(u64) | crc32(u32) }
//! Footer:  on clean close: len sentinel 0xFFFFFFFF
//!          | recordCount(u64) | maxAncientId(u64) | crc32(u32)
//! ```
//!
//! All integers big-endian. A record with `len == 0` is a discontinuity
//! marker whose sequence field carries the next stream sequence number. A
//! missing footer means a crash; readers tolerate a truncated final record
//! and stop at the first length or CRC mismatch.

use crate::PcesError;
use braid_types::{AncientMode, GossipEvent};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

const MAGIC: [u8; 4] = *b"BPCE";
const FORMAT_VERSION: u32 = 1;
const FOOTER_SENTINEL: u32 = u32::MAX;

fn mode_to_byte(mode: AncientMode) -> u8 {
    match mode {
        AncientMode::Generation => 0,
        AncientMode::BirthRound => 1,
    }
}

fn mode_from_byte(byte: u8) -> Result<AncientMode, PcesError> {
    match byte {
        0 => Ok(AncientMode::Generation),
        1 => Ok(AncientMode::BirthRound),
        other => Err(PcesError::BadAncientMode(other)),
    }
}

fn record_crc(event_bytes: &[u8], sequence: u64) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(event_bytes);
    hasher.update(&sequence.to_be_bytes());
    hasher.finalize()
}

fn footer_crc(record_count: u64, max_ancient_id: u64) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&record_count.to_be_bytes());
    hasher.update(&max_ancient_id.to_be_bytes());
    hasher.finalize()
}

/// Parsed segment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub first_sequence: u64,
    pub min_ancient_id: u64,
    pub ancient_mode: AncientMode,
}

/// Appends records to one segment file. Owned exclusively by the PCES
/// writer.
pub struct SegmentWriter {
    file: BufWriter<File>,
    path: PathBuf,
    header: SegmentHeader,
    record_count: u64,
    max_ancient_id: u64,
}

impl SegmentWriter {
    /// Create a new segment and write its header.
    pub fn create(
        path: impl Into<PathBuf>,
        first_sequence: u64,
        min_ancient_id: u64,
        ancient_mode: AncientMode,
    ) -> Result<Self, PcesError> {
        let path = path.into();
        let file = File::create(&path)?;
        let mut writer = Self {
            file: BufWriter::new(file),
            path,
            header: SegmentHeader {
                first_sequence,
                min_ancient_id,
                ancient_mode,
            },
            record_count: 0,
            max_ancient_id: min_ancient_id,
        };
        writer.file.write_all(&MAGIC)?;
        writer.file.write_all(&FORMAT_VERSION.to_be_bytes())?;
        writer.file.write_all(&first_sequence.to_be_bytes())?;
        writer.file.write_all(&min_ancient_id.to_be_bytes())?;
        writer
            .file
            .write_all(&[mode_to_byte(ancient_mode)])?;
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> SegmentHeader {
        self.header
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn max_ancient_id(&self) -> u64 {
        self.max_ancient_id
    }

    /// Span of ancient identifiers covered by this segment.
    pub fn ancient_span(&self) -> u64 {
        self.max_ancient_id - self.header.min_ancient_id
    }

    /// Append one event record.
    pub fn append(&mut self, event: &GossipEvent, sequence: u64) -> Result<(), PcesError> {
        let bytes = braid_types::encode(event)?;
        let len = u32::try_from(bytes.len()).expect("event exceeds u32 length");
        assert!(len != 0 && len != FOOTER_SENTINEL, "reserved record length");
        self.file.write_all(&len.to_be_bytes())?;
        self.file.write_all(&bytes)?;
        self.file.write_all(&sequence.to_be_bytes())?;
        self.file
            .write_all(&record_crc(&bytes, sequence).to_be_bytes())?;
        self.record_count += 1;
        self.max_ancient_id = self
            .max_ancient_id
            .max(event.ancient_identifier(self.header.ancient_mode));
        Ok(())
    }

    /// Append a discontinuity marker carrying the next stream sequence.
    pub fn append_discontinuity(&mut self, next_sequence: u64) -> Result<(), PcesError> {
        self.file.write_all(&0u32.to_be_bytes())?;
        self.file.write_all(&next_sequence.to_be_bytes())?;
        self.file
            .write_all(&record_crc(&[], next_sequence).to_be_bytes())?;
        self.record_count += 1;
        Ok(())
    }

    /// Flush buffers and force the data to disk.
    pub fn sync(&mut self) -> Result<(), PcesError> {
        self.file.flush()?;
        self.file.get_ref().sync_data()?;
        Ok(())
    }

    /// Write the footer, sync and close. Returns the path.
    pub fn finish(mut self) -> Result<PathBuf, PcesError> {
        self.file.write_all(&FOOTER_SENTINEL.to_be_bytes())?;
        self.file.write_all(&self.record_count.to_be_bytes())?;
        self.file.write_all(&self.max_ancient_id.to_be_bytes())?;
        self.file
            .write_all(&footer_crc(self.record_count, self.max_ancient_id).to_be_bytes())?;
        self.sync()?;
        Ok(self.path)
    }
}

/// One record read back from a segment.
#[derive(Debug)]
pub enum SegmentRecord {
    Event { event: GossipEvent, sequence: u64 },
    Discontinuity { next_sequence: u64 },
}

/// Reads a segment file, tolerating a truncated tail.
pub struct SegmentReader {
    file: BufReader<File>,
    path: PathBuf,
    header: SegmentHeader,
    finished: bool,
}

impl SegmentReader {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PcesError> {
        let path = path.into();
        let mut file = BufReader::new(File::open(&path)?);

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(PcesError::BadMagic);
        }
        let version = read_u32(&mut file)?;
        if version != FORMAT_VERSION {
            return Err(PcesError::BadVersion(version));
        }
        let first_sequence = read_u64(&mut file)?;
        let min_ancient_id = read_u64(&mut file)?;
        let mut mode = [0u8; 1];
        file.read_exact(&mut mode)?;
        let ancient_mode = mode_from_byte(mode[0])?;

        Ok(Self {
            file,
            path,
            header: SegmentHeader {
                first_sequence,
                min_ancient_id,
                ancient_mode,
            },
            finished: false,
        })
    }

    pub fn header(&self) -> SegmentHeader {
        self.header
    }

    /// Read the next record. `Ok(None)` at the footer, at end of file, and
    /// at the first sign of a truncated or corrupt tail.
    pub fn next_record(&mut self) -> Result<Option<SegmentRecord>, PcesError> {
        if self.finished {
            return Ok(None);
        }

        let len = match try_read_u32(&mut self.file)? {
            Some(len) => len,
            None => {
                // Unclean end without a footer: a crash mid-write.
                warn!(path = %self.path.display(), "segment ends without footer");
                self.finished = true;
                return Ok(None);
            }
        };

        if len == FOOTER_SENTINEL {
            self.finished = true;
            match self.read_footer() {
                Ok(()) => {}
                Err(err) => {
                    warn!(path = %self.path.display(), %err, "truncated or corrupt footer");
                }
            }
            return Ok(None);
        }

        let mut bytes = vec![0u8; len as usize];
        let tail_read = self
            .file
            .read_exact(&mut bytes)
            .and_then(|_| {
                let mut seq = [0u8; 8];
                self.file.read_exact(&mut seq)?;
                let mut crc = [0u8; 4];
                self.file.read_exact(&mut crc)?;
                Ok((u64::from_be_bytes(seq), u32::from_be_bytes(crc)))
            });
        let (sequence, crc) = match tail_read {
            Ok(parts) => parts,
            Err(_) => {
                warn!(path = %self.path.display(), "truncated final record");
                self.finished = true;
                return Ok(None);
            }
        };

        if record_crc(&bytes, sequence) != crc {
            warn!(path = %self.path.display(), sequence, "record CRC mismatch; stopping");
            self.finished = true;
            return Ok(None);
        }

        if len == 0 {
            return Ok(Some(SegmentRecord::Discontinuity {
                next_sequence: sequence,
            }));
        }

        let event: GossipEvent = braid_types::decode_whole(&bytes)?;
        Ok(Some(SegmentRecord::Event { event, sequence }))
    }

    fn read_footer(&mut self) -> Result<(), PcesError> {
        let record_count = read_u64(&mut self.file)?;
        let max_ancient_id = read_u64(&mut self.file)?;
        let crc = read_u32(&mut self.file)?;
        if footer_crc(record_count, max_ancient_id) != crc {
            warn!(path = %self.path.display(), "footer CRC mismatch");
        }
        Ok(())
    }
}

fn read_u32(reader: &mut impl Read) -> Result<u32, PcesError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_u64(reader: &mut impl Read) -> Result<u64, PcesError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

/// Read a u32, or `None` at a clean or truncated end of file.
fn try_read_u32(reader: &mut impl Read) -> Result<Option<u32>, PcesError> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok(None),
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Some(u32::from_be_bytes(buf)))
}
