//! The event model.
//!
//! An event moves through three representations as it crosses the pipeline:
//!
//! 1. [`GossipEvent`] fresh off the wire: hashed contents plus signature,
//!    hash not yet computed.
//! 2. The same `GossipEvent` behind an `Arc` once the hasher has stamped its
//!    hash. From this point the event is immutable and shared; the PCES
//!    sequencer later stamps the stream sequence number through a write-once
//!    cell.
//! 3. [`LinkedEvent`]: the event plus resolved references to its parents,
//!    produced by the in-order linker for the consensus engine and the
//!    shadowgraph.

use crate::{AncientMode, Hash, NodeId};
use crate::signing::EventSignature;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Opaque application payload carried by an event.
pub type Transaction = Vec<u8>;

/// A point in time with nanosecond resolution.
///
/// `time_created` is assigned by the event's creator and must strictly
/// increase along the creator's self-parent chain. Consensus timestamps are
/// derived from these values.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    bincode::Encode,
    bincode::Decode,
)]
pub struct Timestamp {
    pub secs: i64,
    pub nanos: u32,
}

impl Timestamp {
    pub const UNIX_EPOCH: Self = Self { secs: 0, nanos: 0 };

    pub fn new(secs: i64, nanos: u32) -> Self {
        debug_assert!(nanos < 1_000_000_000);
        Self { secs, nanos }
    }

    /// Total nanoseconds since the unix epoch.
    pub fn as_nanos(&self) -> i128 {
        self.secs as i128 * 1_000_000_000 + self.nanos as i128
    }

    /// Construct from total nanoseconds since the unix epoch.
    pub fn from_nanos(nanos: i128) -> Self {
        Self {
            secs: (nanos.div_euclid(1_000_000_000)) as i64,
            nanos: (nanos.rem_euclid(1_000_000_000)) as u32,
        }
    }

    /// This timestamp advanced by `nanos` nanoseconds.
    pub fn plus_nanos(self, nanos: u64) -> Self {
        Self::from_nanos(self.as_nanos() + nanos as i128)
    }
}

/// A compact reference to a parent event.
///
/// Descriptors travel inside the child event's hashed contents, so a parent
/// is identified before it is necessarily known in memory.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, bincode::Encode, bincode::Decode,
)]
pub struct EventDescriptor {
    pub hash: Hash,
    pub creator: NodeId,
    pub generation: u64,
    pub birth_round: u64,
}

impl EventDescriptor {
    /// The identifier compared against the window's ancient threshold.
    pub fn ancient_identifier(&self, mode: AncientMode) -> u64 {
        match mode {
            AncientMode::Generation => self.generation,
            AncientMode::BirthRound => self.birth_round,
        }
    }
}

/// The hashed contents of an event.
///
/// Everything the event hash covers. The generation is not stored: it is
/// defined as `1 + max(parent generations)` (0 without parents) and computed
/// from the parent descriptors, so it can never disagree with them.
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct EventCore {
    pub creator: NodeId,
    pub self_parent: Option<EventDescriptor>,
    pub other_parent: Option<EventDescriptor>,
    pub birth_round: u64,
    pub time_created: Timestamp,
    pub transactions: Vec<Transaction>,
}

impl EventCore {
    /// Generation derived from the parent descriptors.
    pub fn generation(&self) -> u64 {
        let sp = self.self_parent.as_ref().map(|p| p.generation);
        let op = self.other_parent.as_ref().map(|p| p.generation);
        match sp.into_iter().chain(op).max() {
            Some(g) => g + 1,
            None => 0,
        }
    }

    /// Total payload size in bytes.
    pub fn transaction_bytes(&self) -> usize {
        self.transactions.iter().map(Vec::len).sum()
    }
}

/// An event as received from gossip or read back from the PCES.
///
/// Immutable after hashing. The hash and the PCES stream sequence number are
/// stamped exactly once through write-once cells; everything else is fixed at
/// construction.
#[derive(Clone)]
pub struct GossipEvent {
    core: EventCore,
    signature: EventSignature,
    hash: OnceLock<Hash>,
    stream_sequence: OnceLock<u64>,
}

impl GossipEvent {
    pub fn new(core: EventCore, signature: EventSignature) -> Self {
        Self {
            core,
            signature,
            hash: OnceLock::new(),
            stream_sequence: OnceLock::new(),
        }
    }

    pub fn core(&self) -> &EventCore {
        &self.core
    }

    pub fn creator(&self) -> NodeId {
        self.core.creator
    }

    pub fn generation(&self) -> u64 {
        self.core.generation()
    }

    pub fn birth_round(&self) -> u64 {
        self.core.birth_round
    }

    pub fn time_created(&self) -> Timestamp {
        self.core.time_created
    }

    pub fn self_parent(&self) -> Option<&EventDescriptor> {
        self.core.self_parent.as_ref()
    }

    pub fn other_parent(&self) -> Option<&EventDescriptor> {
        self.core.other_parent.as_ref()
    }

    /// Both parent descriptors, self parent first.
    pub fn parents(&self) -> impl Iterator<Item = &EventDescriptor> {
        self.core
            .self_parent
            .iter()
            .chain(self.core.other_parent.iter())
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.core.transactions
    }

    pub fn signature(&self) -> &EventSignature {
        &self.signature
    }

    /// Stamp the hash. May be called once; the hasher is the only caller.
    pub fn set_hash(&self, hash: Hash) {
        self.hash
            .set(hash)
            .expect("event hash stamped more than once");
    }

    /// Whether the hasher has stamped this event yet.
    pub fn is_hashed(&self) -> bool {
        self.hash.get().is_some()
    }

    /// The event's identity.
    ///
    /// # Panics
    ///
    /// Panics if called before the hasher stamped the event.
    pub fn hash(&self) -> Hash {
        *self
            .hash
            .get()
            .expect("event hash read before the hasher stamped it")
    }

    /// Stamp the PCES stream sequence number. May be called once; the PCES
    /// sequencer is the only caller.
    pub fn set_stream_sequence(&self, sequence: u64) {
        self.stream_sequence
            .set(sequence)
            .expect("stream sequence stamped more than once");
    }

    /// The PCES stream sequence number.
    ///
    /// # Panics
    ///
    /// Panics if called before the sequencer stamped the event.
    pub fn stream_sequence(&self) -> u64 {
        *self
            .stream_sequence
            .get()
            .expect("stream sequence read before the sequencer stamped it")
    }

    /// Descriptor for use as a parent reference in child events.
    pub fn descriptor(&self) -> EventDescriptor {
        EventDescriptor {
            hash: self.hash(),
            creator: self.creator(),
            generation: self.generation(),
            birth_round: self.birth_round(),
        }
    }

    /// The identifier compared against the window's ancient threshold.
    pub fn ancient_identifier(&self, mode: AncientMode) -> u64 {
        match mode {
            AncientMode::Generation => self.generation(),
            AncientMode::BirthRound => self.birth_round(),
        }
    }
}

impl fmt::Debug for GossipEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("GossipEvent");
        s.field("creator", &self.core.creator)
            .field("generation", &self.generation())
            .field("birth_round", &self.core.birth_round);
        if let Some(hash) = self.hash.get() {
            s.field("hash", hash);
        }
        s.finish()
    }
}

// The wire encoding covers the hashed contents and the signature; the hash
// is recomputed by the hasher on every ingest path, including replay.
impl bincode::Encode for GossipEvent {
    fn encode<E: bincode::enc::Encoder>(
        &self,
        encoder: &mut E,
    ) -> Result<(), bincode::error::EncodeError> {
        bincode::Encode::encode(&self.core, encoder)?;
        bincode::Encode::encode(&self.signature, encoder)
    }
}

impl<Context> bincode::Decode<Context> for GossipEvent {
    fn decode<D: bincode::de::Decoder<Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, bincode::error::DecodeError> {
        let core = <EventCore as bincode::Decode<Context>>::decode(decoder)?;
        let signature = <EventSignature as bincode::Decode<Context>>::decode(decoder)?;
        Ok(Self::new(core, signature))
    }
}

/// An event whose parents have been resolved to in-memory references.
///
/// Only produced for non-ancient events; a `None` parent means the parent is
/// ancient or was never declared.
#[derive(Debug, Clone)]
pub struct LinkedEvent {
    pub event: Arc<GossipEvent>,
    pub self_parent: Option<Arc<GossipEvent>>,
    pub other_parent: Option<Arc<GossipEvent>>,
}

impl LinkedEvent {
    pub fn hash(&self) -> Hash {
        self.event.hash()
    }

    pub fn creator(&self) -> NodeId {
        self.event.creator()
    }

    pub fn generation(&self) -> u64 {
        self.event.generation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(generation: u64) -> EventDescriptor {
        EventDescriptor {
            hash: Hash::from_bytes(&generation.to_be_bytes()),
            creator: NodeId(0),
            generation,
            birth_round: 0,
        }
    }

    fn core_with_parents(
        self_parent: Option<EventDescriptor>,
        other_parent: Option<EventDescriptor>,
    ) -> EventCore {
        EventCore {
            creator: NodeId(1),
            self_parent,
            other_parent,
            birth_round: 0,
            time_created: Timestamp::UNIX_EPOCH,
            transactions: vec![],
        }
    }

    #[test]
    fn test_generation_without_parents() {
        assert_eq!(core_with_parents(None, None).generation(), 0);
    }

    #[test]
    fn test_generation_is_max_parent_plus_one() {
        let core = core_with_parents(Some(descriptor(4)), Some(descriptor(9)));
        assert_eq!(core.generation(), 10);
        let core = core_with_parents(Some(descriptor(4)), None);
        assert_eq!(core.generation(), 5);
    }

    #[test]
    fn test_hash_stamped_once() {
        let event = GossipEvent::new(core_with_parents(None, None), EventSignature::zero());
        assert!(!event.is_hashed());
        event.set_hash(Hash::from_bytes(b"x"));
        assert!(event.is_hashed());
        assert_eq!(event.hash(), Hash::from_bytes(b"x"));
    }

    #[test]
    #[should_panic(expected = "stamped more than once")]
    fn test_double_hash_panics() {
        let event = GossipEvent::new(core_with_parents(None, None), EventSignature::zero());
        event.set_hash(Hash::from_bytes(b"x"));
        event.set_hash(Hash::from_bytes(b"y"));
    }

    #[test]
    fn test_wire_roundtrip_preserves_contents() {
        let core = core_with_parents(Some(descriptor(3)), None);
        let event = GossipEvent::new(core.clone(), EventSignature::zero());
        let bytes = crate::encode(&event).unwrap();
        let decoded: GossipEvent = crate::decode_whole(&bytes).unwrap();
        assert_eq!(decoded.core(), &core);
        assert!(!decoded.is_hashed());
    }

    #[test]
    fn test_timestamp_ordering_and_arithmetic() {
        let a = Timestamp::new(10, 999_999_999);
        let b = a.plus_nanos(1);
        assert_eq!(b, Timestamp::new(11, 0));
        assert!(a < b);
    }
}
