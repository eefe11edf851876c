//! Core types for the Braid consensus event-intake pipeline.
//!
//! This crate provides the foundational data model shared by every stage of
//! the pipeline:
//!
//! - [`Hash`]: blake3 content hash, the identity of an event once hashed
//! - [`GossipEvent`] / [`LinkedEvent`]: the event model
//! - [`AddressBook`]: node identities, keys and voting weight
//! - [`EventWindow`]: the non-ancient event window
//! - [`ConsensusRound`]: the immutable output of the consensus engine
//! - [`Signer`]: the signing capability used by event creation
//!
//! Events are immutable after hashing and shared across stages as
//! `Arc<GossipEvent>`. No stage may mutate an event once its hash is set.

mod address_book;
mod codec;
mod event;
mod hash;
mod round;
mod signing;
mod window;

pub use address_book::{is_supermajority, AddressBook, AddressBookEntry};
pub use codec::{decode_whole, encode, CodecError, WIRE_CONFIG};
pub use event::{EventCore, EventDescriptor, GossipEvent, LinkedEvent, Timestamp, Transaction};
pub use hash::Hash;
pub use round::{ConsensusEvent, ConsensusRound, ConsensusSnapshot};
pub use signing::{
    event_signing_message, verify_event_signature, Ed25519Signer, EventSignature, PublicKey,
    Signer, DOMAIN_EVENT,
};
pub use window::{AncientMode, EventWindow};

use std::fmt;

/// Identifier of a node in the address book.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    std::hash::Hash,
    bincode::Encode,
    bincode::Decode,
)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
