//! Event signature validation against the address book.

use braid_types::{verify_event_signature, AddressBook, GossipEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Verifies event signatures under the creator's key from the active
/// address book.
///
/// Address book updates arrive on a separate input and replace the book
/// wholesale. Upstream is responsible for ordering a book update ahead of
/// the first event signed under it.
pub struct EventSignatureValidator {
    book: AddressBook,
    dropped: AtomicU64,
}

impl EventSignatureValidator {
    pub fn new(book: AddressBook) -> Self {
        Self {
            book,
            dropped: AtomicU64::new(0),
        }
    }

    /// Verify one event. Returns `None` when the event is dropped.
    pub fn validate(&mut self, event: Arc<GossipEvent>) -> Option<Arc<GossipEvent>> {
        let Some(public_key) = self.book.public_key(event.creator()) else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(
                creator = %event.creator(),
                "dropped event from unknown or inactive creator"
            );
            return None;
        };
        if !verify_event_signature(public_key, &event.hash(), event.signature()) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(
                creator = %event.creator(),
                hash = %event.hash(),
                "dropped event with invalid signature"
            );
            return None;
        }
        Some(event)
    }

    /// Install a new address book.
    ///
    /// Must be applied before any event signed under the new book is
    /// processed; stale books are ignored.
    pub fn update_address_book(&mut self, book: AddressBook) {
        if book.effective_round() < self.book.effective_round() {
            warn!(
                effective_round = book.effective_round(),
                current = self.book.effective_round(),
                "ignoring stale address book update"
            );
            return;
        }
        info!(
            effective_round = book.effective_round(),
            nodes = book.len(),
            "address book updated"
        );
        self.book = book;
    }

    pub fn address_book(&self) -> &AddressBook {
        &self.book
    }

    /// Number of events dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_types::{
        event_signing_message, AddressBookEntry, Ed25519Signer, EventCore, EventSignature,
        GossipEvent, Hash, NodeId, Signer, Timestamp,
    };

    fn signed_event(creator: u64, signer: &dyn Signer) -> Arc<GossipEvent> {
        let core = EventCore {
            creator: NodeId(creator),
            self_parent: None,
            other_parent: None,
            birth_round: 0,
            time_created: Timestamp::UNIX_EPOCH,
            transactions: vec![],
        };
        let bytes = braid_types::encode(&core).unwrap();
        let hash = Hash::from_bytes(&bytes);
        let signature = signer.sign(&event_signing_message(&hash));
        let event = GossipEvent::new(core, signature);
        event.set_hash(hash);
        Arc::new(event)
    }

    fn book_with(signers: &[(u64, &Ed25519Signer)]) -> AddressBook {
        AddressBook::new(
            0,
            signers
                .iter()
                .map(|(id, signer)| AddressBookEntry {
                    node_id: NodeId(*id),
                    public_key: signer.public_key(),
                    weight: 1,
                    active: true,
                })
                .collect(),
        )
    }

    #[test]
    fn test_valid_signature_passes() {
        let signer = Ed25519Signer::from_seed(&[1u8; 32]);
        let mut v = EventSignatureValidator::new(book_with(&[(1, &signer)]));
        assert!(v.validate(signed_event(1, &signer)).is_some());
        assert_eq!(v.dropped(), 0);
    }

    #[test]
    fn test_wrong_signer_dropped() {
        let signer = Ed25519Signer::from_seed(&[1u8; 32]);
        let impostor = Ed25519Signer::from_seed(&[2u8; 32]);
        let mut v = EventSignatureValidator::new(book_with(&[(1, &signer)]));
        assert!(v.validate(signed_event(1, &impostor)).is_none());
        assert_eq!(v.dropped(), 1);
    }

    #[test]
    fn test_unknown_creator_dropped() {
        let signer = Ed25519Signer::from_seed(&[1u8; 32]);
        let mut v = EventSignatureValidator::new(book_with(&[(1, &signer)]));
        assert!(v.validate(signed_event(9, &signer)).is_none());
    }

    #[test]
    fn test_book_update_applies_before_new_epoch_events() {
        let old_signer = Ed25519Signer::from_seed(&[1u8; 32]);
        let new_signer = Ed25519Signer::from_seed(&[3u8; 32]);
        let mut v = EventSignatureValidator::new(book_with(&[(1, &old_signer)]));

        // An event signed under the new book fails under the old one.
        assert!(v.validate(signed_event(1, &new_signer)).is_none());

        let new_book = AddressBook::new(
            5,
            vec![AddressBookEntry {
                node_id: NodeId(1),
                public_key: new_signer.public_key(),
                weight: 1,
                active: true,
            }],
        );
        v.update_address_book(new_book);
        assert!(v.validate(signed_event(1, &new_signer)).is_some());

        // A stale book must not roll the validator back.
        v.update_address_book(book_with(&[(1, &old_signer)]));
        assert_eq!(v.address_book().effective_round(), 5);
    }
}
