//! The address book: node identities, keys and voting weight.

use crate::{NodeId, PublicKey};
use std::collections::BTreeMap;

/// One node's entry in the address book.
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct AddressBookEntry {
    pub node_id: NodeId,
    pub public_key: PublicKey,
    pub weight: u64,
    pub active: bool,
}

/// Versioned mapping from node identifier to key and voting weight.
///
/// Read by the signature validator and the event creation manager; replaced
/// wholesale between consensus rounds. The `effective_round` says from which
/// round onward the book applies: upstream orders a book update ahead of the
/// first event signed under it.
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct AddressBook {
    effective_round: u64,
    entries: BTreeMap<NodeId, AddressBookEntry>,
    total_weight: u64,
}

impl AddressBook {
    pub fn new(effective_round: u64, entries: Vec<AddressBookEntry>) -> Self {
        let total_weight = entries.iter().map(|e| e.weight).sum();
        Self {
            effective_round,
            entries: entries.into_iter().map(|e| (e.node_id, e)).collect(),
            total_weight,
        }
    }

    pub fn effective_round(&self) -> u64 {
        self.effective_round
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.entries.contains_key(&node_id)
    }

    pub fn entry(&self, node_id: NodeId) -> Option<&AddressBookEntry> {
        self.entries.get(&node_id)
    }

    /// Public key of an active node; `None` for unknown or inactive nodes.
    pub fn public_key(&self, node_id: NodeId) -> Option<&PublicKey> {
        self.entries
            .get(&node_id)
            .filter(|e| e.active)
            .map(|e| &e.public_key)
    }

    pub fn weight(&self, node_id: NodeId) -> u64 {
        self.entries.get(&node_id).map(|e| e.weight).unwrap_or(0)
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Node ids in deterministic (ascending) order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.keys().copied()
    }

    /// Whether `part` is a strict >2/3 supermajority of the total weight.
    pub fn is_supermajority(&self, part: u64) -> bool {
        is_supermajority(part, self.total_weight)
    }

    /// Whether `part` is a strict majority (>1/2) of the total weight.
    pub fn is_majority(&self, part: u64) -> bool {
        2 * u128::from(part) > u128::from(self.total_weight)
    }
}

/// Strict >2/3 supermajority test, overflow-safe.
pub fn is_supermajority(part: u64, total: u64) -> bool {
    3 * u128::from(part) > 2 * u128::from(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(weights: &[u64]) -> AddressBook {
        AddressBook::new(
            0,
            weights
                .iter()
                .enumerate()
                .map(|(i, &w)| AddressBookEntry {
                    node_id: NodeId(i as u64),
                    public_key: PublicKey([0u8; 32]),
                    weight: w,
                    active: true,
                })
                .collect(),
        )
    }

    #[test]
    fn test_supermajority_threshold() {
        let book = book(&[1, 1, 1, 1]);
        assert!(!book.is_supermajority(2));
        // 3 of 4 is > 2/3
        assert!(book.is_supermajority(3));
        assert!(!is_supermajority(2, 3));
        assert!(is_supermajority(3, 4));
        assert!(!is_supermajority(4, 6));
        assert!(is_supermajority(5, 6));
    }

    #[test]
    fn test_inactive_nodes_have_no_key() {
        let mut entries: Vec<_> = (0..2)
            .map(|i| AddressBookEntry {
                node_id: NodeId(i),
                public_key: PublicKey([0u8; 32]),
                weight: 1,
                active: true,
            })
            .collect();
        entries[1].active = false;
        let book = AddressBook::new(3, entries);
        assert!(book.public_key(NodeId(0)).is_some());
        assert!(book.public_key(NodeId(1)).is_none());
        assert_eq!(book.effective_round(), 3);
    }
}
