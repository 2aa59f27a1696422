//! An in-memory [`CensusTree`] standing in for the sparse Merkle/IMT tree
//! (spec §1 Out of scope, §3 `ProcessState`). The real tree's membership
//! proofs are opaque bytes behind the trait; this mock only needs a root that
//! advances deterministically whenever a vote is recorded.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use sequencer_interface::model::CensusProof;
use sequencer_interface::traits::CensusTree;
use sequencer_interface::{Address, SequencerError};

type Result<T> = std::result::Result<T, SequencerError>;

/// A toy census tree: a sorted map of address to weight, with the root
/// computed as a hash over the sorted entries so it changes deterministically
/// on every insert or overwrite.
pub struct InMemoryCensusTree {
    entries: BTreeMap<Address, u64>,
    max_voters: u32,
}

impl InMemoryCensusTree {
    /// Creates an empty tree accepting at most `max_voters` distinct addresses.
    pub fn new(max_voters: u32) -> Self {
        Self {
            entries: BTreeMap::new(),
            max_voters,
        }
    }
}

impl CensusTree for InMemoryCensusTree {
    fn root(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for (address, weight) in &self.entries {
            hasher.update(address.as_bytes());
            hasher.update(weight.to_be_bytes());
        }
        hasher.finalize().into()
    }

    fn membership_proof(&self, address: Address) -> Result<CensusProof> {
        let weight = self
            .entries
            .get(&address)
            .ok_or(SequencerError::NotFound)?;
        let mut bytes = Vec::with_capacity(40);
        bytes.extend_from_slice(address.as_bytes());
        bytes.extend_from_slice(&weight.to_be_bytes());
        Ok(CensusProof {
            bytes,
            is_dummy: false,
        })
    }

    fn dummy_proof(&self) -> CensusProof {
        CensusProof {
            bytes: vec![0u8; 40],
            is_dummy: true,
        }
    }

    fn contains(&self, address: Address) -> bool {
        self.entries.contains_key(&address)
    }

    fn add_vote(&mut self, address: Address, weight: u64) -> Result<()> {
        if !self.entries.contains_key(&address) && self.entries.len() >= self.max_voters as usize
        {
            return Err(SequencerError::CensusCapExceeded);
        }
        self.entries.insert(address, weight);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_advances_when_a_vote_is_recorded() {
        let mut tree = InMemoryCensusTree::new(8);
        let root_before = tree.root();
        tree.add_vote(Address::from([1u8; 32]), 1).unwrap();
        assert_ne!(tree.root(), root_before);
    }

    #[test]
    fn rejects_a_new_address_once_the_cap_is_reached() {
        let mut tree = InMemoryCensusTree::new(1);
        tree.add_vote(Address::from([1u8; 32]), 1).unwrap();
        let err = tree.add_vote(Address::from([2u8; 32]), 1).unwrap_err();
        assert!(matches!(err, SequencerError::CensusCapExceeded));
    }

    #[test]
    fn allows_an_overwrite_once_the_cap_is_reached() {
        let mut tree = InMemoryCensusTree::new(1);
        tree.add_vote(Address::from([1u8; 32]), 1).unwrap();
        tree.add_vote(Address::from([1u8; 32]), 2).unwrap();
        assert_eq!(tree.entries.get(&Address::from([1u8; 32])), Some(&2));
    }
}
