//! An in-memory [`ProcessTreeStore`] holding the per-process [`ProcessState`]
//! snapshot and its backing [`InMemoryCensusTree`] (spec §1 Out of scope:
//! "all persistence backends below the queue interface"; spec §3
//! `ProcessState`). The State-Transition Worker is the tree's single writer
//! (spec §5); each method locks only the one process's `DashMap` shard for
//! its duration.

use dashmap::DashMap;

use sequencer_interface::model::{CensusProof, ProcessState};
use sequencer_interface::traits::{CensusTree, ProcessStateLookup, ProcessTreeStore};
use sequencer_interface::{Address, ProcessId, SequencerError};

use crate::census::InMemoryCensusTree;

type Result<T> = std::result::Result<T, SequencerError>;

/// Holds one [`ProcessState`] snapshot and one [`InMemoryCensusTree`] per
/// registered process.
#[derive(Default)]
pub struct InMemoryProcessStateStore {
    states: DashMap<ProcessId, ProcessState>,
    trees: DashMap<ProcessId, InMemoryCensusTree>,
}

impl InMemoryProcessStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a process at genesis: an empty tree and a zeroed state,
    /// accepting votes up to `max_voters` distinct addresses.
    pub fn register(&self, process_id: ProcessId, max_voters: u32) {
        let tree = InMemoryCensusTree::new(max_voters);
        let state = ProcessState {
            process_id,
            root: tree.root(),
            voters_count: 0,
            additions_accumulator: vec![[0u8; 32]; 1],
            subtractions_accumulator: vec![[0u8; 32]; 1],
            max_voters,
            accepting_votes: true,
        };
        self.trees.insert(process_id, tree);
        self.states.insert(process_id, state);
    }

    /// Returns the current state snapshot, if the process is registered.
    pub fn get_state(&self, process_id: ProcessId) -> Option<ProcessState> {
        self.states.get(&process_id).map(|s| s.clone())
    }
}

impl ProcessStateLookup for InMemoryProcessStateStore {
    fn get(&self, process_id: ProcessId) -> Option<ProcessState> {
        self.get_state(process_id)
    }
}

impl ProcessTreeStore for InMemoryProcessStateStore {
    fn set_state(&self, process_id: ProcessId, state: ProcessState) {
        self.states.insert(process_id, state);
    }

    fn root(&self, process_id: ProcessId) -> Option<[u8; 32]> {
        self.trees.get(&process_id).map(|tree| tree.root())
    }

    fn contains(&self, process_id: ProcessId, address: Address) -> bool {
        self.trees
            .get(&process_id)
            .is_some_and(|tree| tree.contains(address))
    }

    fn membership_proof(&self, process_id: ProcessId, address: Address) -> Result<CensusProof> {
        self.trees
            .get(&process_id)
            .ok_or(SequencerError::NotFound)?
            .membership_proof(address)
    }

    fn dummy_proof(&self, process_id: ProcessId) -> Option<CensusProof> {
        self.trees.get(&process_id).map(|tree| tree.dummy_proof())
    }

    fn add_vote(&self, process_id: ProcessId, address: Address, weight: u64) -> Result<()> {
        self.trees
            .get_mut(&process_id)
            .ok_or(SequencerError::NotFound)?
            .add_vote(address, weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_seeds_an_accepting_genesis_state() {
        let store = InMemoryProcessStateStore::new();
        let pid = ProcessId::from([1u8; 32]);
        store.register(pid, 8);
        let state = store.get_state(pid).unwrap();
        assert!(state.accepting_votes);
        assert_eq!(state.voters_count, 0);
    }

    #[test]
    fn add_vote_advances_the_root() {
        let store = InMemoryProcessStateStore::new();
        let pid = ProcessId::from([1u8; 32]);
        store.register(pid, 8);
        let root_before = store.root(pid).unwrap();
        store.add_vote(pid, Address::from([2u8; 32]), 1).unwrap();
        assert_ne!(store.root(pid).unwrap(), root_before);
    }

    #[test]
    fn unregistered_process_has_no_tree_operations() {
        let store = InMemoryProcessStateStore::new();
        let pid = ProcessId::from([9u8; 32]);
        assert!(store.root(pid).is_none());
        assert!(store.add_vote(pid, Address::from([1u8; 32]), 1).is_err());
    }
}
