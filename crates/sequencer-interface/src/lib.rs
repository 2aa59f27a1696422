//! Domain types and trait contracts shared by every crate in the sequencer.
//!
//! This crate is deliberately free of any concrete storage, proving, or
//! networking dependency: it only defines what a queue store, a circuit
//! backend, a census tree, a ballot cipher, and an on-chain client must do,
//! plus the data that flows between the workers that depend on them.

pub mod common;
pub mod error;
pub mod ids;
pub mod model;
pub mod status;
pub mod traits;

pub use error::SequencerError;
pub use ids::{Address, ProcessId, VoteId};
pub use model::{
    AggregatorBatch, Ballot, PendingTxKind, ProcessState, Reservation, StateTransitionBatch,
    VerifiedBallot, VerifiedResults,
};
pub use status::VoteIdStatus;
pub use traits::{
    BallotCipher, CensusTree, CircuitBackend, OnChainClient, ProcessStateLookup, ProcessTreeStore,
    QueueStore,
};
