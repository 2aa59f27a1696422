//! In-memory stand-ins for the chain, census tree, and ballot cipher (spec §1
//! Out of scope): [`MockOnChainClient`] models the settlement chain (§4.7),
//! [`InMemoryCensusTree`] and [`InMemoryProcessStateStore`] the sparse
//! Merkle/IMT tree and its per-process state (§3), and [`MockBallotCipher`]
//! the ElGamal-over-Baby-Jubjub re-encryption scheme (§4.6).

mod census;
mod cipher;
mod on_chain;
mod state_store;

pub use census::InMemoryCensusTree;
pub use cipher::MockBallotCipher;
pub use on_chain::MockOnChainClient;
pub use state_store::InMemoryProcessStateStore;
