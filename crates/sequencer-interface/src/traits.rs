//! The external contracts (spec §6) behind which the out-of-scope
//! collaborators are modeled: the persistent queue store, the vote-id
//! tracker, the Groth16 circuits, the census tree, the ballot cipher, and the
//! on-chain client. Concrete crates implement these; workers only ever see
//! the trait objects.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::ids::{Address, ProcessId, VoteId};
use crate::model::{
    AggregatorBatch, Ballot, CensusProof, EncryptedBallot, PendingTxKind, ProcessState,
    RecursiveProof, StateTransitionBatch, VerifiedBallot, VerifiedResults, WitnessedProof,
};
use crate::status::VoteIdStatus;

/// A synchronous lookup of the per-process public state, shared by the
/// worker-mode HTTP protocol (spec §6 `GET /processes/{process-id-hex}`) and
/// the State-Transition Worker.
pub trait ProcessStateLookup: Send + Sync {
    /// Returns the process's current public state, if registered.
    fn get(&self, process_id: ProcessId) -> Option<ProcessState>;
}

/// The durable home of the per-process [`ProcessState`] snapshot and its
/// backing census tree (spec §3 `ProcessState`; spec §1 Out of scope: "all
/// persistence backends below the queue interface"). Flattens
/// [`CensusTree`]'s per-process methods onto a process-id-keyed store so the
/// State-Transition Worker never has to hold the tree across an `.await`
/// point; every method here is synchronous and internally serialized per
/// process (spec §5 "single-writer").
pub trait ProcessTreeStore: ProcessStateLookup {
    /// Overwrites the state snapshot, e.g. after a batch has been applied.
    fn set_state(&self, process_id: ProcessId, state: ProcessState);

    /// The process's current census tree root.
    fn root(&self, process_id: ProcessId) -> Option<[u8; 32]>;

    /// Whether `address` already has a recorded ballot.
    fn contains(&self, process_id: ProcessId, address: Address) -> bool;

    /// A membership proof for `address`, or [`crate::SequencerError::NotFound`].
    fn membership_proof(&self, process_id: ProcessId, address: Address) -> Result<CensusProof>;

    /// A deterministic dummy proof of the same shape, for unused batch slots.
    fn dummy_proof(&self, process_id: ProcessId) -> Option<CensusProof>;

    /// Records or overwrites `address`'s weighted ballot, advancing the root.
    fn add_vote(&self, process_id: ProcessId, address: Address, weight: u64) -> Result<()>;
}

/// A queue item paired with the opaque storage key under which it was
/// reserved (spec §6: "accepting and returning opaque byte-slice keys").
#[derive(Clone, Debug)]
pub struct Reserved<T> {
    /// The storage key, to be passed back to `release`/`mark_done`/`mark_failed`.
    pub key: Vec<u8>,
    /// The reserved item.
    pub item: T,
}

/// The durable, crash-safe queue store (spec §4.1, §6).
///
/// All operations are internally atomic. Reservations survive process
/// restarts: a crashed worker's items remain reserved until an operator
/// explicitly releases them.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Appends a ballot to the `pending` queue. Fails with
    /// [`crate::SequencerError::DuplicateVoteId`] if a Pending ballot with
    /// the same vote-id already exists.
    async fn push_pending(&self, ballot: Ballot) -> Result<Vec<u8>>;

    /// Atomically reserves and returns the oldest unreserved pending ballot.
    /// Returns [`crate::SequencerError::NoMoreElements`] when empty.
    async fn next_unreserved_pending(&self, holder: [u8; 16]) -> Result<Reserved<Ballot>>;

    /// Appends a verified ballot to the `verified` queue.
    async fn push_verified(&self, ballot: VerifiedBallot) -> Result<Vec<u8>>;

    /// Returns up to `max_n` verified ballots for `process_id`, each
    /// reserved, at most one per voter address (the oldest wins). Fails with
    /// [`crate::SequencerError::NotFound`] if none are available.
    async fn pull_verified(
        &self,
        process_id: ProcessId,
        max_n: usize,
        holder: [u8; 16],
    ) -> Result<Vec<Reserved<VerifiedBallot>>>;

    /// Appends a finished aggregator batch to the `aggregator` queue.
    async fn push_aggregator_batch(&self, batch: AggregatorBatch) -> Result<Vec<u8>>;

    /// Reserves and returns the next aggregator batch for `process_id`.
    async fn next_aggregator_batch(
        &self,
        process_id: ProcessId,
        holder: [u8; 16],
    ) -> Result<Reserved<AggregatorBatch>>;

    /// Appends a finished state-transition batch to the `state-transition` queue.
    async fn push_state_transition(&self, batch: StateTransitionBatch) -> Result<Vec<u8>>;

    /// Reserves and returns the next state-transition batch for `process_id`.
    async fn next_state_transition_batch(
        &self,
        process_id: ProcessId,
        holder: [u8; 16],
    ) -> Result<Reserved<StateTransitionBatch>>;

    /// Appends finalized results to the `verified-results` queue.
    async fn push_verified_results(&self, results: VerifiedResults) -> Result<Vec<u8>>;

    /// Reserves and returns the next item from the `verified-results` queue.
    async fn next_verified_results(&self, holder: [u8; 16]) -> Result<Reserved<VerifiedResults>>;

    /// Drops reservations for `keys` without removing the underlying items
    /// (used for retryable failures).
    async fn release(&self, keys: &[Vec<u8>]) -> Result<()>;

    /// Removes the items at `keys` and their reservations, atomically.
    async fn mark_done(&self, keys: &[Vec<u8>]) -> Result<()>;

    /// Removes the items at `keys` and their reservations, and transitions
    /// their vote-ids to [`VoteIdStatus::Error`].
    async fn mark_failed(&self, keys: &[Vec<u8>], vote_ids: &[VoteId]) -> Result<()>;

    /// Returns the number of unreserved, Verified ballots for `process_id`.
    async fn verified_count(&self, process_id: ProcessId) -> Result<u64>;

    /// Returns whether a pending on-chain transaction of `kind` is already
    /// in flight for `process_id`.
    async fn has_pending_tx(&self, kind: PendingTxKind, process_id: ProcessId) -> Result<bool>;

    /// Marks a pending on-chain transaction of `kind` as in flight.
    async fn set_pending_tx(&self, kind: PendingTxKind, process_id: ProcessId) -> Result<()>;

    /// Clears the pending-tx marker, regardless of outcome.
    async fn prune_pending_tx(&self, kind: PendingTxKind, process_id: ProcessId) -> Result<()>;

    /// Returns a state-transition batch's ballots to `Aggregated` status and
    /// removes the batch from the `state-transition` queue (spec §4.1, §4.7).
    async fn mark_state_transition_outdated(&self, batch_id: [u8; 32]) -> Result<()>;
}

/// Per-vote-id status tracking with validated transitions (spec §4.2, §6).
#[async_trait]
pub trait VoteIdTracker: Send + Sync {
    /// Returns the current status, if the vote-id is known.
    async fn get(&self, vote_id: VoteId) -> Option<VoteIdStatus>;

    /// Transitions `vote_id` to `next`. Rejects and logs any transition out
    /// of [`VoteIdStatus::Settled`] or any edge not permitted by
    /// [`VoteIdStatus::can_transition_to`].
    async fn set(&self, vote_id: VoteId, next: VoteIdStatus) -> Result<()>;

    /// Applies `set` to every id in `vote_ids` atomically.
    async fn set_batch(&self, vote_ids: &[VoteId], next: VoteIdStatus) -> Result<()>;

    /// Transitions every non-`Settled` vote-id belonging to `process_id` to
    /// [`VoteIdStatus::Timeout`] in one pass.
    async fn timeout_sweep(&self, process_id: ProcessId, vote_ids: &[VoteId]) -> Result<usize>;
}

/// The witness handed to [`CircuitBackend::prove_state_transition`].
#[derive(Clone, Debug)]
pub struct StateTransitionWitness {
    /// The aggregator proof being recursively composed.
    pub aggregator_proof: RecursiveProof,
    /// The state root before the batch.
    pub root_before: [u8; 32],
    /// The state root after the batch.
    pub root_after: [u8; 32],
    /// The blob's KZG commitment limbs.
    pub blob_commitment_limbs: Vec<[u8; 32]>,
    /// The claimed evaluation `Y = P(Z)`.
    pub claimed_evaluation: [u8; 32],
}

/// The Groth16 circuits, modeled as a black box (spec §1 Out of scope, §9).
///
/// A concrete backend owns the proving/verifying keys for each circuit and
/// performs the recursive composition. Every method is synchronous and
/// CPU-bound; callers are expected to run them on a dedicated thread pool.
pub trait CircuitBackend: Send + Sync {
    /// Produces a vote-verification proof binding `inputs_hash` as a public
    /// input, and re-verifies it locally before returning (spec §4.4 step 6).
    fn prove_and_verify_vote(
        &self,
        ballot: &Ballot,
        inputs_hash: [u8; 32],
    ) -> Result<WitnessedProof>;

    /// Re-verifies a vote-verification proof against `{IsValid=is_valid,
    /// InputsHash=inputs_hash}` (spec §4.5).
    fn verify_vote(
        &self,
        proof: &WitnessedProof,
        is_valid: bool,
        inputs_hash: [u8; 32],
    ) -> Result<bool>;

    /// Builds a deterministic dummy vote-verification proof whose public
    /// witness satisfies `IsValid = 0` (spec §9).
    fn dummy_vote_proof(&self, slot_index: u32) -> Result<WitnessedProof>;

    /// Recursively combines up to `B` vote-verification proofs into one
    /// aggregation proof (spec §4.5).
    fn prove_aggregation(
        &self,
        proofs: &[WitnessedProof],
        batch_inputs_hash: [u8; 32],
    ) -> Result<RecursiveProof>;

    /// Produces the state-transition proof targeting the Solidity verifier
    /// encoding (spec §4.6 step 9).
    fn prove_state_transition(&self, witness: &StateTransitionWitness) -> Result<RecursiveProof>;

    /// Verifies a results-finalization proof against the claimed tallies.
    fn verify_results(&self, proof: &RecursiveProof, tallies: &[u64]) -> Result<bool>;
}

/// The sparse Merkle/IMT census tree, modeled as a black box (spec §1 Out of
/// scope, §3 `ProcessState`).
pub trait CensusTree: Send + Sync {
    /// The tree's current root.
    fn root(&self) -> [u8; 32];

    /// Builds a membership proof for `address`, or a CSP proof when the
    /// process is credential-service-provider-backed.
    fn membership_proof(&self, address: Address) -> Result<CensusProof>;

    /// A deterministic dummy proof of the same shape, for unused batch slots.
    fn dummy_proof(&self) -> CensusProof;

    /// Whether `address` already has a recorded ballot (used for the
    /// max-voters / overwrite check, spec §4.5).
    fn contains(&self, address: Address) -> bool;

    /// Records or overwrites `address`'s weighted ballot, advancing the root.
    fn add_vote(&mut self, address: Address, weight: u64) -> Result<()>;
}

/// ElGamal encryption over Baby Jubjub, modeled as a black box (spec §1 Out
/// of scope, §4.6 re-encryption).
pub trait BallotCipher: Send + Sync {
    /// Encrypts zero under `public_key` with randomness `nonce`, used to
    /// re-randomize a ballot while preserving its homomorphic sum.
    fn encrypt_zero(&self, public_key: &[u8; 32], nonce: &[u8; 32]) -> Result<EncryptedBallot>;

    /// Homomorphically adds two ciphertexts, component-wise.
    fn homomorphic_add(&self, a: &EncryptedBallot, b: &EncryptedBallot) -> Result<EncryptedBallot>;

    /// Derives the next re-encryption seed from the current one (spec §4.6
    /// step 5: `k_{i+1} = derive(k_i)`).
    fn derive_nonce(&self, nonce: &[u8; 32]) -> [u8; 32];
}

/// Outcome of waiting on a submitted on-chain transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxOutcome {
    /// The transaction was mined and the expected state root matches.
    Included,
    /// The transaction failed or was not mined within the deadline.
    Failed,
}

/// An opaque handle to a submitted on-chain transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxHandle(pub Vec<u8>);

/// The blockchain client, modeled as a black box (spec §1 Out of scope, §4.7).
#[async_trait]
pub trait OnChainClient: Send + Sync {
    /// Returns the authoritative on-chain state root for `process_id`.
    async fn current_state_root(&self, process_id: ProcessId) -> Result<[u8; 32]>;

    /// Converts, simulates, and submits a state-transition transaction,
    /// including the blob sidecar when the target chain supports
    /// EIP-4844/7594.
    async fn submit_state_transition(&self, batch: &StateTransitionBatch) -> Result<TxHandle>;

    /// Converts, simulates, and submits a results transaction.
    async fn submit_results(&self, results: &VerifiedResults) -> Result<TxHandle>;

    /// Waits for inclusion, up to `timeout`.
    async fn wait_for_inclusion(&self, handle: &TxHandle, timeout: Duration) -> Result<TxOutcome>;
}
