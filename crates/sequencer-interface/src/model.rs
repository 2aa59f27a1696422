//! The data model flowing through the pipeline (spec §3).

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::ids::{Address, ProcessId, VoteId};

/// An opaque, serialized Groth16 proof. The concrete curve and circuit are a
/// black box behind [`crate::traits::CircuitBackend`]; this crate only needs
/// to move the bytes around and compare them for recursive composition.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct RecursiveProof {
    /// Serialized `(A, B, C)` proof elements, curve-encoding defined by the backend.
    pub bytes: Vec<u8>,
    /// Whether this slot carries a real proof or a deterministic dummy (spec §9).
    pub is_dummy: bool,
}

/// A Groth16 verifying-key-qualified recursive proof, paired with the public
/// inputs hash that was bound into it.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct WitnessedProof {
    /// The proof itself.
    pub proof: RecursiveProof,
    /// The MiMC7 inputs hash bound as a public input.
    pub inputs_hash: [u8; 32],
}

/// An ElGamal ciphertext tuple over Baby Jubjub (spec §3, modeled opaquely
/// behind [`crate::traits::BallotCipher`]).
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct EncryptedBallot {
    /// `(c1, c2)` per vote option, each a compressed curve point.
    pub ciphertexts: Vec<[u8; 32]>,
}

/// A census-membership proof. Shape depends on whether the process is
/// census-tree-backed or credential-service-provider-backed (spec §4.6);
/// both are carried as opaque bytes behind [`crate::traits::CensusTree`].
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct CensusProof {
    /// Serialized Merkle/IMT or CSP proof bytes.
    pub bytes: Vec<u8>,
    /// True when this is a deterministic dummy filling an unused batch slot.
    pub is_dummy: bool,
}

/// A ballot as submitted by a voter (spec §3).
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Ballot {
    /// The process this ballot belongs to.
    pub process_id: ProcessId,
    /// Unique per ballot; stable for its whole lifecycle.
    pub vote_id: VoteId,
    /// The voter's address in the census tree.
    pub address: Address,
    /// The voter's weight, as recorded in the census.
    pub weight: u64,
    /// The encrypted ballot contents.
    pub encrypted_ballot: EncryptedBallot,
    /// Signature over the canonical ballot encoding.
    pub signature: [u8; 64],
    /// The voter's compressed secp256k1 public key.
    pub voter_public_key: [u8; 33],
    /// Proof of census membership.
    pub census_proof: CensusProof,
    /// The inner (circom-style) ballot proof attesting to well-formedness of
    /// the plaintext vote before encryption.
    pub inner_ballot_proof: Vec<u8>,
}

/// A [`Ballot`] that has passed vote-verification (spec §3, §4.4).
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct VerifiedBallot {
    /// The original ballot.
    pub ballot: Ballot,
    /// The recursive Groth16 proof over the vote-verifier curve, carrying the
    /// MiMC7 inputs hash as its bound public input.
    pub proof: WitnessedProof,
    /// The census proof retained for the state-transition worker.
    pub census_proof: CensusProof,
}

/// Exactly `B` slots of verified ballots, recursively combined (spec §3, §4.5).
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct AggregatorBatch {
    /// The process these ballots belong to.
    pub process_id: ProcessId,
    /// Stable identifier for this batch, used by `mark_state_transition_outdated`.
    pub batch_id: [u8; 32],
    /// Exactly `B` slots; real ballots first, then deterministic dummy padding.
    pub slots: Vec<VerifiedBallot>,
    /// Number of real (non-dummy) ballots among `slots`.
    pub valid_count: u32,
    /// The recursive aggregation proof over the aggregator curve.
    pub proof: RecursiveProof,
    /// `MiMC7` of the padded per-slot inputs-hash vector.
    pub batch_inputs_hash: [u8; 32],
}

/// The KZG commitment to a blob, including the limb encoding used by the
/// Solidity verifier (spec §3, §4.8).
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct BlobCommitment {
    /// 48-byte compressed G1 commitment, split into verifier-friendly limbs.
    pub limbs: Vec<[u8; 32]>,
    /// The claimed evaluation `Y = P(Z)`.
    pub claimed_value: [u8; 32],
    /// The evaluation point `Z`, masked to 250 bits (spec §4.8).
    pub evaluation_point: [u8; 32],
}

/// The off-proof data transmitted alongside a blob transaction.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct BlobSidecar {
    /// The raw blob bytes (4096 big-endian 32-byte field elements).
    pub blob: Vec<u8>,
    /// 128 cell proofs (EIP-7594), or a single opening proof (EIP-4844) when
    /// the target chain doesn't yet support cell proofs.
    pub proofs: Vec<Vec<u8>>,
}

/// An [`AggregatorBatch`] advanced through the state tree and bound to a blob
/// commitment (spec §3, §4.6).
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct StateTransitionBatch {
    /// The aggregator batch this transition applies.
    pub aggregator_batch: AggregatorBatch,
    /// The state root before this batch was applied.
    pub root_before: [u8; 32],
    /// The state root after this batch was applied.
    pub root_after: [u8; 32],
    /// Number of distinct voter addresses touched.
    pub voters_count: u32,
    /// Number of ballots that overwrote a prior vote from the same address.
    pub overwritten_votes_count: u32,
    /// The census root used to validate membership proofs for this batch.
    pub census_root: [u8; 32],
    /// The KZG commitment to the state blob.
    pub blob_commitment: BlobCommitment,
    /// The off-proof blob sidecar.
    pub blob_sidecar: BlobSidecar,
    /// The Groth16 state-transition proof, encoded for the Solidity verifier.
    pub proof: RecursiveProof,
    /// `sha256(commitment)` with a leading `0x01` version byte (spec §6).
    pub blob_version_hash: [u8; 32],
}

/// Produced by an external finalizer when a process ends (spec §3).
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct VerifiedResults {
    /// The process whose tallies were finalized.
    pub process_id: ProcessId,
    /// Proof that the final decrypted tallies match the encrypted accumulators.
    pub proof: RecursiveProof,
    /// The decrypted tallies, one per vote option.
    pub tallies: Vec<u64>,
}

/// A short-lived mark on a queued item indicating a worker currently owns it
/// (spec §3, §4.1).
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Reservation {
    /// The storage key of the reserved item.
    pub key: Vec<u8>,
    /// Opaque token identifying the reserving worker, for diagnostics only.
    pub holder: [u8; 16],
    /// Unix timestamp (seconds) the reservation was created.
    pub reserved_at: u64,
}

/// The kind of pending on-chain transaction being tracked per process
/// (spec §4.1 `has_pending_tx`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum PendingTxKind {
    /// A state-transition submission is in flight.
    StateTransition,
    /// A results submission is in flight.
    Results,
}

/// A per-process summary of the sparse Merkle/IMT tree state (spec §3).
///
/// The tree itself lives behind [`crate::traits::CensusTree`]; this struct is
/// the durable snapshot metadata the state-transition worker reads and writes.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ProcessState {
    /// The process this state belongs to.
    pub process_id: ProcessId,
    /// The current tree root.
    pub root: [u8; 32],
    /// Number of distinct voter addresses with a recorded ballot.
    pub voters_count: u32,
    /// Homomorphic accumulator of additions, one limb per vote option.
    pub additions_accumulator: Vec<[u8; 32]>,
    /// Homomorphic accumulator of subtractions (for overwritten ballots).
    pub subtractions_accumulator: Vec<[u8; 32]>,
    /// Maximum number of distinct voter addresses this process accepts.
    pub max_voters: u32,
    /// Whether the process is still accepting votes.
    pub accepting_votes: bool,
}
