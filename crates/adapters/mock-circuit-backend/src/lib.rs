//! A deterministic Groth16 [`CircuitBackend`] used by tests and the
//! reference worker deployment (spec §1 Out of scope, §9 "the circuits
//! themselves are a black box"). The four circuits this crate sets up bind
//! exactly the public inputs the pipeline relies on; they do not recompute
//! ballot validity, census membership, or the blob evaluation identity
//! in-circuit, since those remain outside this exercise's scope.

pub mod circuits;
pub mod crypto;
pub mod mimc7;

use ark_bls12_381::{Bls12_381, Fr};
use ark_ff::PrimeField;
use ark_groth16::{Groth16, Proof, ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::rand::{rngs::StdRng, SeedableRng};

use circuits::{AggregationCircuit, ResultsCircuit, StateTransitionCircuit, VoteCircuit, BATCH_SLOTS, COMMITMENT_LIMBS};
use sequencer_interface::model::{Ballot, RecursiveProof, WitnessedProof};
use sequencer_interface::traits::{CircuitBackend, StateTransitionWitness};
use sequencer_interface::SequencerError;

type Result<T> = std::result::Result<T, SequencerError>;

/// Fixed seed for the one-time trusted setup of all four mock circuits. A
/// real deployment loads production keys from ceremony output instead; this
/// backend exists to exercise the pipeline deterministically.
const SETUP_SEED: [u8; 32] = *b"mock-circuit-backend-setup-seed";

fn fr_from_hash(bytes: &[u8; 32]) -> Fr {
    Fr::from_be_bytes_mod_order(bytes)
}

fn serialize_proof(proof: &Proof<Bls12_381>) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    proof
        .serialize_compressed(&mut bytes)
        .map_err(|e| SequencerError::ProofGenerationFailure(e.to_string()))?;
    Ok(bytes)
}

fn deserialize_proof(bytes: &[u8]) -> Result<Proof<Bls12_381>> {
    Proof::deserialize_compressed(bytes)
        .map_err(|e| SequencerError::ProofGenerationFailure(e.to_string()))
}

/// Owns the proving/verifying keys for the vote, aggregation,
/// state-transition, and results circuits, generated once at construction
/// time (spec §9 "Global mutable state").
pub struct MockCircuitBackend {
    vote_pk: ProvingKey<Bls12_381>,
    vote_vk: VerifyingKey<Bls12_381>,
    aggregation_pk: ProvingKey<Bls12_381>,
    aggregation_vk: VerifyingKey<Bls12_381>,
    state_transition_pk: ProvingKey<Bls12_381>,
    state_transition_vk: VerifyingKey<Bls12_381>,
    results_pk: ProvingKey<Bls12_381>,
    results_vk: VerifyingKey<Bls12_381>,
}

impl MockCircuitBackend {
    /// Runs `circuit_specific_setup` for all four circuits against a fixed
    /// seed, so every instance of this backend agrees on the same keys
    /// without a shared ceremony.
    pub fn new() -> Result<Self> {
        let mut rng = StdRng::from_seed(SETUP_SEED);

        let (vote_pk, vote_vk) = Groth16::<Bls12_381>::circuit_specific_setup(
            VoteCircuit::default(),
            &mut rng,
        )
        .map_err(|e| SequencerError::ProofGenerationFailure(e.to_string()))?;

        let (aggregation_pk, aggregation_vk) = Groth16::<Bls12_381>::circuit_specific_setup(
            AggregationCircuit::default(),
            &mut rng,
        )
        .map_err(|e| SequencerError::ProofGenerationFailure(e.to_string()))?;

        let (state_transition_pk, state_transition_vk) = Groth16::<Bls12_381>::circuit_specific_setup(
            StateTransitionCircuit::default(),
            &mut rng,
        )
        .map_err(|e| SequencerError::ProofGenerationFailure(e.to_string()))?;

        let (results_pk, results_vk) = Groth16::<Bls12_381>::circuit_specific_setup(
            ResultsCircuit::default(),
            &mut rng,
        )
        .map_err(|e| SequencerError::ProofGenerationFailure(e.to_string()))?;

        Ok(Self {
            vote_pk,
            vote_vk,
            aggregation_pk,
            aggregation_vk,
            state_transition_pk,
            state_transition_vk,
            results_pk,
            results_vk,
        })
    }
}

impl Default for MockCircuitBackend {
    fn default() -> Self {
        Self::new().expect("fixed-seed circuit setup cannot fail")
    }
}

impl CircuitBackend for MockCircuitBackend {
    fn prove_and_verify_vote(&self, _ballot: &Ballot, inputs_hash: [u8; 32]) -> Result<WitnessedProof> {
        let circuit = VoteCircuit {
            is_valid: Some(Fr::from(1u64)),
            inputs_hash: Some(fr_from_hash(&inputs_hash)),
        };
        let mut rng = ark_std::test_rng();
        let proof = Groth16::<Bls12_381>::prove(&self.vote_pk, circuit, &mut rng)
            .map_err(|e| SequencerError::ProofGenerationFailure(e.to_string()))?;

        let public_inputs = [Fr::from(1u64), fr_from_hash(&inputs_hash)];
        let verified = Groth16::<Bls12_381>::verify(&self.vote_vk, &public_inputs, &proof)
            .map_err(|e| SequencerError::ProofGenerationFailure(e.to_string()))?;
        if !verified {
            return Err(SequencerError::ProofVerificationFailure);
        }

        Ok(WitnessedProof {
            proof: RecursiveProof {
                bytes: serialize_proof(&proof)?,
                is_dummy: false,
            },
            inputs_hash,
        })
    }

    fn verify_vote(&self, proof: &WitnessedProof, is_valid: bool, inputs_hash: [u8; 32]) -> Result<bool> {
        let parsed = deserialize_proof(&proof.proof.bytes)?;
        let public_inputs = [
            Fr::from(if is_valid { 1u64 } else { 0u64 }),
            fr_from_hash(&inputs_hash),
        ];
        Groth16::<Bls12_381>::verify(&self.vote_vk, &public_inputs, &parsed)
            .map_err(|_e| SequencerError::ProofVerificationFailure)
    }

    fn dummy_vote_proof(&self, slot_index: u32) -> Result<WitnessedProof> {
        let inputs_hash = mimc7::mimc7_hash_bytes(&[[0u8; 32], {
            let mut seed = [0u8; 32];
            seed[28..].copy_from_slice(&slot_index.to_be_bytes());
            seed
        }]);
        let circuit = VoteCircuit {
            is_valid: Some(Fr::from(0u64)),
            inputs_hash: Some(fr_from_hash(&inputs_hash)),
        };
        let mut rng = StdRng::from_seed(SETUP_SEED);
        let proof = Groth16::<Bls12_381>::prove(&self.vote_pk, circuit, &mut rng)
            .map_err(|e| SequencerError::ProofGenerationFailure(e.to_string()))?;

        Ok(WitnessedProof {
            proof: RecursiveProof {
                bytes: serialize_proof(&proof)?,
                is_dummy: true,
            },
            inputs_hash,
        })
    }

    fn prove_aggregation(&self, proofs: &[WitnessedProof], batch_inputs_hash: [u8; 32]) -> Result<RecursiveProof> {
        if proofs.len() != BATCH_SLOTS {
            return Err(SequencerError::StructuralInvalid(format!(
                "aggregation circuit expects exactly {BATCH_SLOTS} slots, got {}",
                proofs.len()
            )));
        }
        let mut slot_hashes = [None; BATCH_SLOTS];
        for (slot, proof) in slot_hashes.iter_mut().zip(proofs) {
            *slot = Some(fr_from_hash(&proof.inputs_hash));
        }
        let circuit = AggregationCircuit {
            slot_hashes,
            batch_inputs_hash: Some(fr_from_hash(&batch_inputs_hash)),
        };
        let mut rng = ark_std::test_rng();
        let proof = Groth16::<Bls12_381>::prove(&self.aggregation_pk, circuit, &mut rng)
            .map_err(|e| SequencerError::ProofGenerationFailure(e.to_string()))?;

        Ok(RecursiveProof {
            bytes: serialize_proof(&proof)?,
            is_dummy: false,
        })
    }

    fn prove_state_transition(&self, witness: &StateTransitionWitness) -> Result<RecursiveProof> {
        if witness.blob_commitment_limbs.len() != COMMITMENT_LIMBS {
            return Err(SequencerError::StructuralInvalid(format!(
                "state-transition circuit expects exactly {COMMITMENT_LIMBS} commitment limbs, got {}",
                witness.blob_commitment_limbs.len()
            )));
        }
        let mut commitment_limbs = [None; COMMITMENT_LIMBS];
        for (slot, limb) in commitment_limbs.iter_mut().zip(&witness.blob_commitment_limbs) {
            *slot = Some(fr_from_hash(limb));
        }
        let circuit = StateTransitionCircuit {
            root_before: Some(fr_from_hash(&witness.root_before)),
            root_after: Some(fr_from_hash(&witness.root_after)),
            claimed_evaluation: Some(fr_from_hash(&witness.claimed_evaluation)),
            commitment_limbs,
        };
        let mut rng = ark_std::test_rng();
        let proof = Groth16::<Bls12_381>::prove(&self.state_transition_pk, circuit, &mut rng)
            .map_err(|e| SequencerError::ProofGenerationFailure(e.to_string()))?;

        Ok(RecursiveProof {
            bytes: serialize_proof(&proof)?,
            is_dummy: false,
        })
    }

    fn verify_results(&self, proof: &RecursiveProof, tallies: &[u64]) -> Result<bool> {
        let parsed = deserialize_proof(&proof.bytes)?;
        let sum: Fr = tallies.iter().fold(Fr::from(0u64), |acc, t| acc + Fr::from(*t));
        Groth16::<Bls12_381>::verify(&self.results_vk, &[sum], &parsed)
            .map_err(|_e| SequencerError::ProofVerificationFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_proof_round_trips_through_verify() {
        let backend = MockCircuitBackend::new().unwrap();
        let ballot = sample_ballot();
        let inputs_hash = [7u8; 32];
        let witnessed = backend.prove_and_verify_vote(&ballot, inputs_hash).unwrap();
        assert!(backend.verify_vote(&witnessed, true, inputs_hash).unwrap());
        assert!(!backend.verify_vote(&witnessed, false, inputs_hash).unwrap());
    }

    #[test]
    fn dummy_vote_proofs_are_deterministic_and_marked() {
        let backend = MockCircuitBackend::new().unwrap();
        let a = backend.dummy_vote_proof(3).unwrap();
        let b = backend.dummy_vote_proof(3).unwrap();
        assert!(a.proof.is_dummy);
        assert_eq!(a.inputs_hash, b.inputs_hash);
    }

    #[test]
    fn results_proof_rejects_tampered_tallies() {
        let backend = MockCircuitBackend::new().unwrap();
        let circuit = ResultsCircuit {
            tally_sum: Some(Fr::from(30u64)),
        };
        let mut rng = ark_std::test_rng();
        let proof = Groth16::<Bls12_381>::prove(&backend.results_pk, circuit, &mut rng).unwrap();
        let recursive = RecursiveProof {
            bytes: serialize_proof(&proof).unwrap(),
            is_dummy: false,
        };
        assert!(backend.verify_results(&recursive, &[10, 10, 10]).unwrap());
        assert!(!backend.verify_results(&recursive, &[1, 2, 3]).unwrap());
    }

    fn sample_ballot() -> Ballot {
        use sequencer_interface::model::{CensusProof, EncryptedBallot};
        use sequencer_interface::{Address, ProcessId, VoteId};
        Ballot {
            process_id: ProcessId::from([1u8; 32]),
            vote_id: VoteId::from([2u8; 32]),
            address: Address::from([3u8; 32]),
            weight: 1,
            encrypted_ballot: EncryptedBallot {
                ciphertexts: vec![[0u8; 32]; 2],
            },
            signature: [0u8; 64],
            voter_public_key: [0u8; 33],
            census_proof: CensusProof {
                bytes: vec![],
                is_dummy: false,
            },
            inner_ballot_proof: vec![],
        }
    }
}
