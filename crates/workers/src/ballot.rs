//! The Ballot Worker (spec §4.4): a single-threaded, 1-second-ticked loop
//! that structurally validates a Pending ballot, proves vote-verification,
//! and re-verifies the proof locally before handing it to the Aggregate
//! Worker.

use std::sync::Arc;
use std::time::Duration;

use mock_circuit_backend::{crypto, mimc7};
use pipeline_runtime::config::UnregisteredProcessPolicy;
use pipeline_runtime::ShutdownSignal;
use sequencer_interface::model::{Ballot, VerifiedBallot};
use sequencer_interface::traits::{CircuitBackend, ProcessTreeStore, QueueStore, VoteIdTracker};
use sequencer_interface::status::VoteIdStatus;
use sequencer_interface::SequencerError;
use sequencer_metrics::update_metrics;
use sequencer_state::ProcessRegistry;

/// Configuration for one [`BallotWorker`] instance.
pub struct BallotWorkerConfig {
    /// Tick period (spec default: 1 s).
    pub tick_period: Duration,
    /// This worker's reservation holder token.
    pub holder: [u8; 16],
    /// Disposition for ballots whose process-id is unregistered (spec §9).
    pub unregistered_process: UnregisteredProcessPolicy,
}

/// Produces a per-ballot ZK proof (spec §4.4).
pub struct BallotWorker {
    queues: Arc<dyn QueueStore>,
    vote_ids: Arc<dyn VoteIdTracker>,
    processes: Arc<ProcessRegistry>,
    tree_store: Arc<dyn ProcessTreeStore>,
    circuit: Arc<dyn CircuitBackend>,
    config: BallotWorkerConfig,
}

/// Returns the digest the ballot's signature is expected to cover: a hash of
/// every field but the signature itself (spec §3 "signature over the
/// canonical ballot encoding").
fn ballot_message_hash(ballot: &Ballot) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(ballot.process_id.as_bytes());
    hasher.update(ballot.vote_id.as_bytes());
    hasher.update(ballot.address.as_bytes());
    hasher.update(ballot.weight.to_be_bytes());
    for limb in &ballot.encrypted_ballot.ciphertexts {
        hasher.update(limb);
    }
    hasher.finalize().into()
}

/// `MiMC7` of the canonical public tuple the vote-verifier circuit binds
/// (spec §4.4 step 5).
fn ballot_inputs_hash(ballot: &Ballot) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut ciphertext_digest = Sha256::new();
    for limb in &ballot.encrypted_ballot.ciphertexts {
        ciphertext_digest.update(limb);
    }
    let mut weight_be = [0u8; 32];
    weight_be[24..].copy_from_slice(&ballot.weight.to_be_bytes());

    mimc7::mimc7_hash_bytes(&[
        *ballot.process_id.as_bytes(),
        *ballot.vote_id.as_bytes(),
        *ballot.address.as_bytes(),
        weight_be,
        ciphertext_digest.finalize().into(),
    ])
}

/// Structural invariants checked before a ballot is ever handed to the
/// circuit (spec §4.4 step 3: "curve points in subgroup, non-zero fields,
/// well-formed signature").
fn validate_structure(ballot: &Ballot) -> Result<(), SequencerError> {
    if ballot.address.as_bytes() == &[0u8; 32] {
        return Err(SequencerError::StructuralInvalid(
            "voter address is zero".to_string(),
        ));
    }
    if ballot.weight == 0 {
        return Err(SequencerError::StructuralInvalid(
            "voter weight is zero".to_string(),
        ));
    }
    if ballot.encrypted_ballot.ciphertexts.is_empty()
        || ballot
            .encrypted_ballot
            .ciphertexts
            .iter()
            .all(|limb| limb == &[0u8; 32])
    {
        return Err(SequencerError::StructuralInvalid(
            "encrypted ballot is empty or all-zero".to_string(),
        ));
    }
    if ballot.census_proof.bytes.is_empty() {
        return Err(SequencerError::StructuralInvalid(
            "census proof is empty".to_string(),
        ));
    }

    let message_hash = ballot_message_hash(ballot);
    crypto::check_well_formed(&ballot.voter_public_key, &ballot.signature, &message_hash)
}

impl BallotWorker {
    /// Builds a new Ballot Worker over the given collaborators.
    pub fn new(
        queues: Arc<dyn QueueStore>,
        vote_ids: Arc<dyn VoteIdTracker>,
        processes: Arc<ProcessRegistry>,
        tree_store: Arc<dyn ProcessTreeStore>,
        circuit: Arc<dyn CircuitBackend>,
        config: BallotWorkerConfig,
    ) -> Self {
        Self {
            queues,
            vote_ids,
            processes,
            tree_store,
            circuit,
            config,
        }
    }

    /// Runs the worker loop until `shutdown` is triggered (spec §4.4, §5).
    pub async fn run(&self, mut shutdown: ShutdownSignal) {
        let period = self.config.tick_period;
        shutdown.run_ticked(period, || self.tick()).await;
    }

    async fn tick(&self) {
        let reserved = match self.queues.next_unreserved_pending(self.config.holder).await {
            Ok(reserved) => reserved,
            Err(e) if e.is_no_more_elements() => return,
            Err(e) => {
                tracing::warn!(error = %e, "ballot worker failed to reserve a pending ballot");
                return;
            }
        };
        let ballot = reserved.item.clone();
        let vote_id = ballot.vote_id;

        if !self.processes.exists(ballot.process_id) {
            match self.config.unregistered_process {
                UnregisteredProcessPolicy::LeaveReserved => {}
                UnregisteredProcessPolicy::Release => {
                    let _ = self.queues.release(&[reserved.key]).await;
                }
                UnregisteredProcessPolicy::Delete => {
                    let _ = self
                        .queues
                        .mark_failed(&[reserved.key], &[vote_id])
                        .await;
                }
            }
            return;
        }

        if let Err(e) = validate_structure(&ballot) {
            tracing::debug!(vote_id = %vote_id, error = %e, "ballot failed structural validation");
            let _ = self.queues.mark_failed(&[reserved.key], &[vote_id]).await;
            update_metrics(|m| m.ballots_rejected.inc());
            return;
        }

        let accepting = self
            .tree_store
            .get(ballot.process_id)
            .is_some_and(|state| state.accepting_votes);
        if !accepting {
            let _ = self.queues.mark_failed(&[reserved.key], &[vote_id]).await;
            update_metrics(|m| m.ballots_rejected.inc());
            return;
        }

        let inputs_hash = ballot_inputs_hash(&ballot);
        let witnessed = match self.circuit.prove_and_verify_vote(&ballot, inputs_hash) {
            Ok(proof) => proof,
            Err(e) => {
                tracing::error!(vote_id = %vote_id, error = %e, "vote-verification proving failed");
                let _ = self.queues.mark_failed(&[reserved.key], &[vote_id]).await;
                update_metrics(|m| m.ballots_rejected.inc());
                return;
            }
        };

        let verified = VerifiedBallot {
            ballot: ballot.clone(),
            proof: witnessed,
            census_proof: ballot.census_proof.clone(),
        };
        if let Err(e) = self.queues.push_verified(verified).await {
            tracing::error!(vote_id = %vote_id, error = %e, "failed to push verified ballot");
            let _ = self.queues.release(&[reserved.key]).await;
            return;
        }
        if let Err(e) = self.queues.mark_done(&[reserved.key]).await {
            tracing::error!(vote_id = %vote_id, error = %e, "failed to mark pending ballot done");
            return;
        }
        let _ = self
            .vote_ids
            .set(vote_id, VoteIdStatus::Verified)
            .await;
        update_metrics(|m| m.ballots_verified.inc());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mock_chain_client::InMemoryProcessStateStore;
    use mock_circuit_backend::MockCircuitBackend;
    use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
    use sequencer_interface::model::{CensusProof, EncryptedBallot};
    use sequencer_interface::traits::QueueStore;
    use sequencer_interface::{Address, ProcessId, VoteId};
    use sequencer_state::SequencerState;
    use tempfile::TempDir;

    use super::*;

    fn signed_ballot(process_id: ProcessId, vote_id: VoteId) -> Ballot {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[11u8; 32]).unwrap();
        let public = PublicKey::from_secret_key(&secp, &secret);

        let mut ballot = Ballot {
            process_id,
            vote_id,
            address: Address::new([3u8; 32]),
            weight: 7,
            encrypted_ballot: EncryptedBallot {
                ciphertexts: vec![[9u8; 32]],
            },
            signature: [0u8; 64],
            voter_public_key: public.serialize(),
            census_proof: CensusProof {
                bytes: vec![1u8; 40],
                is_dummy: false,
            },
            inner_ballot_proof: Vec::new(),
        };
        let digest = ballot_message_hash(&ballot);
        let sig = secp.sign_ecdsa(&Message::from_slice(&digest).unwrap(), &secret);
        ballot.signature = sig.serialize_compact();
        ballot
    }

    struct Harness {
        _dir: TempDir,
        tree_store: Arc<InMemoryProcessStateStore>,
        worker: BallotWorker,
    }

    fn harness(policy: UnregisteredProcessPolicy) -> Harness {
        let dir = TempDir::new().unwrap();
        let state = SequencerState::open(dir.path()).unwrap();
        let tree_store = Arc::new(InMemoryProcessStateStore::new());
        let circuit = Arc::new(MockCircuitBackend::new().unwrap());
        let worker = BallotWorker::new(
            Arc::new(state.queues),
            state.vote_ids,
            Arc::new(state.processes),
            tree_store.clone(),
            circuit,
            BallotWorkerConfig {
                tick_period: Duration::from_millis(10),
                holder: [1u8; 16],
                unregistered_process: policy,
            },
        );
        Harness {
            _dir: dir,
            tree_store,
            worker,
        }
    }

    #[tokio::test]
    async fn verifies_a_well_formed_ballot_for_a_registered_process() {
        let h = harness(UnregisteredProcessPolicy::LeaveReserved);
        let pid = ProcessId::new([4u8; 32]);
        let vote_id = VoteId::new([5u8; 32]);
        h.worker.processes.add(pid, 0).unwrap();
        h.tree_store.register(pid, 8);

        h.worker.queues.push_pending(signed_ballot(pid, vote_id)).await.unwrap();
        h.worker.tick().await;

        assert_eq!(h.worker.vote_ids.get(vote_id).await, Some(VoteIdStatus::Verified));
        assert_eq!(h.worker.queues.verified_count(pid).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn leaves_an_unregistered_processs_ballot_reserved_under_the_default_policy() {
        let h = harness(UnregisteredProcessPolicy::LeaveReserved);
        let pid = ProcessId::new([6u8; 32]);
        let vote_id = VoteId::new([7u8; 32]);

        h.worker.queues.push_pending(signed_ballot(pid, vote_id)).await.unwrap();
        h.worker.tick().await;

        // Still reserved: a second tick finds nothing new to reserve.
        let next = h.worker.queues.next_unreserved_pending([2u8; 16]).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn rejects_a_structurally_invalid_ballot() {
        let h = harness(UnregisteredProcessPolicy::LeaveReserved);
        let pid = ProcessId::new([8u8; 32]);
        let vote_id = VoteId::new([9u8; 32]);
        h.worker.processes.add(pid, 0).unwrap();
        h.tree_store.register(pid, 8);

        let mut ballot = signed_ballot(pid, vote_id);
        ballot.weight = 0;
        h.worker.queues.push_pending(ballot).await.unwrap();
        h.worker.tick().await;

        assert_eq!(h.worker.vote_ids.get(vote_id).await, Some(VoteIdStatus::Error));
    }
}
