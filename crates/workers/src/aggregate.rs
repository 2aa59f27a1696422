//! The Aggregate Worker (spec §4.5): on a 10-second tick, recursively
//! combines up to `B` Verified ballots per registered process into one
//! [`AggregatorBatch`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use mock_circuit_backend::mimc7;
use pipeline_runtime::ShutdownSignal;
use sequencer_interface::model::{AggregatorBatch, VerifiedBallot};
use sequencer_interface::traits::{CircuitBackend, ProcessTreeStore, QueueStore, Reserved, VoteIdTracker};
use sequencer_interface::status::VoteIdStatus;
use sequencer_interface::ProcessId;
use sequencer_metrics::update_metrics;
use sequencer_state::ProcessRegistry;

/// Configuration for one [`AggregateWorker`] instance.
pub struct AggregateWorkerConfig {
    /// Tick period (spec default: 10 s).
    pub tick_period: Duration,
    /// Number of slots per aggregator batch (`B`).
    pub batch_slots: usize,
    /// How long to wait for `B` ballots once the first one has arrived.
    pub batch_window: Duration,
    /// How many times to retry aggregation proving, after isolating any
    /// ballot that fails re-verification, before releasing the survivors
    /// back to the queue for a later tick.
    pub proving_retry_limit: u32,
    /// This worker's reservation holder token.
    pub holder: [u8; 16],
}

/// Recursively combines `B` vote-verification proofs per process (spec §4.5).
pub struct AggregateWorker {
    queues: Arc<dyn QueueStore>,
    vote_ids: Arc<dyn VoteIdTracker>,
    processes: Arc<ProcessRegistry>,
    tree_store: Arc<dyn ProcessTreeStore>,
    circuit: Arc<dyn CircuitBackend>,
    config: AggregateWorkerConfig,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// One ballot that survived `collect_aggregation_batch_inputs`.
struct CollectedSlot {
    reserved: Reserved<VerifiedBallot>,
    inputs_hash: [u8; 32],
}

impl AggregateWorker {
    /// Builds a new Aggregate Worker over the given collaborators.
    pub fn new(
        queues: Arc<dyn QueueStore>,
        vote_ids: Arc<dyn VoteIdTracker>,
        processes: Arc<ProcessRegistry>,
        tree_store: Arc<dyn ProcessTreeStore>,
        circuit: Arc<dyn CircuitBackend>,
        config: AggregateWorkerConfig,
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

    /// Runs the worker loop until `shutdown` is triggered (spec §4.5, §5).
    pub async fn run(&self, mut shutdown: ShutdownSignal) {
        let period = self.config.tick_period;
        shutdown.run_ticked(period, || self.tick()).await;
    }

    async fn tick(&self) {
        let process_ids = self.processes.list();
        for process_id in process_ids {
            self.process_one(process_id).await;
        }
    }

    /// `process_pending_batches`'s per-process body (spec §4.5 steps 1-4).
    async fn process_one(&self, process_id: ProcessId) {
        let count = match self.queues.verified_count(process_id).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(%process_id, error = %e, "failed to read verified count");
                return;
            }
        };
        if count == 0 {
            return;
        }

        let batch_slots = self.config.batch_slots as u64;
        if count < batch_slots {
            match self.processes.get_first_ballot_time(process_id) {
                None => {
                    let _ = self.processes.set_first_ballot_time(process_id, now_secs());
                    return;
                }
                Some(first_seen) => {
                    let elapsed = now_secs().saturating_sub(first_seen);
                    if elapsed <= self.config.batch_window.as_secs() {
                        return;
                    }
                }
            }
        }

        let pulled = match self
            .queues
            .pull_verified(process_id, 2 * self.config.batch_slots, self.config.holder)
            .await
        {
            Ok(pulled) => pulled,
            Err(e) if e.is_no_more_elements() => return,
            Err(e) => {
                tracing::warn!(%process_id, error = %e, "failed to pull verified ballots");
                return;
            }
        };

        let (collected, leftover) = self.collect_aggregation_batch_inputs(process_id, pulled).await;
        for reserved in &leftover {
            let _ = self.queues.release(&[reserved.key.clone()]).await;
        }

        let _ = self.processes.clear_first_ballot_time(process_id);

        if collected.is_empty() {
            return;
        }

        self.prove_and_finish(process_id, collected, self.config.proving_retry_limit).await;
    }

    /// `collect_aggregation_batch_inputs` (spec §4.5): structural, state
    /// membership, max-voters, and re-verification checks over the pulled
    /// ballots, stopping once `B` have been gathered. Returns the accepted
    /// slots and the still-reserved leftovers to release.
    async fn collect_aggregation_batch_inputs(
        &self,
        process_id: ProcessId,
        pulled: Vec<Reserved<VerifiedBallot>>,
    ) -> (Vec<CollectedSlot>, Vec<Reserved<VerifiedBallot>>) {
        let mut collected = Vec::new();
        let mut seen_addresses = HashSet::new();
        let mut leftover = Vec::new();
        let mut failed_keys = Vec::new();
        let mut failed_vote_ids = Vec::new();

        for reserved in pulled {
            if collected.len() >= self.config.batch_slots {
                leftover.push(reserved);
                continue;
            }

            let verified = &reserved.item;
            let ballot = &verified.ballot;

            if ballot.proof.proof.bytes.is_empty() || verified.census_proof.bytes.is_empty() {
                failed_keys.push(reserved.key.clone());
                failed_vote_ids.push(ballot.vote_id);
                continue;
            }

            let already_settled = matches!(
                self.vote_ids.get(ballot.vote_id).await,
                Some(VoteIdStatus::Aggregated)
                    | Some(VoteIdStatus::Processed)
                    | Some(VoteIdStatus::Settled)
            );
            if already_settled {
                failed_keys.push(reserved.key.clone());
                failed_vote_ids.push(ballot.vote_id);
                continue;
            }

            let state = self.tree_store.get(process_id);
            let address_known = self.tree_store.contains(process_id, ballot.address);
            let max_voters_reached = state
                .as_ref()
                .is_some_and(|s| s.voters_count >= s.max_voters);
            if max_voters_reached && !address_known {
                failed_keys.push(reserved.key.clone());
                failed_vote_ids.push(ballot.vote_id);
                continue;
            }

            if seen_addresses.contains(&ballot.address) {
                failed_keys.push(reserved.key.clone());
                failed_vote_ids.push(ballot.vote_id);
                continue;
            }

            let inputs_hash = verified.proof.inputs_hash;
            let valid = self
                .circuit
                .verify_vote(&verified.proof, true, inputs_hash)
                .unwrap_or(false);
            if !valid {
                let invalid_but_proven = self
                    .circuit
                    .verify_vote(&verified.proof, false, inputs_hash)
                    .unwrap_or(false);
                tracing::debug!(
                    vote_id = %ballot.vote_id,
                    invalid_but_proven,
                    "ballot did not re-verify as valid during aggregation"
                );
                failed_keys.push(reserved.key.clone());
                failed_vote_ids.push(ballot.vote_id);
                continue;
            }

            seen_addresses.insert(ballot.address);
            collected.push(CollectedSlot {
                reserved,
                inputs_hash,
            });
        }

        if !failed_keys.is_empty() {
            let _ = self.queues.mark_failed(&failed_keys, &failed_vote_ids).await;
        }

        (collected, leftover)
    }

    /// Builds and submits an aggregation proof over `collected`, isolating
    /// and re-attempting with the survivors up to `retries_left` times if
    /// proving fails (spec §9 open question on proving-failure retries).
    async fn prove_and_finish(
        &self,
        process_id: ProcessId,
        collected: Vec<CollectedSlot>,
        retries_left: u32,
    ) {
        let batch_slots = self.config.batch_slots;
        let valid_count = collected.len() as u32;

        let mut proofs = Vec::with_capacity(batch_slots);
        let mut padded_hashes = Vec::with_capacity(batch_slots);
        let mut verified_ballots = Vec::with_capacity(collected.len());
        let mut processed_keys = Vec::with_capacity(collected.len());
        let mut vote_ids = Vec::with_capacity(collected.len());

        for slot in &collected {
            proofs.push(slot.reserved.item.proof.clone());
            padded_hashes.push(slot.inputs_hash);
            verified_ballots.push(slot.reserved.item.clone());
            processed_keys.push(slot.reserved.key.clone());
            vote_ids.push(slot.reserved.item.ballot.vote_id);
        }

        let mut padding_constant = [0u8; 32];
        padding_constant[31] = 1;

        for slot_index in valid_count..batch_slots as u32 {
            match self.circuit.dummy_vote_proof(slot_index) {
                Ok(dummy) => {
                    padded_hashes.push(padding_constant);
                    proofs.push(dummy.clone());
                    verified_ballots.push(VerifiedBallot {
                        ballot: dummy_ballot(process_id),
                        proof: dummy,
                        census_proof: self.tree_store.dummy_proof(process_id).unwrap_or(
                            sequencer_interface::model::CensusProof {
                                bytes: vec![0u8; 40],
                                is_dummy: true,
                            },
                        ),
                    });
                }
                Err(e) => {
                    tracing::error!(%process_id, error = %e, "failed to build dummy vote proof");
                    return;
                }
            }
        }

        let batch_inputs_hash = mimc7::mimc7_hash_bytes(&padded_hashes);

        let aggregation_proof = match self.circuit.prove_aggregation(&proofs, batch_inputs_hash) {
            Ok(proof) => proof,
            Err(e) => {
                tracing::error!(%process_id, error = %e, "aggregation proving failed; isolating bad ballots");
                let survivors = self.isolate_after_proving_failure(collected).await;
                if retries_left > 0 && !survivors.is_empty() {
                    Box::pin(self.prove_and_finish(process_id, survivors, retries_left - 1)).await;
                } else {
                    self.release_collected(&survivors).await;
                }
                return;
            }
        };

        let batch_id = batch_inputs_hash;
        let batch = AggregatorBatch {
            process_id,
            batch_id,
            slots: verified_ballots,
            valid_count,
            proof: aggregation_proof,
            batch_inputs_hash,
        };

        if let Err(e) = self.queues.push_aggregator_batch(batch).await {
            tracing::error!(%process_id, error = %e, "failed to push aggregator batch");
            for key in &processed_keys {
                let _ = self.queues.release(&[key.clone()]).await;
            }
            return;
        }
        if let Err(e) = self.queues.mark_done(&processed_keys).await {
            tracing::error!(%process_id, error = %e, "failed to mark verified ballots done");
        }
        let _ = self.vote_ids.set_batch(&vote_ids, VoteIdStatus::Aggregated).await;
        update_metrics(|m| m.batches_aggregated.inc());
    }

    /// Defensive isolation after a failed aggregation attempt (spec §4.5):
    /// re-verify every real ballot's proof, mark the guilty ones failed, and
    /// return the innocent survivors (still reserved) so the caller may
    /// either retry proving with them or release them back to the queue.
    async fn isolate_after_proving_failure(&self, collected: Vec<CollectedSlot>) -> Vec<CollectedSlot> {
        let mut failed_keys = Vec::new();
        let mut failed_vote_ids = Vec::new();
        let mut survivors = Vec::new();

        for slot in collected {
            let verified = &slot.reserved.item;
            let ok = self
                .circuit
                .verify_vote(&verified.proof, true, slot.inputs_hash)
                .unwrap_or(false);
            if ok {
                survivors.push(slot);
            } else {
                failed_keys.push(slot.reserved.key.clone());
                failed_vote_ids.push(verified.ballot.vote_id);
            }
        }

        if !failed_keys.is_empty() {
            let _ = self.queues.mark_failed(&failed_keys, &failed_vote_ids).await;
        }
        survivors
    }
}

impl AggregateWorker {
    /// Releases a retry budget's worth of surviving, still-reserved slots
    /// back to the queue once no more proving attempts remain.
    async fn release_collected(&self, collected: &[CollectedSlot]) {
        for slot in collected {
            let _ = self.queues.release(&[slot.reserved.key.clone()]).await;
        }
    }
}

fn dummy_ballot(process_id: ProcessId) -> sequencer_interface::model::Ballot {
    sequencer_interface::model::Ballot {
        process_id,
        vote_id: sequencer_interface::VoteId::new([0u8; 32]),
        address: sequencer_interface::Address::new([0u8; 32]),
        weight: 0,
        encrypted_ballot: sequencer_interface::model::EncryptedBallot {
            ciphertexts: vec![[0u8; 32]],
        },
        signature: [0u8; 64],
        voter_public_key: [0u8; 33],
        census_proof: sequencer_interface::model::CensusProof {
            bytes: vec![0u8; 40],
            is_dummy: true,
        },
        inner_ballot_proof: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mock_chain_client::InMemoryProcessStateStore;
    use mock_circuit_backend::circuits::BATCH_SLOTS;
    use mock_circuit_backend::MockCircuitBackend;
    use sequencer_interface::model::{CensusProof, EncryptedBallot};
    use sequencer_interface::traits::QueueStore;
    use sequencer_interface::{Address, ProcessId, VoteId};
    use sequencer_state::SequencerState;
    use tempfile::TempDir;

    use super::*;

    fn verified_ballot(circuit: &MockCircuitBackend, process_id: ProcessId, tag: u8) -> VerifiedBallot {
        let ballot = sequencer_interface::model::Ballot {
            process_id,
            vote_id: VoteId::new([tag; 32]),
            address: Address::new([tag; 32]),
            weight: 1,
            encrypted_ballot: EncryptedBallot {
                ciphertexts: vec![[tag; 32]],
            },
            signature: [0u8; 64],
            voter_public_key: [0u8; 33],
            census_proof: CensusProof {
                bytes: vec![tag; 40],
                is_dummy: false,
            },
            inner_ballot_proof: Vec::new(),
        };
        let inputs_hash = mimc7::mimc7_hash_bytes(&[[tag; 32]]);
        let proof = circuit.prove_and_verify_vote(&ballot, inputs_hash).unwrap();
        VerifiedBallot {
            ballot: ballot.clone(),
            proof,
            census_proof: ballot.census_proof,
        }
    }

    struct Harness {
        _dir: TempDir,
        tree_store: Arc<InMemoryProcessStateStore>,
        worker: AggregateWorker,
    }

    fn harness(batch_slots: usize, batch_window: Duration) -> Harness {
        let dir = TempDir::new().unwrap();
        let state = SequencerState::open(dir.path()).unwrap();
        let tree_store = Arc::new(InMemoryProcessStateStore::new());
        let circuit = Arc::new(MockCircuitBackend::new().unwrap());
        let worker = AggregateWorker::new(
            Arc::new(state.queues),
            state.vote_ids,
            Arc::new(state.processes),
            tree_store.clone(),
            circuit,
            AggregateWorkerConfig {
                tick_period: Duration::from_millis(10),
                batch_slots,
                batch_window,
                proving_retry_limit: 1,
                holder: [1u8; 16],
            },
        );
        Harness {
            _dir: dir,
            tree_store,
            worker,
        }
    }

    #[tokio::test]
    async fn aggregates_a_full_batch_and_advances_vote_ids_to_aggregated() {
        let h = harness(BATCH_SLOTS, Duration::ZERO);
        let pid = ProcessId::new([4u8; 32]);
        h.worker.processes.add(pid, 0).unwrap();
        h.tree_store.register(pid, 64);
        let circuit = MockCircuitBackend::new().unwrap();

        let mut vote_ids = Vec::new();
        for tag in 0..BATCH_SLOTS as u8 {
            let verified = verified_ballot(&circuit, pid, tag + 1);
            vote_ids.push(verified.ballot.vote_id);
            h.worker.queues.push_verified(verified).await.unwrap();
        }

        h.worker.process_one(pid).await;

        for vote_id in vote_ids {
            assert_eq!(h.worker.vote_ids.get(vote_id).await, Some(VoteIdStatus::Aggregated));
        }
        assert_eq!(h.worker.queues.verified_count(pid).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn collect_rejects_ballots_with_an_empty_census_proof() {
        let h = harness(BATCH_SLOTS, Duration::ZERO);
        let pid = ProcessId::new([5u8; 32]);
        let circuit = MockCircuitBackend::new().unwrap();
        let mut bad = verified_ballot(&circuit, pid, 9);
        bad.census_proof = CensusProof {
            bytes: vec![],
            is_dummy: false,
        };
        let vote_id = bad.ballot.vote_id;
        let key = h.worker.queues.push_verified(bad.clone()).await.unwrap();
        let reserved = sequencer_interface::traits::Reserved { key, item: bad };

        let (collected, leftover) = h
            .worker
            .collect_aggregation_batch_inputs(pid, vec![reserved])
            .await;

        assert!(collected.is_empty());
        assert!(leftover.is_empty());
        assert_eq!(h.worker.vote_ids.get(vote_id).await, Some(VoteIdStatus::Error));
    }

    #[tokio::test]
    async fn collect_keeps_only_the_first_ballot_per_address() {
        let h = harness(BATCH_SLOTS, Duration::ZERO);
        let pid = ProcessId::new([6u8; 32]);
        let circuit = MockCircuitBackend::new().unwrap();
        let mut second = verified_ballot(&circuit, pid, 20);
        second.ballot.address = Address::new([7u8; 32]);

        let first = verified_ballot(&circuit, pid, 21);
        let mut dup = first.clone();
        dup.ballot.vote_id = VoteId::new([99u8; 32]);
        dup.ballot.address = first.ballot.address;

        let key_first = h.worker.queues.push_verified(first.clone()).await.unwrap();
        let key_dup = h.worker.queues.push_verified(dup.clone()).await.unwrap();

        let (collected, _leftover) = h
            .worker
            .collect_aggregation_batch_inputs(
                pid,
                vec![
                    sequencer_interface::traits::Reserved {
                        key: key_first,
                        item: first,
                    },
                    sequencer_interface::traits::Reserved {
                        key: key_dup,
                        item: dup.clone(),
                    },
                ],
            )
            .await;

        assert_eq!(collected.len(), 1);
        assert_eq!(
            h.worker.vote_ids.get(dup.ballot.vote_id).await,
            Some(VoteIdStatus::Error)
        );
    }
}
