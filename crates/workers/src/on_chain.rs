//! The On-chain Worker (spec §4.7): two independent tickers submit finished
//! state-transition batches and finalized results to the settlement chain.

use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ConstantBuilder, Retryable};
use pipeline_runtime::ShutdownSignal;
use sequencer_interface::model::PendingTxKind;
use sequencer_interface::traits::{OnChainClient, QueueStore, TxOutcome, VoteIdTracker};
use sequencer_interface::status::VoteIdStatus;
use sequencer_interface::ProcessId;
use sequencer_metrics::update_metrics;
use sequencer_state::ProcessRegistry;

/// Configuration for one [`OnChainWorker`] instance.
pub struct OnChainWorkerConfig {
    /// Transition-ticker period (spec default: 10 s).
    pub transition_tick_period: Duration,
    /// Results-ticker period (spec default: 10 s).
    pub results_tick_period: Duration,
    /// Wait-for-inclusion deadline for state transitions (spec default: 30 min).
    pub state_transition_timeout: Duration,
    /// Wait-for-inclusion deadline for results (spec default: 2 min).
    pub results_timeout: Duration,
    /// This worker's reservation holder token.
    pub holder: [u8; 16],
}

/// Submits finished batches and results to the chain (spec §4.7).
pub struct OnChainWorker {
    queues: Arc<dyn QueueStore>,
    vote_ids: Arc<dyn VoteIdTracker>,
    processes: Arc<ProcessRegistry>,
    chain: Arc<dyn OnChainClient>,
    config: OnChainWorkerConfig,
}

impl OnChainWorker {
    /// Builds a new On-chain Worker over the given collaborators.
    pub fn new(
        queues: Arc<dyn QueueStore>,
        vote_ids: Arc<dyn VoteIdTracker>,
        processes: Arc<ProcessRegistry>,
        chain: Arc<dyn OnChainClient>,
        config: OnChainWorkerConfig,
    ) -> Self {
        Self {
            queues,
            vote_ids,
            processes,
            chain,
            config,
        }
    }

    /// Runs both tickers until `shutdown` is triggered (spec §4.7, §5): one
    /// dedicated worker thread drives each, per the spec's "one dedicated
    /// worker thread per stage"; here they share this worker's async task
    /// but suspend independently via `tokio::join!`.
    pub async fn run(&self, shutdown: ShutdownSignal) {
        let mut transition_shutdown = shutdown.clone();
        let mut results_shutdown = shutdown;
        let transition_period = self.config.transition_tick_period;
        let results_period = self.config.results_tick_period;

        tokio::join!(
            transition_shutdown.run_ticked(transition_period, || self.transition_tick()),
            results_shutdown.run_ticked(results_period, || self.results_tick()),
        );
    }

    async fn transition_tick(&self) {
        for process_id in self.processes.list() {
            self.submit_one_transition(process_id).await;
        }
    }

    async fn submit_one_transition(&self, process_id: ProcessId) {
        let reserved = match self
            .queues
            .next_state_transition_batch(process_id, self.config.holder)
            .await
        {
            Ok(reserved) => reserved,
            Err(e) if e.is_no_more_elements() => return,
            Err(e) => {
                tracing::warn!(%process_id, error = %e, "failed to reserve a state-transition batch");
                return;
            }
        };
        let batch = reserved.item;
        let vote_ids: Vec<_> = batch
            .aggregator_batch
            .slots
            .iter()
            .take(batch.aggregator_batch.valid_count as usize)
            .map(|v| v.ballot.vote_id)
            .collect();

        let on_chain_root = match self.chain.current_state_root(process_id).await {
            Ok(root) => root,
            Err(e) => {
                tracing::warn!(%process_id, error = %e, "failed to read on-chain state root");
                let _ = self.queues.release(&[reserved.key]).await;
                return;
            }
        };

        if on_chain_root != batch.root_before {
            tracing::info!(%process_id, "state-transition batch is outdated; restoring to Aggregated");
            let _ = self.queues.mark_state_transition_outdated(batch.aggregator_batch.batch_id).await;
            let _ = self.vote_ids.set_batch(&vote_ids, VoteIdStatus::Aggregated).await;
            return;
        }

        let handle = match self.chain.submit_state_transition(&batch).await {
            Ok(handle) => handle,
            Err(sequencer_interface::SequencerError::StateRootMismatch) => {
                let _ = self.queues.mark_state_transition_outdated(batch.aggregator_batch.batch_id).await;
                let _ = self.vote_ids.set_batch(&vote_ids, VoteIdStatus::Aggregated).await;
                return;
            }
            Err(e) => {
                tracing::error!(%process_id, error = %e, "state-transition submission failed");
                let _ = self.queues.mark_failed(&[reserved.key], &vote_ids).await;
                let _ = self
                    .queues
                    .prune_pending_tx(PendingTxKind::StateTransition, process_id)
                    .await;
                return;
            }
        };

        let outcome = self
            .chain
            .wait_for_inclusion(&handle, self.config.state_transition_timeout)
            .await;
        let _ = self
            .queues
            .prune_pending_tx(PendingTxKind::StateTransition, process_id)
            .await;

        match outcome {
            Ok(TxOutcome::Included) => {
                let _ = self.queues.mark_done(&[reserved.key]).await;
                let _ = self.vote_ids.set_batch(&vote_ids, VoteIdStatus::Settled).await;
                update_metrics(|m| m.state_transitions_submitted.inc());
            }
            Ok(TxOutcome::Failed) | Err(_) => {
                tracing::warn!(%process_id, "state-transition submission timed out or failed");
                let _ = self.queues.mark_failed(&[reserved.key], &vote_ids).await;
                update_metrics(|m| m.on_chain_timeouts.inc());
            }
        }
    }

    async fn results_tick(&self) {
        loop {
            let reserved = match self.queues.next_verified_results(self.config.holder).await {
                Ok(reserved) => reserved,
                Err(e) if e.is_no_more_elements() => return,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to reserve verified results");
                    return;
                }
            };
            self.submit_one_results(reserved.key, reserved.item).await;
        }
    }

    /// Submits one finalized-results item, retrying the submission itself up
    /// to 3 times with a 2-second inter-attempt delay (spec §4.7). On final
    /// failure the item is still marked done so the queue is not blocked.
    async fn submit_one_results(
        &self,
        key: Vec<u8>,
        results: sequencer_interface::model::VerifiedResults,
    ) {
        let chain = Arc::clone(&self.chain);
        let results_ref = &results;
        let submit = || async { chain.submit_results(results_ref).await };

        let backoff = ConstantBuilder::default()
            .with_delay(Duration::from_secs(2))
            .with_max_times(3);
        let handle = submit.retry(&backoff).await;

        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(process_id = %results.process_id, error = %e, "results submission failed after retries; discarding");
                let _ = self.queues.mark_done(&[key]).await;
                return;
            }
        };

        let outcome = self.chain.wait_for_inclusion(&handle, self.config.results_timeout).await;
        match outcome {
            Ok(TxOutcome::Included) => {
                let _ = self.queues.mark_done(&[key]).await;
            }
            Ok(TxOutcome::Failed) | Err(_) => {
                tracing::warn!(process_id = %results.process_id, "results inclusion timed out; discarding");
                let _ = self.queues.mark_done(&[key]).await;
                update_metrics(|m| m.on_chain_timeouts.inc());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mock_chain_client::MockOnChainClient;
    use sequencer_interface::model::{AggregatorBatch, BlobCommitment, BlobSidecar, RecursiveProof};
    use sequencer_interface::traits::QueueStore;
    use sequencer_interface::ProcessId;
    use sequencer_state::SequencerState;
    use tempfile::TempDir;

    use super::*;

    fn sample_batch(
        process_id: ProcessId,
        root_before: [u8; 32],
        root_after: [u8; 32],
    ) -> StateTransitionBatch {
        StateTransitionBatch {
            aggregator_batch: AggregatorBatch {
                process_id,
                batch_id: [7u8; 32],
                slots: vec![],
                valid_count: 0,
                proof: RecursiveProof {
                    bytes: vec![],
                    is_dummy: true,
                },
                batch_inputs_hash: [0u8; 32],
            },
            root_before,
            root_after,
            voters_count: 0,
            overwritten_votes_count: 0,
            census_root: [0u8; 32],
            blob_commitment: BlobCommitment {
                limbs: vec![],
                claimed_value: [0u8; 32],
                evaluation_point: [0u8; 32],
            },
            blob_sidecar: BlobSidecar {
                blob: vec![],
                proofs: vec![],
            },
            proof: RecursiveProof {
                bytes: vec![],
                is_dummy: true,
            },
            blob_version_hash: [0u8; 32],
        }
    }

    struct Harness {
        _dir: TempDir,
        chain: Arc<MockOnChainClient>,
        worker: OnChainWorker,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let state = SequencerState::open(dir.path()).unwrap();
        let chain = Arc::new(MockOnChainClient::new());
        let worker = OnChainWorker::new(
            Arc::new(state.queues),
            state.vote_ids,
            Arc::new(state.processes),
            chain.clone(),
            OnChainWorkerConfig {
                transition_tick_period: Duration::from_millis(10),
                results_tick_period: Duration::from_millis(10),
                state_transition_timeout: Duration::from_millis(500),
                results_timeout: Duration::from_millis(500),
                holder: [1u8; 16],
            },
        );
        Harness {
            _dir: dir,
            chain,
            worker,
        }
    }

    #[tokio::test]
    async fn submits_a_current_state_transition_and_marks_it_done() {
        let h = harness();
        let pid = ProcessId::new([1u8; 32]);
        h.worker.processes.add(pid, 0).unwrap();

        let batch = sample_batch(pid, [0u8; 32], [2u8; 32]);
        h.worker.queues.push_state_transition(batch).await.unwrap();

        h.worker.submit_one_transition(pid).await;

        assert_eq!(h.chain.current_state_root(pid).await.unwrap(), [2u8; 32]);
        assert!(h
            .worker
            .queues
            .next_state_transition_batch(pid, [2u8; 16])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn restores_an_outdated_batch_to_aggregated() {
        let h = harness();
        let pid = ProcessId::new([2u8; 32]);
        h.worker.processes.add(pid, 0).unwrap();
        h.chain.seed_root(pid, [9u8; 32]).await;

        let batch = sample_batch(pid, [0u8; 32], [2u8; 32]);
        h.worker.queues.push_state_transition(batch).await.unwrap();

        h.worker.submit_one_transition(pid).await;

        // The batch was restored rather than left reserved or dropped: a
        // fresh reservation attempt finds it again.
        let reserved = h
            .worker
            .queues
            .next_state_transition_batch(pid, [3u8; 16])
            .await
            .unwrap();
        assert_eq!(reserved.item.root_before, [0u8; 32]);
    }

    #[tokio::test]
    async fn submits_verified_results_and_marks_them_done() {
        let h = harness();
        let pid = ProcessId::new([3u8; 32]);
        h.worker.processes.add(pid, 0).unwrap();
        h.worker
            .queues
            .push_verified_results(sequencer_interface::model::VerifiedResults {
                process_id: pid,
                proof: RecursiveProof {
                    bytes: vec![],
                    is_dummy: true,
                },
                tallies: vec![3, 4],
            })
            .await
            .unwrap();

        h.worker.results_tick().await;

        assert!(h
            .worker
            .queues
            .next_verified_results([2u8; 16])
            .await
            .is_err());
    }
}
