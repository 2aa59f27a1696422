//! An in-memory [`OnChainClient`] used by tests and the reference worker
//! deployment (spec §1 Out of scope, §4.7), modeled on the teacher's
//! [`crate::storable::service::StorableMockDaService`]: state lives behind an
//! `Arc<RwLock<..>>`, and inclusion waits poll on a `tokio::time::interval`
//! raced against a deadline via `tokio::select!`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use sequencer_interface::model::{StateTransitionBatch, VerifiedResults};
use sequencer_interface::traits::{OnChainClient, TxHandle, TxOutcome};
use sequencer_interface::{ProcessId, SequencerError};

type Result<T> = std::result::Result<T, SequencerError>;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Clone, Copy, Debug)]
struct TxRecord {
    outcome: TxOutcome,
    ready_at: Instant,
}

struct ChainState {
    roots: HashMap<ProcessId, [u8; 32]>,
    txs: HashMap<Vec<u8>, TxRecord>,
    next_id: u64,
}

impl ChainState {
    fn new() -> Self {
        Self {
            roots: HashMap::new(),
            txs: HashMap::new(),
            next_id: 0,
        }
    }

    fn next_handle(&mut self, tag: u8) -> Vec<u8> {
        let id = self.next_id;
        self.next_id += 1;
        let mut bytes = Vec::with_capacity(9);
        bytes.push(tag);
        bytes.extend_from_slice(&id.to_be_bytes());
        bytes
    }
}

/// A simulated chain: submitting a state transition applies its root
/// transition immediately and advances `current_state_root`; inclusion is
/// reported `inclusion_delay` later, to exercise callers that poll.
pub struct MockOnChainClient {
    state: Arc<RwLock<ChainState>>,
    inclusion_delay: Duration,
}

impl MockOnChainClient {
    /// Creates a client whose submissions are reported included immediately.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ChainState::new())),
            inclusion_delay: Duration::ZERO,
        }
    }

    /// Creates a client that reports inclusion only after `delay` has
    /// elapsed, to exercise [`OnChainClient::wait_for_inclusion`] callers.
    pub fn with_inclusion_delay(delay: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(ChainState::new())),
            inclusion_delay: delay,
        }
    }

    /// Seeds the genesis root for `process_id`, as an external finalizer
    /// would when a process is created.
    pub async fn seed_root(&self, process_id: ProcessId, root: [u8; 32]) {
        self.state.write().await.roots.insert(process_id, root);
    }
}

impl Default for MockOnChainClient {
    fn default() -> Self {
        Self::new()
    }
}

const TAG_STATE_TRANSITION: u8 = 0;
const TAG_RESULTS: u8 = 1;

#[async_trait]
impl OnChainClient for MockOnChainClient {
    async fn current_state_root(&self, process_id: ProcessId) -> Result<[u8; 32]> {
        Ok(self
            .state
            .read()
            .await
            .roots
            .get(&process_id)
            .copied()
            .unwrap_or([0u8; 32]))
    }

    async fn submit_state_transition(&self, batch: &StateTransitionBatch) -> Result<TxHandle> {
        let process_id = batch.aggregator_batch.process_id;
        let mut state = self.state.write().await;
        let current = state.roots.get(&process_id).copied().unwrap_or([0u8; 32]);
        if current != batch.root_before {
            return Err(SequencerError::StateRootMismatch);
        }
        state.roots.insert(process_id, batch.root_after);

        let handle = state.next_handle(TAG_STATE_TRANSITION);
        state.txs.insert(
            handle.clone(),
            TxRecord {
                outcome: TxOutcome::Included,
                ready_at: Instant::now() + self.inclusion_delay,
            },
        );
        Ok(TxHandle(handle))
    }

    async fn submit_results(&self, results: &VerifiedResults) -> Result<TxHandle> {
        let mut state = self.state.write().await;
        let handle = state.next_handle(TAG_RESULTS);
        let _ = results.process_id;
        state.txs.insert(
            handle.clone(),
            TxRecord {
                outcome: TxOutcome::Included,
                ready_at: Instant::now() + self.inclusion_delay,
            },
        );
        Ok(TxHandle(handle))
    }

    async fn wait_for_inclusion(&self, handle: &TxHandle, timeout: Duration) -> Result<TxOutcome> {
        let deadline = Instant::now() + timeout;
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let state = self.state.read().await;
                    let Some(record) = state.txs.get(&handle.0) else {
                        return Err(SequencerError::NotFound);
                    };
                    if Instant::now() >= record.ready_at {
                        return Ok(record.outcome);
                    }
                }
                _ = tokio::time::sleep_until(deadline.into()) => {
                    return Ok(TxOutcome::Failed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sequencer_interface::model::{AggregatorBatch, BlobCommitment, BlobSidecar, RecursiveProof};

    fn sample_batch(process_id: ProcessId, root_before: [u8; 32], root_after: [u8; 32]) -> StateTransitionBatch {
        StateTransitionBatch {
            aggregator_batch: AggregatorBatch {
                process_id,
                batch_id: [0u8; 32],
                slots: vec![],
                valid_count: 0,
                proof: RecursiveProof { bytes: vec![], is_dummy: true },
                batch_inputs_hash: [0u8; 32],
            },
            root_before,
            root_after,
            voters_count: 0,
            overwritten_votes_count: 0,
            census_root: [0u8; 32],
            blob_commitment: BlobCommitment { limbs: vec![], claimed_value: [0u8; 32], evaluation_point: [0u8; 32] },
            blob_sidecar: BlobSidecar { blob: vec![], proofs: vec![] },
            proof: RecursiveProof { bytes: vec![], is_dummy: true },
            blob_version_hash: [0u8; 32],
        }
    }

    #[tokio::test]
    async fn rejects_a_submission_against_a_stale_root() {
        let client = MockOnChainClient::new();
        let process_id = ProcessId::from([1u8; 32]);
        client.seed_root(process_id, [1u8; 32]).await;

        let batch = sample_batch(process_id, [9u8; 32], [2u8; 32]);
        let err = client.submit_state_transition(&batch).await.unwrap_err();
        assert!(matches!(err, SequencerError::StateRootMismatch));
    }

    #[tokio::test]
    async fn advances_the_root_and_reports_inclusion() {
        let client = MockOnChainClient::new();
        let process_id = ProcessId::from([1u8; 32]);
        let batch = sample_batch(process_id, [0u8; 32], [2u8; 32]);

        let handle = client.submit_state_transition(&batch).await.unwrap();
        assert_eq!(client.current_state_root(process_id).await.unwrap(), [2u8; 32]);

        let outcome = client
            .wait_for_inclusion(&handle, Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(outcome, TxOutcome::Included);
    }

    #[tokio::test]
    async fn times_out_when_inclusion_is_delayed_past_the_deadline() {
        let client = MockOnChainClient::with_inclusion_delay(Duration::from_secs(10));
        let process_id = ProcessId::from([1u8; 32]);
        let batch = sample_batch(process_id, [0u8; 32], [2u8; 32]);

        let handle = client.submit_state_transition(&batch).await.unwrap();
        let outcome = client
            .wait_for_inclusion(&handle, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(outcome, TxOutcome::Failed);
    }
}
