//! The in-memory, per-id-locked vote-id status tracker (spec §4.2), backed
//! by the same `rockbound::DB` the queue store uses so status survives a
//! restart. Grounded on the teacher's `FairMempool`'s "persist before
//! mutating in-memory state" discipline (`sov-sequencer/src/mempool.rs`).

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use rockbound::DB;
use sequencer_interface::traits::VoteIdTracker;
use sequencer_interface::{ProcessId, SequencerError, VoteId, VoteIdStatus};
use tracing::warn;

use crate::schema::VoteIdKey;

type Result<T> = std::result::Result<T, SequencerError>;

/// A `DashMap`-backed [`VoteIdTracker`], durable via `VoteIdStatusTable`.
pub struct VoteIdTrackerImpl {
    db: Arc<DB>,
    statuses: DashMap<VoteId, VoteIdStatus>,
}

impl VoteIdTrackerImpl {
    /// Builds a tracker over an already-open database, loading every known
    /// status into memory.
    pub fn new(db: Arc<DB>) -> anyhow::Result<Self> {
        let statuses = DashMap::new();
        for row in db.iter::<crate::schema::VoteIdStatusTable>()? {
            let (key, bytes) = row?.into_tuple();
            let status: VoteIdStatus = borsh::from_slice(&bytes)?;
            statuses.insert(VoteId(key.0), status);
        }
        Ok(Self { db, statuses })
    }

    fn persist(&self, vote_id: VoteId, status: VoteIdStatus) -> Result<()> {
        let bytes = borsh::to_vec(&status).map_err(|e| SequencerError::Other(e.into()))?;
        self.db
            .put::<crate::schema::VoteIdStatusTable>(&VoteIdKey(vote_id.0), &bytes)
            .map_err(|e| SequencerError::Other(e.into()))
    }
}

#[async_trait]
impl VoteIdTracker for VoteIdTrackerImpl {
    async fn get(&self, vote_id: VoteId) -> Option<VoteIdStatus> {
        self.statuses.get(&vote_id).map(|s| *s)
    }

    async fn set(&self, vote_id: VoteId, next: VoteIdStatus) -> Result<()> {
        // a vote-id's very first status is a registration, not a transition
        if let Some(current) = self.statuses.get(&vote_id).map(|s| *s) {
            if !current.can_transition_to(next) {
                warn!(?vote_id, from = ?current, to = ?next, "rejected illegal vote-id transition");
                return Err(SequencerError::Other(anyhow::anyhow!(
                    "illegal transition {:?} -> {:?}",
                    current,
                    next
                )));
            }
        }
        // persist before mutating the in-memory map, so a crash between the
        // two never leaves memory ahead of durable state
        self.persist(vote_id, next)?;
        self.statuses.insert(vote_id, next);
        Ok(())
    }

    async fn set_batch(&self, vote_ids: &[VoteId], next: VoteIdStatus) -> Result<()> {
        for vote_id in vote_ids {
            self.set(*vote_id, next).await?;
        }
        Ok(())
    }

    async fn timeout_sweep(&self, _process_id: ProcessId, vote_ids: &[VoteId]) -> Result<usize> {
        let mut swept = 0;
        for vote_id in vote_ids {
            let current = self.statuses.get(vote_id).map(|s| *s);
            if let Some(status) = current {
                if status.is_terminal() {
                    continue;
                }
                self.set(*vote_id, VoteIdStatus::Timeout).await?;
                swept += 1;
            }
        }
        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_tracker() -> (TempDir, VoteIdTrackerImpl) {
        let dir = TempDir::new().unwrap();
        let db = DB::open(
            dir.path(),
            "test",
            crate::schema::ALL_COLUMN_FAMILIES.to_vec(),
            &rocksdb::Options::default(),
        )
        .unwrap();
        let tracker = VoteIdTrackerImpl::new(Arc::new(db)).unwrap();
        (dir, tracker)
    }

    #[tokio::test]
    async fn forward_path_succeeds() {
        let (_dir, tracker) = open_tracker();
        let vote_id = VoteId::new([1u8; 32]);
        tracker.set(vote_id, VoteIdStatus::Pending).await.unwrap();
        tracker.set(vote_id, VoteIdStatus::Verified).await.unwrap();
        tracker.set(vote_id, VoteIdStatus::Aggregated).await.unwrap();
        tracker.set(vote_id, VoteIdStatus::Processed).await.unwrap();
        tracker.set(vote_id, VoteIdStatus::Settled).await.unwrap();
        assert_eq!(tracker.get(vote_id).await, Some(VoteIdStatus::Settled));
    }

    #[tokio::test]
    async fn settled_rejects_further_transitions() {
        let (_dir, tracker) = open_tracker();
        let vote_id = VoteId::new([2u8; 32]);
        tracker.set(vote_id, VoteIdStatus::Pending).await.unwrap();
        tracker.set(vote_id, VoteIdStatus::Verified).await.unwrap();
        tracker.set(vote_id, VoteIdStatus::Aggregated).await.unwrap();
        tracker.set(vote_id, VoteIdStatus::Processed).await.unwrap();
        tracker.set(vote_id, VoteIdStatus::Settled).await.unwrap();
        assert!(tracker.set(vote_id, VoteIdStatus::Error).await.is_err());
    }
}
