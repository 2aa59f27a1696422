//! The durable, crash-safe [`QueueStore`] implementation, backed by
//! `rockbound`. Grounded on the teacher's `SequencerDb` (`sov-sequencer/src/db.rs`):
//! one `Arc<rockbound::DB>`, one column family per logical table, writes
//! batched through `SchemaBatch` so push/reserve/mark operations are atomic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rockbound::{SchemaBatch, DB};
use sequencer_interface::model::{
    AggregatorBatch, Ballot, PendingTxKind, StateTransitionBatch, VerifiedBallot, VerifiedResults,
};
use sequencer_interface::traits::{QueueStore, Reserved, VoteIdTracker};
use sequencer_interface::{ProcessId, SequencerError, VoteId, VoteIdStatus};

use crate::schema::{
    AggregatorQueue, PendingQueue, PendingTxKey, PendingTxTable, ReservationKey,
    ReservationsTable, SeqKey, StateTransitionQueue, VerifiedQueue, VerifiedResultsQueue,
    ALL_COLUMN_FAMILIES,
};

type Result<T> = std::result::Result<T, SequencerError>;

const TAG_PENDING: u8 = 0;
const TAG_VERIFIED: u8 = 1;
const TAG_AGGREGATOR: u8 = 2;
const TAG_STATE_TRANSITION: u8 = 3;
const TAG_VERIFIED_RESULTS: u8 = 4;

fn gen_rocksdb_options() -> rocksdb::Options {
    let mut opts = rocksdb::Options::default();
    opts.create_if_missing(true);
    opts.create_missing_column_families(true);
    opts
}

/// Opens (or creates) the on-disk queue store at `path`.
pub struct QueueDb {
    db: Arc<DB>,
    next_seq: AtomicU64,
    vote_ids: Arc<dyn VoteIdTracker>,
}

impl QueueDb {
    /// Opens the database, creating every required column family.
    pub fn open(path: impl AsRef<std::path::Path>, vote_ids: Arc<dyn VoteIdTracker>) -> anyhow::Result<Self> {
        let db = DB::open(path, "sequencer-queues", ALL_COLUMN_FAMILIES.to_vec(), &gen_rocksdb_options())?;
        Ok(Self::from_handle(Arc::new(db), vote_ids))
    }

    /// Wraps an already-open database handle, shared with the vote-id
    /// tracker and process registry so all three tables live in one
    /// crash-consistent database. `vote_ids` must be the same tracker
    /// instance handed out elsewhere, so a status write made here is
    /// immediately visible through `VoteIdTracker::get`.
    pub fn from_handle(db: Arc<DB>, vote_ids: Arc<dyn VoteIdTracker>) -> Self {
        Self {
            db,
            next_seq: AtomicU64::new(0),
            vote_ids,
        }
    }

    /// Returns the shared database handle.
    pub fn db_handle(&self) -> Arc<DB> {
        self.db.clone()
    }

    fn next_seq_key(&self) -> SeqKey {
        SeqKey(self.next_seq.fetch_add(1, Ordering::SeqCst) as u128)
    }

    fn reserve_key(&self, queue_tag: u8, seq: SeqKey) -> ReservationKey {
        ReservationKey { queue_tag, seq }
    }

    /// Scans a queue column family for the oldest key that has no
    /// reservation, reserves it, and returns its sequence key plus payload
    /// bytes. Returns [`SequencerError::NoMoreElements`] when every item is
    /// either absent or already reserved.
    fn reserve_oldest<S>(&self, queue_tag: u8, holder: [u8; 16]) -> Result<(SeqKey, Vec<u8>)>
    where
        S: rockbound::Schema<Key = SeqKey, Value = Vec<u8>>,
    {
        let iter = self
            .db
            .iter::<S>()
            .map_err(|e| SequencerError::Other(e.into()))?;
        for row in iter {
            let (seq, bytes) = row.map_err(|e| SequencerError::Other(e.into()))?.into_tuple();
            let rkey = self.reserve_key(queue_tag, seq);
            let already_reserved = self
                .db
                .get::<ReservationsTable>(&rkey)
                .map_err(|e| SequencerError::Other(e.into()))?
                .is_some();
            if already_reserved {
                continue;
            }
            let reservation = sequencer_interface::model::Reservation {
                key: borsh::to_vec(&seq).map_err(|e| SequencerError::Other(e.into()))?,
                holder,
                reserved_at: now_unix(),
            };
            let bytes_encoded =
                borsh::to_vec(&reservation).map_err(|e| SequencerError::Other(e.into()))?;
            self.db
                .put::<ReservationsTable>(&rkey, &bytes_encoded)
                .map_err(|e| SequencerError::Other(e.into()))?;
            return Ok((seq, bytes));
        }
        Err(SequencerError::NoMoreElements)
    }

    fn decode<T: borsh::BorshDeserialize>(bytes: &[u8]) -> Result<T> {
        T::try_from_slice(bytes).map_err(|e| SequencerError::Other(e.into()))
    }

    fn encode<T: borsh::BorshSerialize>(value: &T) -> Result<Vec<u8>> {
        borsh::to_vec(value).map_err(|e| SequencerError::Other(e.into()))
    }

    fn key_for(queue_tag: u8, seq: SeqKey) -> Vec<u8> {
        let mut out = Vec::with_capacity(17);
        out.push(queue_tag);
        out.extend_from_slice(&seq.to_be_bytes());
        out
    }

    fn parse_key(key: &[u8]) -> Result<(u8, SeqKey)> {
        if key.len() != 17 {
            return Err(SequencerError::Other(anyhow::anyhow!("malformed queue key")));
        }
        let mut buf = [0u8; 16];
        buf.copy_from_slice(&key[1..]);
        Ok((key[0], SeqKey(u128::from_be_bytes(buf))))
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[async_trait]
impl QueueStore for QueueDb {
    async fn push_pending(&self, ballot: Ballot) -> Result<Vec<u8>> {
        if self.vote_ids.get(ballot.vote_id).await.is_some() {
            return Err(SequencerError::DuplicateVoteId);
        }
        let seq = self.next_seq_key();
        let mut batch = SchemaBatch::new();
        batch
            .put::<PendingQueue>(&seq, &Self::encode(&ballot)?)
            .map_err(|e| SequencerError::Other(e.into()))?;
        self.db
            .write_schemas(&batch)
            .map_err(|e| SequencerError::Other(e.into()))?;
        self.vote_ids.set(ballot.vote_id, VoteIdStatus::Pending).await?;
        Ok(Self::key_for(TAG_PENDING, seq))
    }

    async fn next_unreserved_pending(&self, holder: [u8; 16]) -> Result<Reserved<Ballot>> {
        let (seq, bytes) = self.reserve_oldest::<PendingQueue>(TAG_PENDING, holder)?;
        Ok(Reserved {
            key: Self::key_for(TAG_PENDING, seq),
            item: Self::decode(&bytes)?,
        })
    }

    async fn push_verified(&self, ballot: VerifiedBallot) -> Result<Vec<u8>> {
        let seq = self.next_seq_key();
        self.db
            .put::<VerifiedQueue>(&seq, &Self::encode(&ballot)?)
            .map_err(|e| SequencerError::Other(e.into()))?;
        Ok(Self::key_for(TAG_VERIFIED, seq))
    }

    async fn pull_verified(
        &self,
        process_id: ProcessId,
        max_n: usize,
        holder: [u8; 16],
    ) -> Result<Vec<Reserved<VerifiedBallot>>> {
        let iter = self
            .db
            .iter::<VerifiedQueue>()
            .map_err(|e| SequencerError::Other(e.into()))?;
        let mut seen_addresses = std::collections::HashSet::new();
        let mut out = Vec::new();
        for row in iter {
            if out.len() >= max_n {
                break;
            }
            let (seq, bytes) = row.map_err(|e| SequencerError::Other(e.into()))?.into_tuple();
            let rkey = self.reserve_key(TAG_VERIFIED, seq);
            if self
                .db
                .get::<ReservationsTable>(&rkey)
                .map_err(|e| SequencerError::Other(e.into()))?
                .is_some()
            {
                continue;
            }
            let ballot: VerifiedBallot = Self::decode(&bytes)?;
            if ballot.ballot.process_id != process_id {
                continue;
            }
            // oldest wins: at most one ballot per voter address in this pull
            if !seen_addresses.insert(ballot.ballot.address) {
                continue;
            }
            let reservation = sequencer_interface::model::Reservation {
                key: Self::key_for(TAG_VERIFIED, seq),
                holder,
                reserved_at: now_unix(),
            };
            self.db
                .put::<ReservationsTable>(&rkey, &Self::encode(&reservation)?)
                .map_err(|e| SequencerError::Other(e.into()))?;
            out.push(Reserved {
                key: Self::key_for(TAG_VERIFIED, seq),
                item: ballot,
            });
        }
        if out.is_empty() {
            return Err(SequencerError::NotFound);
        }
        Ok(out)
    }

    async fn push_aggregator_batch(&self, batch: AggregatorBatch) -> Result<Vec<u8>> {
        let seq = self.next_seq_key();
        self.db
            .put::<AggregatorQueue>(&seq, &Self::encode(&batch)?)
            .map_err(|e| SequencerError::Other(e.into()))?;
        Ok(Self::key_for(TAG_AGGREGATOR, seq))
    }

    async fn next_aggregator_batch(
        &self,
        process_id: ProcessId,
        holder: [u8; 16],
    ) -> Result<Reserved<AggregatorBatch>> {
        let iter = self
            .db
            .iter::<AggregatorQueue>()
            .map_err(|e| SequencerError::Other(e.into()))?;
        for row in iter {
            let (seq, bytes) = row.map_err(|e| SequencerError::Other(e.into()))?.into_tuple();
            let batch: AggregatorBatch = Self::decode(&bytes)?;
            if batch.process_id != process_id {
                continue;
            }
            let rkey = self.reserve_key(TAG_AGGREGATOR, seq);
            if self
                .db
                .get::<ReservationsTable>(&rkey)
                .map_err(|e| SequencerError::Other(e.into()))?
                .is_some()
            {
                continue;
            }
            let reservation = sequencer_interface::model::Reservation {
                key: Self::key_for(TAG_AGGREGATOR, seq),
                holder,
                reserved_at: now_unix(),
            };
            self.db
                .put::<ReservationsTable>(&rkey, &Self::encode(&reservation)?)
                .map_err(|e| SequencerError::Other(e.into()))?;
            return Ok(Reserved {
                key: Self::key_for(TAG_AGGREGATOR, seq),
                item: batch,
            });
        }
        Err(SequencerError::NoMoreElements)
    }

    async fn push_state_transition(&self, batch: StateTransitionBatch) -> Result<Vec<u8>> {
        let seq = self.next_seq_key();
        self.db
            .put::<StateTransitionQueue>(&seq, &Self::encode(&batch)?)
            .map_err(|e| SequencerError::Other(e.into()))?;
        Ok(Self::key_for(TAG_STATE_TRANSITION, seq))
    }

    async fn next_state_transition_batch(
        &self,
        process_id: ProcessId,
        holder: [u8; 16],
    ) -> Result<Reserved<StateTransitionBatch>> {
        let iter = self
            .db
            .iter::<StateTransitionQueue>()
            .map_err(|e| SequencerError::Other(e.into()))?;
        for row in iter {
            let (seq, bytes) = row.map_err(|e| SequencerError::Other(e.into()))?.into_tuple();
            let batch: StateTransitionBatch = Self::decode(&bytes)?;
            if batch.aggregator_batch.process_id != process_id {
                continue;
            }
            let rkey = self.reserve_key(TAG_STATE_TRANSITION, seq);
            if self
                .db
                .get::<ReservationsTable>(&rkey)
                .map_err(|e| SequencerError::Other(e.into()))?
                .is_some()
            {
                continue;
            }
            let reservation = sequencer_interface::model::Reservation {
                key: Self::key_for(TAG_STATE_TRANSITION, seq),
                holder,
                reserved_at: now_unix(),
            };
            self.db
                .put::<ReservationsTable>(&rkey, &Self::encode(&reservation)?)
                .map_err(|e| SequencerError::Other(e.into()))?;
            return Ok(Reserved {
                key: Self::key_for(TAG_STATE_TRANSITION, seq),
                item: batch,
            });
        }
        Err(SequencerError::NoMoreElements)
    }

    async fn push_verified_results(&self, results: VerifiedResults) -> Result<Vec<u8>> {
        let seq = self.next_seq_key();
        self.db
            .put::<VerifiedResultsQueue>(&seq, &Self::encode(&results)?)
            .map_err(|e| SequencerError::Other(e.into()))?;
        Ok(Self::key_for(TAG_VERIFIED_RESULTS, seq))
    }

    async fn next_verified_results(&self, holder: [u8; 16]) -> Result<Reserved<VerifiedResults>> {
        let (seq, bytes) = self.reserve_oldest::<VerifiedResultsQueue>(TAG_VERIFIED_RESULTS, holder)?;
        Ok(Reserved {
            key: Self::key_for(TAG_VERIFIED_RESULTS, seq),
            item: Self::decode(&bytes)?,
        })
    }

    async fn release(&self, keys: &[Vec<u8>]) -> Result<()> {
        let mut batch = SchemaBatch::new();
        for key in keys {
            let (tag, seq) = Self::parse_key(key)?;
            let rkey = self.reserve_key(tag, seq);
            batch
                .delete::<ReservationsTable>(&rkey)
                .map_err(|e| SequencerError::Other(e.into()))?;
        }
        self.db
            .write_schemas(&batch)
            .map_err(|e| SequencerError::Other(e.into()))
    }

    async fn mark_done(&self, keys: &[Vec<u8>]) -> Result<()> {
        let mut batch = SchemaBatch::new();
        for key in keys {
            let (tag, seq) = Self::parse_key(key)?;
            let rkey = self.reserve_key(tag, seq);
            batch
                .delete::<ReservationsTable>(&rkey)
                .map_err(|e| SequencerError::Other(e.into()))?;
            delete_from_tagged_queue(&mut batch, tag, seq)?;
        }
        self.db
            .write_schemas(&batch)
            .map_err(|e| SequencerError::Other(e.into()))
    }

    async fn mark_failed(&self, keys: &[Vec<u8>], vote_ids: &[VoteId]) -> Result<()> {
        let mut batch = SchemaBatch::new();
        for key in keys {
            let (tag, seq) = Self::parse_key(key)?;
            let rkey = self.reserve_key(tag, seq);
            batch
                .delete::<ReservationsTable>(&rkey)
                .map_err(|e| SequencerError::Other(e.into()))?;
            delete_from_tagged_queue(&mut batch, tag, seq)?;
        }
        self.db
            .write_schemas(&batch)
            .map_err(|e| SequencerError::Other(e.into()))?;
        self.vote_ids.set_batch(vote_ids, VoteIdStatus::Error).await
    }

    async fn verified_count(&self, process_id: ProcessId) -> Result<u64> {
        let iter = self
            .db
            .iter::<VerifiedQueue>()
            .map_err(|e| SequencerError::Other(e.into()))?;
        let mut count = 0u64;
        for row in iter {
            let (seq, bytes) = row.map_err(|e| SequencerError::Other(e.into()))?.into_tuple();
            let ballot: VerifiedBallot = Self::decode(&bytes)?;
            if ballot.ballot.process_id != process_id {
                continue;
            }
            let rkey = self.reserve_key(TAG_VERIFIED, seq);
            if self
                .db
                .get::<ReservationsTable>(&rkey)
                .map_err(|e| SequencerError::Other(e.into()))?
                .is_some()
            {
                continue;
            }
            count += 1;
        }
        Ok(count)
    }

    async fn has_pending_tx(&self, kind: PendingTxKind, process_id: ProcessId) -> Result<bool> {
        let key = PendingTxKey {
            kind: kind as u8,
            process_id: process_id.0,
        };
        Ok(self
            .db
            .get::<PendingTxTable>(&key)
            .map_err(|e| SequencerError::Other(e.into()))?
            .is_some())
    }

    async fn set_pending_tx(&self, kind: PendingTxKind, process_id: ProcessId) -> Result<()> {
        let key = PendingTxKey {
            kind: kind as u8,
            process_id: process_id.0,
        };
        self.db
            .put::<PendingTxTable>(&key, &())
            .map_err(|e| SequencerError::Other(e.into()))
    }

    async fn prune_pending_tx(&self, kind: PendingTxKind, process_id: ProcessId) -> Result<()> {
        let key = PendingTxKey {
            kind: kind as u8,
            process_id: process_id.0,
        };
        self.db
            .delete::<PendingTxTable>(&key)
            .map_err(|e| SequencerError::Other(e.into()))
    }

    async fn mark_state_transition_outdated(&self, batch_id: [u8; 32]) -> Result<()> {
        let iter = self
            .db
            .iter::<StateTransitionQueue>()
            .map_err(|e| SequencerError::Other(e.into()))?;
        for row in iter {
            let (seq, bytes) = row.map_err(|e| SequencerError::Other(e.into()))?.into_tuple();
            let batch: StateTransitionBatch = Self::decode(&bytes)?;
            if batch.aggregator_batch.batch_id != batch_id {
                continue;
            }
            let mut write = SchemaBatch::new();
            write
                .delete::<StateTransitionQueue>(&seq)
                .map_err(|e| SequencerError::Other(e.into()))?;
            let rkey = self.reserve_key(TAG_STATE_TRANSITION, seq);
            write
                .delete::<ReservationsTable>(&rkey)
                .map_err(|e| SequencerError::Other(e.into()))?;
            // Re-queue the aggregator batch unreserved so `next_aggregator_batch`
            // can pick it up again and a fresh state-transition batch gets built.
            let fresh_seq = self.next_seq_key();
            write
                .put::<AggregatorQueue>(&fresh_seq, &Self::encode(&batch.aggregator_batch)?)
                .map_err(|e| SequencerError::Other(e.into()))?;
            self.db
                .write_schemas(&write)
                .map_err(|e| SequencerError::Other(e.into()))?;
            let rolled_back: Vec<VoteId> = batch
                .aggregator_batch
                .slots
                .iter()
                .filter(|slot| !slot.proof.proof.is_dummy)
                .map(|slot| slot.ballot.vote_id)
                .collect();
            self.vote_ids.set_batch(&rolled_back, VoteIdStatus::Aggregated).await?;
            return Ok(());
        }
        Err(SequencerError::NotFound)
    }
}

fn delete_from_tagged_queue(batch: &mut SchemaBatch, tag: u8, seq: SeqKey) -> Result<()> {
    match tag {
        TAG_PENDING => batch.delete::<PendingQueue>(&seq),
        TAG_VERIFIED => batch.delete::<VerifiedQueue>(&seq),
        TAG_AGGREGATOR => batch.delete::<AggregatorQueue>(&seq),
        TAG_STATE_TRANSITION => batch.delete::<StateTransitionQueue>(&seq),
        TAG_VERIFIED_RESULTS => batch.delete::<VerifiedResultsQueue>(&seq),
        _ => return Err(SequencerError::Other(anyhow::anyhow!("unknown queue tag {tag}"))),
    }
    .map_err(|e| SequencerError::Other(e.into()))
}
