//! Durable persistence for the sequencer: the queue store, the vote-id
//! status tracker, and the process registry, all backed by a single
//! `rockbound::DB` instance so a crash-consistent snapshot covers every
//! table at once.

pub mod process_registry;
pub mod queue_store;
pub mod schema;
pub mod vote_id_tracker;

use std::sync::Arc;

pub use process_registry::ProcessRegistry;
pub use queue_store::QueueDb;
pub use vote_id_tracker::VoteIdTrackerImpl;

/// The three durable components sharing one `rockbound::DB` handle
/// (dependency order per the system overview: Queue Store -> Vote-ID
/// Tracker -> Process Registry). `vote_ids` is the single tracker
/// instance `queues` writes status through, so the two never diverge.
pub struct SequencerState {
    /// The durable queue store.
    pub queues: QueueDb,
    /// The vote-id status tracker.
    pub vote_ids: Arc<VoteIdTrackerImpl>,
    /// The process registry.
    pub processes: ProcessRegistry,
}

impl SequencerState {
    /// Opens all three components against one database directory.
    pub fn open(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let db = Arc::new(rockbound::DB::open(
            path,
            "sequencer-state",
            schema::ALL_COLUMN_FAMILIES.to_vec(),
            &rocksdb::Options::default(),
        )?);
        let vote_ids = Arc::new(VoteIdTrackerImpl::new(db.clone())?);
        Ok(Self {
            queues: QueueDb::from_handle(db.clone(), vote_ids.clone()),
            vote_ids,
            processes: ProcessRegistry::new(db)?,
        })
    }
}
