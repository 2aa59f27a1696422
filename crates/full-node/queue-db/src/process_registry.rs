//! The concurrent process-id registry (spec §4.3): `add`/`remove`/`exists`/
//! `list`/`len`, plus the idempotent first-ballot-time bookkeeping the
//! Aggregate Worker uses to decide when its batch-time-window has elapsed.
//!
//! `for_each` snapshots the map before invoking its callback so callers may
//! freely acquire other locks without risking deadlock (spec §4.3, §5).

use std::sync::Arc;

use dashmap::DashMap;
use rockbound::DB;
use sequencer_interface::ProcessId;

use crate::schema::{ProcessKey, ProcessRegistryTable};

/// A process's bookkeeping record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, borsh::BorshSerialize, borsh::BorshDeserialize)]
pub struct ProcessRecord {
    /// Unix timestamp (seconds) of the last registry touch.
    pub last_update: u64,
    /// Unix timestamp of the first Verified ballot observed since the last
    /// aggregation, if any.
    pub first_ballot_time: Option<u64>,
}

/// The durable, concurrent process registry.
pub struct ProcessRegistry {
    db: Arc<DB>,
    processes: DashMap<ProcessId, ProcessRecord>,
}

impl ProcessRegistry {
    /// Loads the registry from an already-open database.
    pub fn new(db: Arc<DB>) -> anyhow::Result<Self> {
        let processes = DashMap::new();
        for row in db.iter::<ProcessRegistryTable>()? {
            let (key, bytes) = row?.into_tuple();
            let record: ProcessRecord = borsh::from_slice(&bytes)?;
            processes.insert(ProcessId(key.0), record);
        }
        Ok(Self { db, processes })
    }

    fn persist(&self, process_id: ProcessId, record: ProcessRecord) -> anyhow::Result<()> {
        let bytes = borsh::to_vec(&record)?;
        self.db
            .put::<ProcessRegistryTable>(&ProcessKey(process_id.0), &bytes)?;
        Ok(())
    }

    /// Registers `process_id`, or touches its last-update time if already present.
    pub fn add(&self, process_id: ProcessId, now: u64) -> anyhow::Result<()> {
        let record = ProcessRecord {
            last_update: now,
            first_ballot_time: self
                .processes
                .get(&process_id)
                .and_then(|r| r.first_ballot_time),
        };
        self.processes.insert(process_id, record);
        self.persist(process_id, record)
    }

    /// Removes `process_id` from the registry.
    pub fn remove(&self, process_id: ProcessId) -> anyhow::Result<()> {
        self.processes.remove(&process_id);
        self.db.delete::<ProcessRegistryTable>(&ProcessKey(process_id.0))?;
        Ok(())
    }

    /// Whether `process_id` is currently registered.
    pub fn exists(&self, process_id: ProcessId) -> bool {
        self.processes.contains_key(&process_id)
    }

    /// A snapshot of every registered process id.
    pub fn list(&self) -> Vec<ProcessId> {
        self.processes.iter().map(|e| *e.key()).collect()
    }

    /// The number of registered processes.
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Invokes `f` once per registered process id, over a snapshot taken
    /// before iteration begins, so `f` may freely call back into this
    /// registry or acquire other locks.
    pub fn for_each(&self, mut f: impl FnMut(ProcessId)) {
        for process_id in self.list() {
            f(process_id);
        }
    }

    /// Idempotently records the time of the first Verified ballot observed
    /// since the last aggregation for `process_id`.
    pub fn set_first_ballot_time(&self, process_id: ProcessId, now: u64) -> anyhow::Result<()> {
        let mut record = self.processes.get(&process_id).map(|r| *r).unwrap_or_default();
        if record.first_ballot_time.is_some() {
            return Ok(());
        }
        record.first_ballot_time = Some(now);
        record.last_update = now;
        self.processes.insert(process_id, record);
        self.persist(process_id, record)
    }

    /// Clears the first-ballot-time marker, called after every aggregation
    /// attempt regardless of whether it produced a batch.
    pub fn clear_first_ballot_time(&self, process_id: ProcessId) -> anyhow::Result<()> {
        let mut record = self.processes.get(&process_id).map(|r| *r).unwrap_or_default();
        record.first_ballot_time = None;
        self.processes.insert(process_id, record);
        self.persist(process_id, record)
    }

    /// The recorded first-ballot-time, if any.
    pub fn get_first_ballot_time(&self, process_id: ProcessId) -> Option<u64> {
        self.processes.get(&process_id).and_then(|r| r.first_ballot_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_registry() -> (TempDir, ProcessRegistry) {
        let dir = TempDir::new().unwrap();
        let db = DB::open(
            dir.path(),
            "test",
            crate::schema::ALL_COLUMN_FAMILIES.to_vec(),
            &rocksdb::Options::default(),
        )
        .unwrap();
        (dir, ProcessRegistry::new(Arc::new(db)).unwrap())
    }

    #[test]
    fn first_ballot_time_is_idempotent() {
        let (_dir, registry) = open_registry();
        let pid = ProcessId::new([9u8; 32]);
        registry.add(pid, 100).unwrap();
        registry.set_first_ballot_time(pid, 200).unwrap();
        registry.set_first_ballot_time(pid, 300).unwrap();
        assert_eq!(registry.get_first_ballot_time(pid), Some(200));
        registry.clear_first_ballot_time(pid).unwrap();
        assert_eq!(registry.get_first_ballot_time(pid), None);
    }

    #[test]
    fn for_each_snapshots_before_iterating() {
        let (_dir, registry) = open_registry();
        registry.add(ProcessId::new([1u8; 32]), 1).unwrap();
        registry.add(ProcessId::new([2u8; 32]), 1).unwrap();
        let mut seen = Vec::new();
        registry.for_each(|pid| {
            seen.push(pid);
            let _ = registry.add(pid, 2);
        });
        assert_eq!(seen.len(), 2);
    }
}
