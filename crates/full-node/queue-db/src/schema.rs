//! `rockbound` column-family schemas for the queue store.
//!
//! The teacher's `sov-db` crate builds these from a `define_table_*!` macro
//! family; since that macro is itself defined outside the files retrieved
//! for this rewrite, each table here implements `rockbound::Schema` (and its
//! `KeyCodec`/`ValueCodec` companions) directly against borsh, which is the
//! same serialization rockbound's own macros bottom out in.

use anyhow::Context;
use borsh::{BorshDeserialize, BorshSerialize};
use rockbound::{CodecError, KeyCodec, Schema, SeekKeyEncoder, ValueCodec};

/// A borsh round-trip key or value codec, implemented once and reused by
/// every table below via the `borsh_codec!` macro.
fn encode_borsh<T: BorshSerialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    borsh::to_vec(value).map_err(|e| CodecError::Wrapped(anyhow::anyhow!(e).context("borsh encode")))
}

fn decode_borsh<T: BorshDeserialize>(data: &[u8]) -> Result<T, CodecError> {
    T::try_from_slice(data)
        .context("borsh decode")
        .map_err(CodecError::Wrapped)
}

macro_rules! borsh_key_codec {
    ($schema:ty, $key:ty) => {
        impl KeyCodec<$schema> for $key {
            fn encode_key(&self) -> Result<Vec<u8>, CodecError> {
                encode_borsh(self)
            }
            fn decode_key(data: &[u8]) -> Result<Self, CodecError> {
                decode_borsh(data)
            }
        }
        impl SeekKeyEncoder<$schema> for $key {
            fn encode_seek_key(&self) -> Result<Vec<u8>, CodecError> {
                encode_borsh(self)
            }
        }
    };
}

macro_rules! borsh_value_codec {
    ($schema:ty, $value:ty) => {
        impl ValueCodec<$schema> for $value {
            fn encode_value(&self) -> Result<Vec<u8>, CodecError> {
                encode_borsh(self)
            }
            fn decode_value(data: &[u8]) -> Result<Self, CodecError> {
                decode_borsh(data)
            }
        }
    };
}

/// A 16-byte big-endian sequence key, giving FIFO order within a column
/// family (oldest pushed = lowest key = first returned by `next_unreserved`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, BorshSerialize, BorshDeserialize)]
pub struct SeqKey(pub u128);

impl SeqKey {
    /// Encodes as fixed-width big-endian bytes so RocksDB's lexicographic
    /// key ordering matches numeric ordering.
    pub fn to_be_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }
}

/// `pending` queue: sequence key -> borsh-encoded [`sequencer_interface::Ballot`].
#[derive(Clone, Copy, Debug)]
pub struct PendingQueue;
impl Schema for PendingQueue {
    const COLUMN_FAMILY_NAME: &'static str = "pending";
    type Key = SeqKey;
    type Value = Vec<u8>;
}
borsh_key_codec!(PendingQueue, SeqKey);
borsh_value_codec!(PendingQueue, Vec<u8>);

/// `verified` queue: sequence key -> borsh-encoded [`sequencer_interface::VerifiedBallot`].
#[derive(Clone, Copy, Debug)]
pub struct VerifiedQueue;
impl Schema for VerifiedQueue {
    const COLUMN_FAMILY_NAME: &'static str = "verified";
    type Key = SeqKey;
    type Value = Vec<u8>;
}
borsh_key_codec!(VerifiedQueue, SeqKey);
borsh_value_codec!(VerifiedQueue, Vec<u8>);

/// `aggregator` queue: sequence key -> borsh-encoded [`sequencer_interface::AggregatorBatch`].
#[derive(Clone, Copy, Debug)]
pub struct AggregatorQueue;
impl Schema for AggregatorQueue {
    const COLUMN_FAMILY_NAME: &'static str = "aggregator";
    type Key = SeqKey;
    type Value = Vec<u8>;
}
borsh_key_codec!(AggregatorQueue, SeqKey);
borsh_value_codec!(AggregatorQueue, Vec<u8>);

/// `state-transition` queue: sequence key -> borsh-encoded [`sequencer_interface::StateTransitionBatch`].
#[derive(Clone, Copy, Debug)]
pub struct StateTransitionQueue;
impl Schema for StateTransitionQueue {
    const COLUMN_FAMILY_NAME: &'static str = "state_transition";
    type Key = SeqKey;
    type Value = Vec<u8>;
}
borsh_key_codec!(StateTransitionQueue, SeqKey);
borsh_value_codec!(StateTransitionQueue, Vec<u8>);

/// `verified-results` queue: sequence key -> borsh-encoded [`sequencer_interface::VerifiedResults`].
#[derive(Clone, Copy, Debug)]
pub struct VerifiedResultsQueue;
impl Schema for VerifiedResultsQueue {
    const COLUMN_FAMILY_NAME: &'static str = "verified_results";
    type Key = SeqKey;
    type Value = Vec<u8>;
}
borsh_key_codec!(VerifiedResultsQueue, SeqKey);
borsh_value_codec!(VerifiedResultsQueue, Vec<u8>);

/// Reservations, shared across all five queues. Keyed by `(queue tag byte,
/// sequence key)` so reservation lookups stay colocated per queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, BorshSerialize, BorshDeserialize)]
pub struct ReservationKey {
    /// Which logical queue this reservation belongs to.
    pub queue_tag: u8,
    /// The reserved item's sequence key within that queue.
    pub seq: SeqKey,
}

#[derive(Clone, Copy, Debug)]
pub struct ReservationsTable;
impl Schema for ReservationsTable {
    const COLUMN_FAMILY_NAME: &'static str = "reservations";
    type Key = ReservationKey;
    type Value = Vec<u8>;
}
borsh_key_codec!(ReservationsTable, ReservationKey);
borsh_value_codec!(ReservationsTable, Vec<u8>);

/// Pending-tx bookkeeping, keyed by `(kind, process_id)` (spec §4.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, BorshSerialize, BorshDeserialize)]
pub struct PendingTxKey {
    /// 0 = StateTransition, 1 = Results.
    pub kind: u8,
    /// The owning process.
    pub process_id: [u8; 32],
}

#[derive(Clone, Copy, Debug)]
pub struct PendingTxTable;
impl Schema for PendingTxTable {
    const COLUMN_FAMILY_NAME: &'static str = "pending_tx";
    type Key = PendingTxKey;
    type Value = ();
}
borsh_key_codec!(PendingTxTable, PendingTxKey);
impl ValueCodec<PendingTxTable> for () {
    fn encode_value(&self) -> Result<Vec<u8>, CodecError> {
        Ok(Vec::new())
    }
    fn decode_value(_data: &[u8]) -> Result<Self, CodecError> {
        Ok(())
    }
}

/// Vote-id -> vote-id status, durable mirror of the in-memory tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, BorshSerialize, BorshDeserialize)]
pub struct VoteIdKey(pub [u8; 32]);

#[derive(Clone, Copy, Debug)]
pub struct VoteIdStatusTable;
impl Schema for VoteIdStatusTable {
    const COLUMN_FAMILY_NAME: &'static str = "vote_id_status";
    type Key = VoteIdKey;
    type Value = Vec<u8>;
}
borsh_key_codec!(VoteIdStatusTable, VoteIdKey);
borsh_value_codec!(VoteIdStatusTable, Vec<u8>);

/// Process-id -> borsh-encoded process registry record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, BorshSerialize, BorshDeserialize)]
pub struct ProcessKey(pub [u8; 32]);

#[derive(Clone, Copy, Debug)]
pub struct ProcessRegistryTable;
impl Schema for ProcessRegistryTable {
    const COLUMN_FAMILY_NAME: &'static str = "process_registry";
    type Key = ProcessKey;
    type Value = Vec<u8>;
}
borsh_key_codec!(ProcessRegistryTable, ProcessKey);
borsh_value_codec!(ProcessRegistryTable, Vec<u8>);

/// Every column family the queue store's `rockbound::DB::open` must declare.
pub const ALL_COLUMN_FAMILIES: &[&str] = &[
    PendingQueue::COLUMN_FAMILY_NAME,
    VerifiedQueue::COLUMN_FAMILY_NAME,
    AggregatorQueue::COLUMN_FAMILY_NAME,
    StateTransitionQueue::COLUMN_FAMILY_NAME,
    VerifiedResultsQueue::COLUMN_FAMILY_NAME,
    ReservationsTable::COLUMN_FAMILY_NAME,
    PendingTxTable::COLUMN_FAMILY_NAME,
    VoteIdStatusTable::COLUMN_FAMILY_NAME,
    ProcessRegistryTable::COLUMN_FAMILY_NAME,
];
