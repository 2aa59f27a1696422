//! Newtype identifiers used throughout the pipeline.
//!
//! Every id is a 32-byte value wrapped so that process ids, vote ids, and
//! addresses can never be swapped for one another at a call site.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::common::hex_string::HexString;

macro_rules! id_newtype {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Clone,
            Copy,
            Debug,
            Default,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            BorshSerialize,
            BorshDeserialize,
        )]
        #[cfg_attr(feature = "arbitrary", derive(proptest_derive::Arbitrary))]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Builds an id from raw bytes.
            pub const fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Returns the underlying bytes.
            pub const fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", HexString::new(self.0))
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                HexString::new(self.0).serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                HexString::<[u8; 32]>::deserialize(deserializer).map(|h| Self(h.0))
            }
        }
    };
}

id_newtype!(ProcessId, "Identifies a single voting process.");
id_newtype!(VoteId, "Unique per submitted ballot, stable for its whole lifecycle.");
id_newtype!(Address, "A voter's address as recorded in the census tree.");

/// Identifies a worker-mode sequencer instance, used in the worker HTTP protocol (§6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SequencerUuid(pub [u8; 16]);

impl std::fmt::Display for SequencerUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", HexString::new(self.0))
    }
}
