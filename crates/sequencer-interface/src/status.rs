//! The vote-id status lifecycle (spec §3, §4.2).
//!
//! `Settled` is terminal. `Error` and `Timeout` are reachable from any
//! non-`Settled` state. The only rollback edge is `Processed -> Aggregated`,
//! used when an on-chain state root mismatch is detected.

use serde::{Deserialize, Serialize};

/// The seven-valued status tag attached to every vote-id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteIdStatus {
    /// Submitted, not yet verified by the Ballot Worker.
    Pending,
    /// Verified by the Ballot Worker, awaiting aggregation.
    Verified,
    /// Included in an aggregator batch.
    Aggregated,
    /// Included in a state-transition batch awaiting on-chain settlement.
    Processed,
    /// Settled on-chain. Terminal and immutable.
    Settled,
    /// Terminal failure; no further processing will occur.
    Error,
    /// The owning process ended before this vote-id reached a terminal status.
    Timeout,
}

impl VoteIdStatus {
    /// Returns whether `self -> next` is a permitted edge in the transition graph.
    pub fn can_transition_to(self, next: Self) -> bool {
        use VoteIdStatus::*;
        if self == Settled {
            return false;
        }
        match (self, next) {
            (Pending, Verified) => true,
            (Verified, Aggregated) => true,
            (Aggregated, Processed) => true,
            (Processed, Settled) => true,
            // the single rollback edge, for on-chain state-root mismatch
            (Processed, Aggregated) => true,
            (_, Error) | (_, Timeout) => true,
            _ => false,
        }
    }

    /// Returns the lower-case wire string for this status (spec §6).
    pub fn as_wire_str(self) -> &'static str {
        match self {
            VoteIdStatus::Pending => "pending",
            VoteIdStatus::Verified => "verified",
            VoteIdStatus::Aggregated => "aggregated",
            VoteIdStatus::Processed => "processed",
            VoteIdStatus::Settled => "settled",
            VoteIdStatus::Error => "error",
            VoteIdStatus::Timeout => "timeout",
        }
    }

    /// Whether no further transition out of this status is ever permitted.
    pub fn is_terminal(self) -> bool {
        matches!(self, VoteIdStatus::Settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settled_has_no_outgoing_edges() {
        for next in [
            VoteIdStatus::Pending,
            VoteIdStatus::Verified,
            VoteIdStatus::Aggregated,
            VoteIdStatus::Processed,
            VoteIdStatus::Settled,
            VoteIdStatus::Error,
            VoteIdStatus::Timeout,
        ] {
            assert!(!VoteIdStatus::Settled.can_transition_to(next));
        }
    }

    #[test]
    fn forward_path_is_permitted() {
        assert!(VoteIdStatus::Pending.can_transition_to(VoteIdStatus::Verified));
        assert!(VoteIdStatus::Verified.can_transition_to(VoteIdStatus::Aggregated));
        assert!(VoteIdStatus::Aggregated.can_transition_to(VoteIdStatus::Processed));
        assert!(VoteIdStatus::Processed.can_transition_to(VoteIdStatus::Settled));
    }

    #[test]
    fn single_rollback_edge() {
        assert!(VoteIdStatus::Processed.can_transition_to(VoteIdStatus::Aggregated));
        assert!(!VoteIdStatus::Aggregated.can_transition_to(VoteIdStatus::Pending));
        assert!(!VoteIdStatus::Settled.can_transition_to(VoteIdStatus::Aggregated));
    }

    #[test]
    fn error_and_timeout_reachable_from_any_non_settled_state() {
        for status in [
            VoteIdStatus::Pending,
            VoteIdStatus::Verified,
            VoteIdStatus::Aggregated,
            VoteIdStatus::Processed,
        ] {
            assert!(status.can_transition_to(VoteIdStatus::Error));
            assert!(status.can_transition_to(VoteIdStatus::Timeout));
        }
    }
}
