//! The sequencer's error taxonomy (spec §7), following the two-tier scheme
//! the teacher uses for `ProverServiceError`: a closed set of domain variants
//! plus an `Other` escape hatch for truly unexpected failures.

/// Errors produced by the queue store, vote-id tracker, and workers.
#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    /// A ballot or batch failed structural validation (subgroup membership,
    /// non-zero fields, well-formed signature).
    #[error("structurally invalid: {0}")]
    StructuralInvalid(String),

    /// The target process is not currently accepting votes.
    #[error("process is not accepting votes")]
    NotAcceptingVotes,

    /// Two Pending ballots were submitted with the same vote-id.
    #[error("duplicate vote-id")]
    DuplicateVoteId,

    /// Two valid ballots in the same batch share an address.
    #[error("duplicate address in batch")]
    DuplicateAddressInBatch,

    /// The census cap has been reached and the address is not already known.
    #[error("census cap exceeded")]
    CensusCapExceeded,

    /// The circuit backend failed to produce a proof.
    #[error("proof generation failed: {0}")]
    ProofGenerationFailure(String),

    /// A proof failed re-verification against its verifying key.
    #[error("proof verification failed")]
    ProofVerificationFailure,

    /// A curve point failed subgroup-membership checks.
    #[error("subgroup check failed")]
    SubgroupCheckFailure,

    /// The locally computed `root_before` does not match the on-chain root.
    #[error("state root mismatch")]
    StateRootMismatch,

    /// A batch was applied but the tree root did not advance.
    #[error("state root unchanged after applying a non-empty batch")]
    StateRootUnchanged,

    /// Blob assembly, commitment, or evaluation failed.
    #[error("blob construction failed: {0}")]
    BlobConstructionFailure(String),

    /// The on-chain client rejected or failed to broadcast a transaction.
    #[error("on-chain submission failed: {0}")]
    OnChainSubmissionFailure(String),

    /// A submitted transaction was not mined within its deadline.
    #[error("on-chain confirmation timed out")]
    OnChainTimeout,

    /// Sentinel for an empty queue. Never logged as an error.
    #[error("no more elements")]
    NoMoreElements,

    /// The requested item does not exist.
    #[error("not found")]
    NotFound,

    /// An operation conflicted with an existing reservation.
    #[error("reservation conflict")]
    ReservationConflict,

    /// Any other failure, propagated from a dependency.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SequencerError {
    /// Whether this error is the `NoMoreElements` sentinel, which callers
    /// should treat as "nothing to do" rather than a failure to log.
    pub fn is_no_more_elements(&self) -> bool {
        matches!(self, SequencerError::NoMoreElements)
    }
}

/// Convenience alias for fallible sequencer operations.
pub type Result<T> = std::result::Result<T, SequencerError>;
