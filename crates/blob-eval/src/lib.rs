//! Barycentric polynomial-opening circuit helpers for the EIP-4844/7594
//! blob commitment (spec §4.8): the bit-reversed evaluation domain, the
//! hint-based quotient identity, evaluation-point hashing, and the KZG
//! commitment/opening contract built on `c-kzg`.

pub mod commitment;
pub mod domain;
pub mod evaluation;

pub use commitment::{blob_version_hash, KzgContext};
pub use domain::Domain;
pub use evaluation::{
    compute_quotient_hints, evaluate_barycentric, hash_evaluation_point, poseidon_blob_hash,
    verify_quotient_hints, QuotientHints,
};
