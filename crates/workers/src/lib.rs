//! The four pipeline workers that move a ballot from Pending through to
//! Settled (spec §4.4–§4.7): one dedicated async task per stage, each built
//! on [`pipeline_runtime::loop_driver`]'s ticked, cancellation-aware loop.

pub mod aggregate;
pub mod ballot;
pub mod on_chain;
pub mod state_transition;

pub use aggregate::{AggregateWorker, AggregateWorkerConfig};
pub use ballot::{BallotWorker, BallotWorkerConfig};
pub use on_chain::{OnChainWorker, OnChainWorkerConfig};
pub use state_transition::{StateTransitionWorker, StateTransitionWorkerConfig};
