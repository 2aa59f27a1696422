//! Shared runtime scaffolding for the sequencer's pipeline workers: the
//! TOML-driven [`config`] and the ticked, cancellation-aware [`loop_driver`]
//! every worker in the `sequencer-workers` crate is built on (spec §4.4–§4.7,
//! §5).

pub mod config;
pub mod loop_driver;

pub use config::{
    from_toml_path, AggregationConfig, BlobConfig, HttpServerConfig, OnChainTimeouts,
    SequencerConfig, StorageConfig, UnregisteredProcessPolicy, WorkerIntervals, WorkerModeConfig,
};
pub use loop_driver::{shutdown_channel, Shutdown, ShutdownSignal};
