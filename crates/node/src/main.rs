//! The reference sequencer binary: opens the durable state, wires the four
//! pipeline workers over the mock chain/circuit adapters, optionally serves
//! the worker-mode HTTP protocol, and runs until `SIGINT`/`SIGTERM`.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use ballot_ingress::{SharedSecretAuth, WorkerServer};
use blob_eval::{Domain, KzgContext};
use clap::Parser;
use mock_chain_client::{InMemoryProcessStateStore, MockBallotCipher, MockOnChainClient};
use mock_circuit_backend::MockCircuitBackend;
use pipeline_runtime::{from_toml_path, shutdown_channel, SequencerConfig};
use sequencer_state::SequencerState;
use sequencer_workers::{
    AggregateWorker, AggregateWorkerConfig, BallotWorker, BallotWorkerConfig, OnChainWorker,
    OnChainWorkerConfig, StateTransitionWorker, StateTransitionWorkerConfig,
};
use tracing_subscriber::{fmt, EnvFilter};

/// A single reservation-holder token for every worker owned by this process
/// (spec §4.2 "holder": an opaque per-process-instance token distinguishing
/// this node's reservations from any other's).
fn holder_token() -> [u8; 16] {
    let pid = std::process::id().to_le_bytes();
    let mut holder = [0u8; 16];
    holder[..4].copy_from_slice(&pid);
    holder
}

fn initialize_logging() {
    fmt()
        .with_env_filter(
            EnvFilter::from_str(
                &std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            )
            .expect("invalid RUST_LOG filter"),
        )
        .init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Zero-knowledge voting rollup sequencer", long_about = None)]
struct Args {
    /// Path to the sequencer's TOML configuration file.
    #[arg(long, default_value = "sequencer_config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    initialize_logging();
    let args = Args::parse();

    let config: SequencerConfig =
        from_toml_path(&args.config).with_context(|| format!("reading {}", args.config))?;
    tracing::info!(path = %args.config, "loaded sequencer configuration");

    let state = SequencerState::open(&config.storage.path)
        .with_context(|| format!("opening durable state at {:?}", config.storage.path))?;
    let queues = Arc::new(state.queues);
    let vote_ids = state.vote_ids;
    let processes = Arc::new(state.processes);

    let tree_store = Arc::new(InMemoryProcessStateStore::new());
    let cipher = Arc::new(MockBallotCipher::new());
    let chain = Arc::new(MockOnChainClient::new());
    let circuit = Arc::new(
        MockCircuitBackend::new().context("setting up the mock circuit backend")?,
    );
    let kzg = Arc::new(
        KzgContext::load(&config.blob.trusted_setup_path)
            .with_context(|| format!("loading KZG trusted setup from {:?}", config.blob.trusted_setup_path))?,
    );
    let domain = Arc::new(Domain::new());

    let holder = holder_token();

    let ballot_worker = BallotWorker::new(
        queues.clone(),
        vote_ids.clone(),
        processes.clone(),
        tree_store.clone(),
        circuit.clone(),
        BallotWorkerConfig {
            tick_period: std::time::Duration::from_millis(config.workers.ballot_tick_ms),
            holder,
            unregistered_process: config.unregistered_process,
        },
    );
    let aggregate_worker = AggregateWorker::new(
        queues.clone(),
        vote_ids.clone(),
        processes.clone(),
        tree_store.clone(),
        circuit.clone(),
        AggregateWorkerConfig {
            tick_period: std::time::Duration::from_millis(config.workers.aggregate_tick_ms),
            batch_slots: config.aggregation.batch_slots,
            batch_window: std::time::Duration::from_secs(config.aggregation.batch_window_secs),
            proving_retry_limit: config.aggregation.proving_retry_limit,
            holder,
        },
    );
    let state_transition_worker = StateTransitionWorker::new(
        queues.clone(),
        vote_ids.clone(),
        processes.clone(),
        tree_store.clone(),
        cipher.clone(),
        circuit.clone(),
        kzg.clone(),
        domain.clone(),
        StateTransitionWorkerConfig {
            tick_period: std::time::Duration::from_millis(config.workers.state_transition_tick_ms),
            holder,
            eip7594: config.blob.eip7594,
        },
    );
    let on_chain_worker = OnChainWorker::new(
        queues.clone(),
        vote_ids.clone(),
        processes.clone(),
        chain.clone(),
        OnChainWorkerConfig {
            transition_tick_period: std::time::Duration::from_millis(config.workers.on_chain_tick_ms),
            results_tick_period: std::time::Duration::from_millis(config.workers.on_chain_tick_ms),
            state_transition_timeout: std::time::Duration::from_secs(config.on_chain.state_transition_secs),
            results_timeout: std::time::Duration::from_secs(config.on_chain.results_secs),
            holder,
        },
    );

    let (shutdown, signal) = shutdown_channel();

    let mut tasks = tokio::task::JoinSet::new();
    {
        let signal = signal.clone();
        tasks.spawn(async move { ballot_worker.run(signal).await });
    }
    {
        let signal = signal.clone();
        tasks.spawn(async move { aggregate_worker.run(signal).await });
    }
    {
        let signal = signal.clone();
        tasks.spawn(async move { state_transition_worker.run(signal).await });
    }
    {
        let signal = signal.clone();
        tasks.spawn(async move { on_chain_worker.run(signal).await });
    }

    if let Some(worker_mode) = config.worker_mode.clone() {
        let server = WorkerServer::new(
            queues.clone(),
            vote_ids.clone(),
            processes.clone(),
            tree_store.clone(),
            Arc::new(SharedSecretAuth::new(worker_mode.shared_secret.clone())),
        );
        let addr = format!("{}:{}", worker_mode.http.bind_host, worker_mode.http.bind_port);
        tracing::info!(%addr, "serving the worker-mode HTTP protocol");
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding worker-mode HTTP server on {addr}"))?;
        let router = server.axum_router();
        tasks.spawn(async move {
            axum::serve(listener, router)
                .await
                .expect("worker-mode HTTP server exited unexpectedly");
        });
    }

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutdown requested; stopping all workers");
    shutdown.trigger();

    while tasks.join_next().await.is_some() {}
    Ok(())
}
