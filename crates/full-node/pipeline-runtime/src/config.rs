//! Sequencer configuration, loaded from a single TOML file the way the
//! teacher's rollup loads its `RollupConfig` (spec §1 ambient "configuration").

use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Top-level sequencer configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct SequencerConfig {
    /// Where the queue store / vote-id tracker / process registry persist state.
    pub storage: StorageConfig,
    /// Worker tick cadences (spec §4.4–§4.7).
    pub workers: WorkerIntervals,
    /// Aggregation batch shape and timing (spec §4.5).
    pub aggregation: AggregationConfig,
    /// On-chain wait-for-inclusion timeouts (spec §5).
    pub on_chain: OnChainTimeouts,
    /// KZG trusted setup and blob-sidecar shape (spec §4.8).
    pub blob: BlobConfig,
    /// The worker-mode HTTP server (spec §6), if this node exposes one.
    pub worker_mode: Option<WorkerModeConfig>,
    /// What the Ballot Worker does with a ballot whose process-id is not
    /// registered (spec §9 open question: "do not guess — expose a
    /// configuration knob"). Defaults to the source's undefined-but-observed
    /// behavior of leaving the item reserved.
    #[serde(default)]
    pub unregistered_process: UnregisteredProcessPolicy,
}

/// Disposition of a Pending ballot whose process-id is unknown to the
/// Process Registry (spec §4.4 step 2, §9).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UnregisteredProcessPolicy {
    /// Leave the reservation in place, matching the observed source
    /// behavior; an operator must release it manually.
    #[default]
    LeaveReserved,
    /// Release the reservation so another tick may re-attempt it once the
    /// process is registered.
    Release,
    /// Delete the ballot and transition its vote-id to `Error`.
    Delete,
}

/// Where durable state lives on disk.
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct StorageConfig {
    /// Directory backing the `rockbound` database.
    pub path: PathBuf,
}

/// Tick cadences for the four pipeline workers (spec §4.4–§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct WorkerIntervals {
    /// Ballot Worker tick period, in milliseconds. Spec default: 1000.
    pub ballot_tick_ms: u64,
    /// Aggregate Worker tick period, in milliseconds. Spec default: 10000.
    pub aggregate_tick_ms: u64,
    /// State-Transition Worker tick period, in milliseconds.
    pub state_transition_tick_ms: u64,
    /// On-chain Worker tick period, in milliseconds.
    pub on_chain_tick_ms: u64,
}

impl Default for WorkerIntervals {
    fn default() -> Self {
        Self {
            ballot_tick_ms: 1_000,
            aggregate_tick_ms: 10_000,
            state_transition_tick_ms: 1_000,
            on_chain_tick_ms: 10_000,
        }
    }
}

/// Batch shape and the batch-time-window fallback (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct AggregationConfig {
    /// Number of verified ballots per aggregator batch (`B` in the spec).
    /// Must match the batch shape the configured `CircuitBackend` was set up
    /// with (spec §9 open question: aggregation batch size is a deployment
    /// parameter, not a protocol constant).
    pub batch_slots: usize,
    /// How long the Aggregate Worker waits for `B` ballots to accumulate
    /// before proceeding with fewer, once the first ballot in the window
    /// arrived (spec §4.5 step 3).
    pub batch_window_secs: u64,
    /// How many times the Aggregate Worker retries aggregation proving for
    /// the same collected batch, after isolating any ballot that fails
    /// re-verification, before giving up on the remainder for this tick
    /// (spec §9 open question: proving-failure retries are a deployment
    /// parameter, not a protocol constant). Spec default: 1 (no retry;
    /// isolate once and let the next tick re-collect the remainder).
    #[serde(default = "default_proving_retry_limit")]
    pub proving_retry_limit: u32,
}

fn default_proving_retry_limit() -> u32 {
    1
}

/// KZG trusted setup location and blob-sidecar shape (spec §4.8).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct BlobConfig {
    /// Path to the trusted-setup file consumed by [`c_kzg`]-backed commitment
    /// and proof generation.
    pub trusted_setup_path: PathBuf,
    /// Whether to build a full EIP-7594 cell-proof sidecar instead of a
    /// single EIP-4844 opening proof (spec §4.8).
    #[serde(default)]
    pub eip7594: bool,
}

/// Wait-for-inclusion deadlines enforced by the On-chain Worker (spec §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct OnChainTimeouts {
    /// State-transition submissions: spec default 30 minutes.
    pub state_transition_secs: u64,
    /// Results submissions: spec default 2 minutes.
    pub results_secs: u64,
}

impl Default for OnChainTimeouts {
    fn default() -> Self {
        Self {
            state_transition_secs: 30 * 60,
            results_secs: 2 * 60,
        }
    }
}

/// Configuration for an HTTP server exposed by the node.
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct HttpServerConfig {
    /// Server host.
    pub bind_host: String,
    /// Server port.
    pub bind_port: u16,
}

/// The worker-mode HTTP protocol server and its remote-worker policy (spec §6).
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct WorkerModeConfig {
    /// Where the worker-mode HTTP server listens.
    pub http: HttpServerConfig,
    /// Shared-secret token remote workers must present.
    pub shared_secret: String,
    /// Cooldown after a `busy`/`banned` response or 10 consecutive other
    /// errors, in seconds. Spec default: 30.
    pub cooldown_secs: u64,
    /// Consecutive non-auth errors before a worker backs off. Spec default: 10.
    pub backoff_after_n_errors: u32,
}

/// Reads a TOML file as a specific configuration type.
pub fn from_toml_path<P: AsRef<Path>, R: DeserializeOwned>(path: P) -> anyhow::Result<R> {
    let contents = std::fs::read_to_string(path)?;
    tracing::debug!(size_in_bytes = contents.len(), "parsing config file");
    let result: R = toml::from_str(&contents)?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn create_config_from(content: &str) -> NamedTempFile {
        let mut config_file = NamedTempFile::new().unwrap();
        config_file.write_all(content.as_bytes()).unwrap();
        config_file
    }

    #[test]
    fn parses_a_complete_config() {
        let config = r#"
            [storage]
            path = "/tmp/sequencer"
            [workers]
            ballot_tick_ms = 1000
            aggregate_tick_ms = 10000
            state_transition_tick_ms = 10000
            on_chain_tick_ms = 5000
            [aggregation]
            batch_slots = 8
            batch_window_secs = 120
            [on_chain]
            state_transition_secs = 1800
            results_secs = 120
            [blob]
            trusted_setup_path = "/tmp/trusted_setup.txt"
            [worker_mode]
            shared_secret = "s3cr3t"
            cooldown_secs = 30
            backoff_after_n_errors = 10
            [worker_mode.http]
            bind_host = "127.0.0.1"
            bind_port = 8080
        "#;

        let config_file = create_config_from(config);
        let parsed: SequencerConfig = from_toml_path(config_file.path()).unwrap();
        assert_eq!(parsed.aggregation.batch_slots, 8);
        assert_eq!(parsed.on_chain.state_transition_secs, 1800);
        assert_eq!(
            parsed.worker_mode.as_ref().unwrap().http.bind_port,
            8080
        );
    }
}
