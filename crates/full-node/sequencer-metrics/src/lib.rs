//! Prometheus metrics for the voting rollup sequencer (spec §1 ambient
//! "metrics", carried even though the spec's non-goals exclude a metrics
//! pipeline of its own).

#![deny(missing_docs)]

use std::sync::OnceLock;

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, IntCounter, IntGauge,
};

/// Applies a function to the global [`Metrics`] instance if and only if the
/// `native` feature is enabled.
pub fn update_metrics<F>(f: F)
where
    F: FnOnce(&Metrics),
{
    if cfg!(feature = "native") {
        static METRICS: OnceLock<Metrics> = OnceLock::new();

        f(OnceLock::get_or_init(&METRICS, || {
            Metrics::new(prometheus::default_registry())
                .expect("failed to create new metrics; this is a bug in the sequencer")
        }));
    }
}

/// Prometheus metrics for the four pipeline workers and the queue store.
///
/// Values of this type are only accessible through the [`update_metrics`] function.
#[derive(Debug)]
pub struct Metrics {
    /// Ballots that completed vote-verification (spec §4.4).
    pub ballots_verified: IntCounter,
    /// Ballots that failed structural validation or proving (spec §4.4, §7).
    pub ballots_rejected: IntCounter,
    /// Aggregator batches produced (spec §4.5).
    pub batches_aggregated: IntCounter,
    /// State-transition batches submitted on-chain (spec §4.6, §4.7).
    pub state_transitions_submitted: IntCounter,
    /// On-chain submissions that timed out waiting for inclusion (spec §4.7).
    pub on_chain_timeouts: IntCounter,
    /// Current depth of the `pending` queue, sampled each Ballot Worker tick.
    pub pending_queue_depth: IntGauge,
    /// Current depth of the `verified` queue, sampled each Aggregate Worker tick.
    pub verified_queue_depth: IntGauge,
}

impl Metrics {
    fn new(registry: &prometheus::Registry) -> prometheus::Result<Self> {
        let ballots_verified = register_int_counter_with_registry!(
            "sequencer_ballots_verified_total",
            "Ballots that completed vote-verification",
            registry,
        )?;

        let ballots_rejected = register_int_counter_with_registry!(
            "sequencer_ballots_rejected_total",
            "Ballots that failed structural validation or proving",
            registry,
        )?;

        let batches_aggregated = register_int_counter_with_registry!(
            "sequencer_batches_aggregated_total",
            "Aggregator batches produced",
            registry,
        )?;

        let state_transitions_submitted = register_int_counter_with_registry!(
            "sequencer_state_transitions_submitted_total",
            "State-transition batches submitted on-chain",
            registry,
        )?;

        let on_chain_timeouts = register_int_counter_with_registry!(
            "sequencer_on_chain_timeouts_total",
            "On-chain submissions that timed out waiting for inclusion",
            registry,
        )?;

        let pending_queue_depth = register_int_gauge_with_registry!(
            "sequencer_pending_queue_depth",
            "Current depth of the pending queue",
            registry,
        )?;

        let verified_queue_depth = register_int_gauge_with_registry!(
            "sequencer_verified_queue_depth",
            "Current depth of the verified queue",
            registry,
        )?;

        Ok(Self {
            ballots_verified,
            ballots_rejected,
            batches_aggregated,
            state_transitions_submitted,
            on_chain_timeouts,
            pending_queue_depth,
            verified_queue_depth,
        })
    }
}
