//! # Metrics
//!
//! Prometheus metrics for every stage of the pipeline: probes, gossip, quorum
//! aggregation, the replicated log, reputation and regional alerts.
//!
//! All recording goes through the `metrics` facade, so recording is lock-free and
//! cheap enough for the hot paths (every probe, every ingested vote). A single
//! process-wide Prometheus recorder is installed on first use; `render()` produces
//! the text exposition served on `/metrics`.
//!
//! Target URLs are used as label values. The target list is operator-configured,
//! so label cardinality stays bounded.

use crate::{raft::RaftRole, types::VoteStatus};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether `/metrics` is served. Defaults to `true`.
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn try_init_prometheus_recorder() -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError>
{
    PrometheusBuilder::new().install_recorder()
}

fn init_prometheus_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match try_init_prometheus_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "failed to install global prometheus recorder, using a detached recorder"
                );
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

fn role_gauge_value(role: RaftRole) -> f64 {
    match role {
        RaftRole::Follower => 0.0,
        RaftRole::Candidate => 1.0,
        RaftRole::Leader => 2.0,
    }
}

/// Records pipeline metrics into the global Prometheus recorder.
pub struct MetricsCollector {
    prometheus_handle: PrometheusHandle,
}

impl MetricsCollector {
    /// Creates a collector, installing the Prometheus recorder if this is the first one.
    ///
    /// # Errors
    ///
    /// Kept fallible so callers treat metrics setup as part of startup validation.
    pub fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self { prometheus_handle: init_prometheus_recorder() })
    }

    pub fn record_probe(&self, target: &str, status: VoteStatus, latency_ms: u64) {
        counter!("vigil_probes_total", "target" => target.to_string(), "status" => status.as_str())
            .increment(1);
        #[allow(clippy::cast_precision_loss)]
        histogram!("vigil_probe_latency_ms", "target" => target.to_string())
            .record(latency_ms as f64);
    }

    pub fn record_dns_lookup(&self, cache_hit: bool) {
        let result = if cache_hit { "hit" } else { "miss" };
        counter!("vigil_dns_cache_total", "result" => result).increment(1);
    }

    pub fn record_gossip_send(&self, peer: &str, success: bool) {
        let outcome = if success { "ok" } else { "failed" };
        counter!("vigil_gossip_sends_total", "peer" => peer.to_string(), "outcome" => outcome)
            .increment(1);
    }

    pub fn record_gossip_received(&self, accepted: bool) {
        let outcome = if accepted { "merged" } else { "ignored" };
        counter!("vigil_gossip_received_total", "outcome" => outcome).increment(1);
    }

    pub fn record_vote_ingested(&self, outcome: &'static str) {
        counter!("vigil_votes_ingested_total", "outcome" => outcome).increment(1);
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn record_pending_rounds(&self, pending: usize) {
        gauge!("vigil_pending_rounds").set(pending as f64);
    }

    pub fn record_verdict(&self, target: &str, status: VoteStatus) {
        counter!("vigil_verdicts_total", "target" => target.to_string(), "status" => status.as_str())
            .increment(1);
    }

    pub fn record_ttl_evictions(&self, evicted: usize) {
        counter!("vigil_ttl_evictions_total").increment(evicted as u64);
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn record_raft_state(&self, role: RaftRole, term: u64, commit_index: u64, last_applied: u64) {
        gauge!("vigil_raft_role").set(role_gauge_value(role));
        gauge!("vigil_raft_term").set(term as f64);
        gauge!("vigil_raft_commit_index").set(commit_index as f64);
        gauge!("vigil_raft_last_applied").set(last_applied as f64);
    }

    pub fn record_election(&self, won: bool) {
        counter!("vigil_raft_elections_total").increment(1);
        if won {
            counter!("vigil_raft_elections_won_total").increment(1);
        }
    }

    pub fn record_validator_weight(&self, validator_id: u64, weight: f64) {
        gauge!("vigil_validator_weight", "validator" => validator_id.to_string()).set(weight);
    }

    pub fn record_alert(&self, location: &str, delivered: bool) {
        let outcome = if delivered { "delivered" } else { "failed" };
        counter!("vigil_alerts_total", "location" => location.to_string(), "outcome" => outcome)
            .increment(1);
    }

    /// Renders the Prometheus text exposition.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus_handle.render()
    }
}
