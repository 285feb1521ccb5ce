//! Quorum aggregation configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the quorum aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuorumConfig {
    /// Explicit vote count needed to resolve a round. Takes precedence over
    /// `quorum_fraction`.
    #[serde(default)]
    pub quorum_size: Option<usize>,

    /// Fraction of the cluster needed to resolve a round, in `(0, 1]`.
    #[serde(default)]
    pub quorum_fraction: Option<f64>,

    /// Total tallied weight that must also be reached (default: 0.0, disabled)
    #[serde(default)]
    pub min_total_weight: f64,

    /// Seconds an unresolved round is kept before the sweep drops it (default: 300)
    #[serde(default = "default_vote_ttl_seconds")]
    pub vote_ttl_seconds: u64,

    /// Seconds between sweeps (default: 60)
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,

    /// Width of a round window for bus votes, in seconds (default: 60)
    #[serde(default = "default_round_window_seconds")]
    pub round_window_seconds: u64,

    /// Seconds a resolved key is remembered. Votes for rounds older than this are
    /// rejected as stale (default: 3600)
    #[serde(default = "default_processed_key_retention_seconds")]
    pub processed_key_retention_seconds: u64,

    /// Tally with reputation weights when the validator has a history (default: true)
    #[serde(default = "default_use_reputation_weights")]
    pub use_reputation_weights: bool,

    /// Buffered verdicts per live subscriber (default: 256)
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
}

fn default_vote_ttl_seconds() -> u64 {
    300
}
fn default_sweep_interval_seconds() -> u64 {
    60
}
fn default_round_window_seconds() -> u64 {
    60
}
fn default_processed_key_retention_seconds() -> u64 {
    3600
}
fn default_use_reputation_weights() -> bool {
    true
}
fn default_subscriber_capacity() -> usize {
    256
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            quorum_size: None,
            quorum_fraction: None,
            min_total_weight: 0.0,
            vote_ttl_seconds: default_vote_ttl_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            round_window_seconds: default_round_window_seconds(),
            processed_key_retention_seconds: default_processed_key_retention_seconds(),
            use_reputation_weights: default_use_reputation_weights(),
            subscriber_capacity: default_subscriber_capacity(),
        }
    }
}

/// Majority-style default: `ceil(cluster_size / 2)`, never below 1.
#[must_use]
pub fn default_quorum(cluster_size: usize) -> usize {
    cluster_size.div_ceil(2).max(1)
}

impl QuorumConfig {
    /// Resolves the vote count needed for a cluster of `cluster_size` validators.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty cluster, a zero or oversized quorum, or a fraction
    /// outside `(0, 1]`.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn resolve_quorum(&self, cluster_size: usize) -> Result<usize, String> {
        if cluster_size == 0 {
            return Err("cluster size must be greater than 0".to_string());
        }

        let quorum = match (self.quorum_size, self.quorum_fraction) {
            (Some(size), _) => size,
            (None, Some(fraction)) => {
                if !(fraction > 0.0 && fraction <= 1.0) {
                    return Err(format!("quorum fraction must be in (0, 1], got {fraction}"));
                }
                (cluster_size as f64 * fraction).ceil() as usize
            }
            (None, None) => default_quorum(cluster_size),
        };

        if quorum == 0 {
            return Err("quorum size must be greater than 0".to_string());
        }
        if quorum > cluster_size {
            return Err(format!("quorum size {quorum} exceeds cluster size {cluster_size}"));
        }
        Ok(quorum)
    }

    /// # Errors
    ///
    /// Returns an error if any interval is zero or the weight threshold is negative.
    pub fn validate(&self) -> Result<(), String> {
        if self.vote_ttl_seconds == 0 {
            return Err("vote TTL must be greater than 0".to_string());
        }
        if self.sweep_interval_seconds == 0 {
            return Err("sweep interval must be greater than 0".to_string());
        }
        if self.round_window_seconds == 0 {
            return Err("round window must be greater than 0".to_string());
        }
        if self.processed_key_retention_seconds < self.vote_ttl_seconds {
            return Err("processed key retention must be at least the vote TTL".to_string());
        }
        if !self.min_total_weight.is_finite() || self.min_total_weight < 0.0 {
            return Err("min_total_weight must be a non-negative number".to_string());
        }
        Ok(())
    }

    #[must_use]
    pub fn vote_ttl(&self) -> Duration {
        Duration::from_secs(self.vote_ttl_seconds)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    #[must_use]
    pub fn round_window(&self) -> Duration {
        Duration::from_secs(self.round_window_seconds)
    }

    #[must_use]
    pub fn processed_key_retention(&self) -> Duration {
        Duration::from_secs(self.processed_key_retention_seconds)
    }
}
