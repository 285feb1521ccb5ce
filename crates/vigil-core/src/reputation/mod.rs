//! Validator reputation.
//!
//! Each validator accumulates running aggregates (accuracy, average latency and
//! uptime) from the outcomes of committed verdicts. The aggregates are never
//! recomputed from raw history; every outcome folds into the previous values.
//! The derived scalar weight feeds back into vote casting and quorum tallies, so
//! validators that are often wrong, slow or unreachable count for less over time.
//!
//! ```text
//! weight = a * accuracy + l * (1 - min(avg_latency / ceiling, 1)) + u * (uptime / 100)
//! ```
//!
//! With the default factors `a = 0.5`, `l = 0.3`, `u = 0.2` and a 5000ms ceiling.

use crate::{
    metrics::MetricsCollector,
    types::{ConsensusVerdict, ValidatorId, DEFAULT_VOTE_WEIGHT},
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Factor weights for the reputation formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationConfig {
    /// Latency at or above which the latency score bottoms out (default: 5000)
    #[serde(default = "default_latency_ceiling_ms")]
    pub latency_ceiling_ms: u64,

    /// Weight of the accuracy ratio (default: 0.5)
    #[serde(default = "default_accuracy_weight")]
    pub accuracy_weight: f64,

    /// Weight of the latency score (default: 0.3)
    #[serde(default = "default_latency_weight")]
    pub latency_weight: f64,

    /// Weight of the uptime score (default: 0.2)
    #[serde(default = "default_uptime_weight")]
    pub uptime_weight: f64,
}

fn default_latency_ceiling_ms() -> u64 {
    5000
}
fn default_accuracy_weight() -> f64 {
    0.5
}
fn default_latency_weight() -> f64 {
    0.3
}
fn default_uptime_weight() -> f64 {
    0.2
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            latency_ceiling_ms: default_latency_ceiling_ms(),
            accuracy_weight: default_accuracy_weight(),
            latency_weight: default_latency_weight(),
            uptime_weight: default_uptime_weight(),
        }
    }
}

impl ReputationConfig {
    /// Validates factor weights and the latency ceiling.
    ///
    /// # Errors
    ///
    /// Returns an error if any factor is negative, the factors do not sum to 1, or the
    /// ceiling is zero.
    pub fn validate(&self) -> Result<(), String> {
        let factors = [self.accuracy_weight, self.latency_weight, self.uptime_weight];
        if factors.iter().any(|f| !f.is_finite() || *f < 0.0) {
            return Err("reputation factor weights must be non-negative".to_string());
        }
        let sum: f64 = factors.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(format!("reputation factor weights must sum to 1.0, got {sum}"));
        }
        if self.latency_ceiling_ms == 0 {
            return Err("reputation latency ceiling must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Running aggregates for one validator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorMeta {
    pub total_votes: u64,
    pub correct_votes: u64,
    pub average_latency: f64,
    pub uptime_percent: f64,
    pub weight: f64,
}

impl Default for ValidatorMeta {
    fn default() -> Self {
        Self {
            total_votes: 0,
            correct_votes: 0,
            average_latency: 0.0,
            uptime_percent: 0.0,
            weight: DEFAULT_VOTE_WEIGHT,
        }
    }
}

impl ValidatorMeta {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn accuracy_ratio(&self) -> f64 {
        if self.total_votes == 0 {
            return 0.0;
        }
        self.correct_votes as f64 / self.total_votes as f64
    }

    #[allow(clippy::cast_precision_loss)]
    fn fold(&mut self, was_correct: bool, latency_ms: u64, was_successful: bool, config: &ReputationConfig) {
        let old_total = self.total_votes as f64;
        self.total_votes += 1;
        let new_total = self.total_votes as f64;

        if was_correct {
            self.correct_votes += 1;
        }
        self.average_latency = (self.average_latency * old_total + latency_ms as f64) / new_total;
        let up = if was_successful { 100.0 } else { 0.0 };
        self.uptime_percent = (self.uptime_percent * old_total + up) / new_total;

        self.weight =
            compute_weight(self.accuracy_ratio(), self.average_latency, self.uptime_percent, config);
    }
}

/// Derives a weight in `[0, 1]` from accuracy, average latency and uptime.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_weight(
    accuracy_ratio: f64,
    average_latency_ms: f64,
    uptime_percent: f64,
    config: &ReputationConfig,
) -> f64 {
    let accuracy = accuracy_ratio.clamp(0.0, 1.0);
    let ceiling = config.latency_ceiling_ms.max(1) as f64;
    let latency_score = 1.0 - (average_latency_ms.max(0.0) / ceiling).min(1.0);
    let uptime_score = (uptime_percent / 100.0).clamp(0.0, 1.0);

    let weight = config.accuracy_weight * accuracy +
        config.latency_weight * latency_score +
        config.uptime_weight * uptime_score;
    weight.clamp(0.0, 1.0)
}

/// Maintains per-validator reputation and the derived vote weights.
pub struct ReputationScorer {
    config: ReputationConfig,
    validators: DashMap<ValidatorId, ValidatorMeta>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl ReputationScorer {
    #[must_use]
    pub fn new(config: ReputationConfig) -> Self {
        Self { config, validators: DashMap::new(), metrics: None }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Folds one outcome into the validator's aggregates and returns the updated meta.
    ///
    /// The validator's entry is created on first observation.
    pub fn record_outcome(
        &self,
        validator_id: ValidatorId,
        was_correct: bool,
        latency_ms: u64,
        was_successful: bool,
    ) -> ValidatorMeta {
        let meta = {
            let mut entry = self.validators.entry(validator_id).or_default();
            entry.fold(was_correct, latency_ms, was_successful, &self.config);
            *entry
        };

        debug!(
            validator = %validator_id,
            total_votes = meta.total_votes,
            weight = meta.weight,
            "reputation updated"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_validator_weight(validator_id.0, meta.weight);
        }
        meta
    }

    /// Feeds every vote of a committed verdict back as an outcome.
    ///
    /// A vote is correct when it agrees with the verdict, and successful when its
    /// probe got a reply.
    pub fn record_verdict(&self, verdict: &ConsensusVerdict) {
        for vote in &verdict.votes {
            self.record_outcome(
                vote.validator_id,
                vote.status == verdict.status,
                vote.latency_ms,
                vote.probe_ok,
            );
        }
    }

    /// Weight to cast for a validator; `1.0` until it has a history.
    #[must_use]
    pub fn weight(&self, validator_id: ValidatorId) -> f64 {
        self.known_weight(validator_id).unwrap_or(DEFAULT_VOTE_WEIGHT)
    }

    /// Weight for a validator with recorded history, `None` otherwise.
    #[must_use]
    pub fn known_weight(&self, validator_id: ValidatorId) -> Option<f64> {
        self.validators.get(&validator_id).map(|meta| meta.weight)
    }

    #[must_use]
    pub fn meta(&self, validator_id: ValidatorId) -> Option<ValidatorMeta> {
        self.validators.get(&validator_id).map(|meta| *meta)
    }

    /// All known validators, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(ValidatorId, ValidatorMeta)> {
        let mut all: Vec<_> =
            self.validators.iter().map(|entry| (*entry.key(), *entry.value())).collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl Default for ReputationScorer {
    fn default() -> Self {
        Self::new(ReputationConfig::default())
    }
}
