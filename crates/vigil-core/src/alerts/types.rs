//! Alert type definitions.

use crate::types::{ValidatorId, Vote};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity level of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// The target looked unreachable from the region.
    Critical,
    /// The validator reached the target but got an error status back.
    Warning,
}

/// Delivery state of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    /// Created but not yet handed to its destination.
    Pending,
    /// The destination accepted the alert.
    Delivered,
    /// Delivery failed; the alert is kept for inspection.
    Failed,
}

/// Notification that a validator in a routed region saw a target down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionalAlert {
    pub id: String,
    pub target: String,
    pub validator_id: ValidatorId,
    pub location: String,
    pub destination: String,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub message: String,
    pub latency_ms: u64,
    pub observed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RegionalAlert {
    /// Builds a pending alert for a `DOWN` vote.
    #[must_use]
    pub fn for_down_vote(target: &str, vote: &Vote, destination: &str) -> Self {
        let severity =
            if vote.probe_ok { AlertSeverity::Warning } else { AlertSeverity::Critical };
        Self {
            id: Uuid::new_v4().to_string(),
            target: target.to_string(),
            validator_id: vote.validator_id,
            location: vote.location.clone(),
            destination: destination.to_string(),
            severity,
            status: AlertStatus::Pending,
            message: format!(
                "{target} reported DOWN by validator {} in {}",
                vote.validator_id, vote.location
            ),
            latency_ms: vote.latency_ms,
            observed_at: vote.observed_at,
            created_at: Utc::now(),
        }
    }

    pub fn mark(&mut self, status: AlertStatus) {
        self.status = status;
    }
}
