//! Push gossip of cached votes between validators.
//!
//! A validator pushes its current cached vote for a target to every configured peer,
//! for a number of rounds separated by a randomized delay. Pushes are
//! fire-and-forget: a peer that fails or times out is logged and skipped, and never
//! aborts the round. The receiving side merges the vote into its own
//! [`VoteCache`](crate::probe::VoteCache) according to the configured
//! [`MergePolicy`].

pub mod disseminator;
pub mod transport;

pub use disseminator::{GossipDisseminator, GossipReport};
pub use transport::{GossipTransport, HttpGossipTransport};

use crate::{
    probe::MergePolicy,
    types::{ValidatorId, Vote},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Lower bound of the randomized inter-round delay.
pub const MIN_ROUND_DELAY_MS: u64 = 500;
/// Upper bound of the randomized inter-round delay.
pub const MAX_ROUND_DELAY_MS: u64 = 1500;

/// Gossip settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipConfig {
    /// Rounds per dissemination (default: 3)
    #[serde(default = "default_rounds")]
    pub rounds: u32,

    /// Minimum delay between rounds in milliseconds (default: 500)
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Maximum delay between rounds in milliseconds (default: 1500)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Timeout for a single push in milliseconds (default: 750)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default)]
    pub merge_policy: MergePolicy,
}

fn default_rounds() -> u32 {
    3
}
fn default_min_delay_ms() -> u64 {
    MIN_ROUND_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    MAX_ROUND_DELAY_MS
}
fn default_request_timeout_ms() -> u64 {
    750
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            merge_policy: MergePolicy::default(),
        }
    }
}

impl GossipConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// # Errors
    ///
    /// Returns an error if the delay window falls outside 500–1500 ms, is inverted, or the
    /// push timeout is zero.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_delay_ms > self.max_delay_ms {
            return Err(format!(
                "gossip min_delay_ms ({}) exceeds max_delay_ms ({})",
                self.min_delay_ms, self.max_delay_ms
            ));
        }
        if self.min_delay_ms < MIN_ROUND_DELAY_MS || self.max_delay_ms > MAX_ROUND_DELAY_MS {
            return Err(format!(
                "gossip round delay must stay within {MIN_ROUND_DELAY_MS}-{MAX_ROUND_DELAY_MS} ms"
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err("gossip request timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Gossip wire payload: `POST /gossip`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GossipMessage {
    pub target: String,
    pub vote: Vote,
    pub from_id: ValidatorId,
    #[serde(default)]
    pub location: String,
    pub observed_at: DateTime<Utc>,
}

impl GossipMessage {
    #[must_use]
    pub fn new(target: impl Into<String>, vote: Vote, from_id: ValidatorId) -> Self {
        Self {
            target: target.into(),
            location: vote.location.clone(),
            observed_at: vote.observed_at,
            vote,
            from_id,
        }
    }

    /// Rejects payloads that must not touch the cache.
    ///
    /// # Errors
    ///
    /// Returns [`GossipError::InvalidPayload`] for an empty target or a non-finite or
    /// negative weight.
    pub fn validate(&self) -> Result<(), GossipError> {
        if self.target.trim().is_empty() {
            return Err(GossipError::InvalidPayload("target must not be empty".to_string()));
        }
        if !self.vote.weight.is_finite() || self.vote.weight < 0.0 {
            return Err(GossipError::InvalidPayload(format!(
                "vote weight must be a non-negative number, got {}",
                self.vote.weight
            )));
        }
        Ok(())
    }
}

/// Gossip failures. Send-side errors are logged and counted, never propagated past a round.
#[derive(Debug, Error)]
pub enum GossipError {
    #[error("push to {peer} failed: {message}")]
    Transport { peer: String, message: String },

    #[error("push to {peer} timed out")]
    Timeout { peer: String },

    #[error("peer {peer} rejected gossip with status {status}")]
    Rejected { peer: String, status: u16 },

    #[error("invalid gossip payload: {0}")]
    InvalidPayload(String),
}
