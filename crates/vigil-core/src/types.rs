//! Shared domain types: votes, round keys, verdicts and the wire events that carry them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// Weight carried by a vote when no reputation data exists for its validator.
pub const DEFAULT_VOTE_WEIGHT: f64 = 1.0;

fn default_vote_weight() -> f64 {
    DEFAULT_VOTE_WEIGHT
}

fn default_probe_ok() -> bool {
    true
}

/// Identity of a monitoring validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidatorId(pub u64);

impl fmt::Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ValidatorId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Reachability observed for a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VoteStatus {
    Up,
    Down,
}

impl VoteStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
        }
    }

    #[must_use]
    pub fn is_up(&self) -> bool {
        matches!(self, Self::Up)
    }
}

impl fmt::Display for VoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validator's observation of a target.
///
/// Produced fresh by every probe and never mutated after it has been gossiped.
/// `probe_ok` is `false` only when the probe got no reply at all (DNS failure,
/// refused connection, timeout); an HTTP error status still counts as a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub validator_id: ValidatorId,
    pub status: VoteStatus,
    #[serde(default = "default_vote_weight")]
    pub weight: f64,
    pub latency_ms: u64,
    #[serde(default)]
    pub location: String,
    pub observed_at: DateTime<Utc>,
    #[serde(default = "default_probe_ok")]
    pub probe_ok: bool,
}

impl Vote {
    /// Creates a vote observed now with the default weight.
    #[must_use]
    pub fn new(
        validator_id: impl Into<ValidatorId>,
        status: VoteStatus,
        latency_ms: u64,
        location: impl Into<String>,
    ) -> Self {
        Self {
            validator_id: validator_id.into(),
            status,
            weight: DEFAULT_VOTE_WEIGHT,
            latency_ms,
            location: location.into(),
            observed_at: Utc::now(),
            probe_ok: true,
        }
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn with_observed_at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = observed_at;
        self
    }

    #[must_use]
    pub fn unreachable(mut self) -> Self {
        self.probe_ok = false;
        self
    }
}

/// Buffer key for quorum aggregation: a target plus a round timestamp in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoundKey {
    pub target: String,
    pub round: i64,
}

impl RoundKey {
    #[must_use]
    pub fn new(target: impl Into<String>, round: i64) -> Self {
        Self { target: target.into(), round }
    }

    /// Floors `observed_at` to the start of its round window so that votes cast by
    /// independent validators within the same window share a key.
    #[must_use]
    pub fn windowed(target: impl Into<String>, observed_at: DateTime<Utc>, window: Duration) -> Self {
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX).max(1);
        let ts = observed_at.timestamp_millis();
        Self { target: target.into(), round: ts.div_euclid(window_ms) * window_ms }
    }
}

impl fmt::Display for RoundKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.target, self.round)
    }
}

/// The single outcome emitted for a round key once quorum is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusVerdict {
    pub target: String,
    pub round: i64,
    pub status: VoteStatus,
    pub votes: Vec<Vote>,
    pub up_weight: f64,
    pub down_weight: f64,
    pub observed_at: DateTime<Utc>,
}

impl ConsensusVerdict {
    #[must_use]
    pub fn key(&self) -> RoundKey {
        RoundKey::new(self.target.clone(), self.round)
    }
}

/// Raw vote as carried on the message bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVoteEvent {
    pub validator_id: ValidatorId,
    pub url: String,
    pub status: VoteStatus,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default = "default_probe_ok")]
    pub probe_ok: bool,
}

impl RawVoteEvent {
    #[must_use]
    pub fn from_vote(target: impl Into<String>, vote: &Vote) -> Self {
        Self {
            validator_id: vote.validator_id,
            url: target.into(),
            status: vote.status,
            latency_ms: vote.latency_ms,
            timestamp: vote.observed_at,
            location: vote.location.clone(),
            weight: Some(vote.weight),
            probe_ok: vote.probe_ok,
        }
    }

    /// Splits the event into its target and the vote it carries.
    #[must_use]
    pub fn into_vote(self) -> (String, Vote) {
        let vote = Vote {
            validator_id: self.validator_id,
            status: self.status,
            weight: self.weight.unwrap_or(DEFAULT_VOTE_WEIGHT),
            latency_ms: self.latency_ms,
            location: self.location,
            observed_at: self.timestamp,
            probe_ok: self.probe_ok,
        };
        (self.url, vote)
    }
}

/// Verdict broadcast to live subscribers and the message bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictEvent {
    pub url: String,
    pub consensus: VoteStatus,
    pub votes: Vec<Vote>,
    pub timestamp: DateTime<Utc>,
}

impl From<&ConsensusVerdict> for VerdictEvent {
    fn from(verdict: &ConsensusVerdict) -> Self {
        Self {
            url: verdict.target.clone(),
            consensus: verdict.status,
            votes: verdict.votes.clone(),
            timestamp: verdict.observed_at,
        }
    }
}
