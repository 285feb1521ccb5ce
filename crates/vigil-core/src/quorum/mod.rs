//! # Quorum Aggregation
//!
//! Votes from independent validators are buffered per round key `(target, round)`
//! until enough of them agree on a round to emit a single verdict.
//!
//! ## Algorithm Steps
//!
//! 1. **Admission**: Reject votes for keys already resolved, for rounds older than the
//!    processed-key retention, or from a validator that already voted on the key
//! 2. **Weighting**: Replace the vote's weight with the validator's reputation weight
//!    when one is known
//! 3. **Quorum Check**: Once the buffer holds `quorum` votes (and `min_total_weight`, if
//!    set), tally UP against DOWN weight; ties resolve to UP
//! 4. **Emission**: Mark the key processed, drop the buffer, then persist, broadcast and
//!    publish the verdict and raise regional alerts for DOWN votes
//!
//! A background sweep drops buffers older than the vote TTL without emitting anything.
//!
//! # Module Organization
//!
//! - [`config`]: `QuorumConfig` and quorum size resolution
//! - [`tally`]: Weighted tally and tie rule
//! - [`buffer`]: Per-key pending vote buffers
//! - [`aggregator`]: `QuorumAggregator`, the entry point

pub mod aggregator;
pub mod buffer;
pub mod config;
pub mod tally;

pub use aggregator::QuorumAggregator;
pub use buffer::PendingConsensus;
pub use config::{default_quorum, QuorumConfig};
pub use tally::Tally;

use crate::types::ConsensusVerdict;
use async_trait::async_trait;
use thiserror::Error;

/// Result of offering one vote to the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Stored; the round still needs more votes.
    Buffered { count: usize, needed: usize },
    /// This vote completed quorum.
    Resolved(ConsensusVerdict),
    /// The key already produced its verdict.
    AlreadyProcessed,
    /// The validator already voted on this key.
    Duplicate,
    /// The round is older than the processed-key retention.
    Stale,
}

impl IngestOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buffered { .. } => "buffered",
            Self::Resolved(_) => "resolved",
            Self::AlreadyProcessed => "already_processed",
            Self::Duplicate => "duplicate",
            Self::Stale => "stale",
        }
    }

    #[must_use]
    pub fn verdict(&self) -> Option<&ConsensusVerdict> {
        match self {
            Self::Resolved(verdict) => Some(verdict),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum QuorumError {
    #[error("invalid quorum configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publisher unavailable: {0}")]
    Unavailable(String),

    #[error("verdict rejected: {0}")]
    Rejected(String),
}

/// Downstream consumer of resolved verdicts (message bus, replicated log, ...).
#[async_trait]
pub trait VerdictPublisher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn publish(&self, verdict: &ConsensusVerdict) -> Result<(), PublishError>;
}
