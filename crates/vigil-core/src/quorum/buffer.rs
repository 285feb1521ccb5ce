//! Pending vote buffers, one per open round key.

use crate::types::Vote;
use tokio::time::Instant;

/// Votes collected for a round that has not reached quorum yet.
#[derive(Debug, Clone)]
pub struct PendingConsensus {
    pub votes: Vec<Vote>,
    pub created_at: Instant,
}

impl PendingConsensus {
    #[must_use]
    pub fn new(created_at: Instant) -> Self {
        Self { votes: Vec::new(), created_at }
    }

    /// Adds a vote unless its validator already voted in this round.
    ///
    /// Returns `false` for a repeat; the first vote from a validator stands.
    pub fn push(&mut self, vote: Vote) -> bool {
        if self.votes.iter().any(|v| v.validator_id == vote.validator_id) {
            return false;
        }
        self.votes.push(vote);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.votes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Whether the buffer has outlived `ttl` at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Instant, ttl: std::time::Duration) -> bool {
        now.saturating_duration_since(self.created_at) >= ttl
    }
}
