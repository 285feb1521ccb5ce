//! Weighted vote tally.
//!
//! Stateless: the aggregator decides which votes and weights go in, this module only
//! adds them up and applies the tie rule.

use crate::types::{Vote, VoteStatus};

/// Weighted and counted totals for one round.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tally {
    pub up_weight: f64,
    pub down_weight: f64,
    pub up_count: usize,
    pub down_count: usize,
}

impl Tally {
    /// Sums votes using `weight_of` for each vote's weight.
    pub fn of<'a>(votes: impl IntoIterator<Item = &'a Vote>, weight_of: impl Fn(&Vote) -> f64) -> Self {
        let mut tally = Self::default();
        for vote in votes {
            let weight = weight_of(vote);
            match vote.status {
                VoteStatus::Up => {
                    tally.up_weight += weight;
                    tally.up_count += 1;
                }
                VoteStatus::Down => {
                    tally.down_weight += weight;
                    tally.down_count += 1;
                }
            }
        }
        tally
    }

    /// `UP` when `up_weight >= down_weight`; ties resolve to `UP`.
    #[must_use]
    pub fn verdict(&self) -> VoteStatus {
        if self.up_weight >= self.down_weight {
            VoteStatus::Up
        } else {
            VoteStatus::Down
        }
    }

    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.up_weight + self.down_weight
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.up_count + self.down_count
    }
}
