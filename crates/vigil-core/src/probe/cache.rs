//! Per-validator cache of the latest vote for each target.

use crate::types::Vote;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// How a vote received through gossip is merged into the local cache.
///
/// The policy is a protocol invariant: all validators in one deployment must use the
/// same one, since it decides how conflicting concurrent votes converge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// The received vote replaces whatever is cached for the target.
    #[default]
    Overwrite,
    /// The received vote is only adopted when nothing is cached for the target.
    FillIfAbsent,
}

/// Maps target URL to the last vote this validator produced or received for it.
#[derive(Debug, Default)]
pub struct VoteCache {
    entries: DashMap<String, Vote>,
}

impl VoteCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, target: &str) -> Option<Vote> {
        self.entries.get(target).map(|vote| vote.clone())
    }

    /// Stores a locally produced vote, replacing any previous entry.
    pub fn put(&self, target: impl Into<String>, vote: Vote) {
        self.entries.insert(target.into(), vote);
    }

    /// Merges a vote received from a peer. Returns `true` if the cache changed.
    pub fn merge_gossip(&self, target: &str, vote: Vote, policy: MergePolicy) -> bool {
        match policy {
            MergePolicy::Overwrite => {
                self.entries.insert(target.to_string(), vote);
                true
            }
            MergePolicy::FillIfAbsent => match self.entries.entry(target.to_string()) {
                dashmap::mapref::entry::Entry::Occupied(_) => false,
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(vote);
                    true
                }
            },
        }
    }

    /// All cached entries, ordered by target.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, Vote)> {
        let mut all: Vec<_> =
            self.entries.iter().map(|e| (e.key().clone(), e.value().clone())).collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
