//! Test Helper Functions and Utilities
//!
//! Common helpers for creating votes, verdicts and configs.

use chrono::Utc;
use vigil_core::{
    config::AppConfig,
    quorum::QuorumConfig,
    raft::RaftConfig,
    types::{ConsensusVerdict, Vote, VoteStatus},
};

pub const TEST_TARGET: &str = "https://status.example.com/health";

/// A vote observed now, with the default weight.
#[must_use]
pub fn vote(validator_id: u64, status: VoteStatus) -> Vote {
    Vote::new(validator_id, status, 40 + validator_id, location_for(validator_id))
}

/// A vote with an explicit weight and latency.
#[must_use]
pub fn weighted_vote(validator_id: u64, status: VoteStatus, weight: f64, latency_ms: u64) -> Vote {
    Vote::new(validator_id, status, latency_ms, location_for(validator_id)).with_weight(weight)
}

/// Spreads validators over three regions.
#[must_use]
pub fn location_for(validator_id: u64) -> &'static str {
    match validator_id % 3 {
        0 => "eu-west",
        1 => "us-east",
        _ => "ap-south",
    }
}

/// A round that is neither stale nor in the future.
#[must_use]
pub fn current_round() -> i64 {
    Utc::now().timestamp_millis()
}

#[must_use]
pub fn verdict(target: &str, status: VoteStatus, votes: Vec<Vote>) -> ConsensusVerdict {
    ConsensusVerdict {
        target: target.to_string(),
        round: current_round(),
        status,
        votes,
        up_weight: 0.0,
        down_weight: 0.0,
        observed_at: Utc::now(),
    }
}

/// Quorum settings with equal vote weights.
#[must_use]
pub fn unweighted_quorum() -> QuorumConfig {
    QuorumConfig { use_reputation_weights: false, ..Default::default() }
}

/// Raft timings short enough for tests running in real time.
#[must_use]
pub fn fast_raft_config() -> RaftConfig {
    RaftConfig {
        election_timeout_min_ms: 150,
        election_timeout_max_ms: 300,
        heartbeat_interval_ms: 50,
        rpc_timeout_ms: 50,
        commit_timeout_ms: 2000,
        ..Default::default()
    }
}

/// A valid single-validator config.
#[must_use]
pub fn single_node_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.node.validator_id = Some(1);
    config.node.location = "eu-west".to_string();
    config
}
