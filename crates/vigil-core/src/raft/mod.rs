//! # Raft Replication
//!
//! Resolved verdicts are replicated through a Raft log so every node applies the same
//! sequence of verdicts, exactly once and in order.
//!
//! ## Roles
//!
//! - **Follower**: answers RPCs; starts an election when no leader is heard from within
//!   a randomized election timeout
//! - **Candidate**: votes for itself in a new term and wins with a strict majority
//! - **Leader**: appends a no-op for its term, then sends `AppendEntries` every
//!   heartbeat interval and whenever a command is proposed
//!
//! ## Safety Rules
//!
//! - A node grants at most one vote per term, and only to candidates whose log is at
//!   least as up to date as its own
//! - Any RPC carrying a higher term turns the receiver into a follower of that term
//! - A leader only commits entries from its current term, once stored on a majority;
//!   earlier entries commit with them
//! - Term, vote and log are persisted before the RPC that changed them is answered
//!
//! Indexes are 1-based; index 0 with term 0 is the empty-log sentinel.
//!
//! # Module Organization
//!
//! - [`types`]: Commands, log entries, RPC messages and status
//! - [`log`]: `RaftLog` with conflict truncation
//! - [`storage`]: Durable term, vote and log
//! - [`node`]: `RaftNode`, the protocol state machine
//! - [`runtime`]: Election timer and heartbeat tasks
//! - [`transport`]: HTTP and in-process RPC transports
//! - [`publisher`]: Bridge from the quorum aggregator to `propose`

pub mod errors;
pub mod log;
pub mod node;
pub mod publisher;
pub mod runtime;
pub mod storage;
pub mod transport;
pub mod types;

pub use errors::RaftError;
pub use log::RaftLog;
pub use node::{ApplyHandler, ElectionProgress, RaftNode};
pub use publisher::RaftVerdictPublisher;
pub use runtime::RaftRuntime;
pub use storage::{FileStorage, HardState, MemoryStorage, PersistentState, RaftStorage};
pub use transport::{HttpRaftTransport, LocalNetwork, LocalRaftTransport, RaftTransport};
pub use types::{
    AppendEntriesRequest, AppendEntriesResponse, Command, LogEntry, NodeId, RaftRole, RaftStatus,
    RequestVoteRequest, RequestVoteResponse,
};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raft timing and storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaftConfig {
    /// Replicate verdicts through Raft (default: true)
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Lower bound of the randomized election timeout in milliseconds (default: 5000)
    #[serde(default = "default_election_timeout_min_ms")]
    pub election_timeout_min_ms: u64,

    /// Upper bound of the randomized election timeout in milliseconds (default: 10000)
    #[serde(default = "default_election_timeout_max_ms")]
    pub election_timeout_max_ms: u64,

    /// Leader heartbeat period in milliseconds (default: 1000)
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Timeout for a single RPC in milliseconds (default: 750)
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,

    /// Entries carried by one `AppendEntries` (default: 64)
    #[serde(default = "default_max_entries_per_request")]
    pub max_entries_per_request: usize,

    /// How long `POST /raft/propose` waits for commit, in milliseconds (default: 5000)
    #[serde(default = "default_commit_timeout_ms")]
    pub commit_timeout_ms: u64,

    /// File holding term and vote; the log journal sits next to it with a `.log`
    /// extension. In-memory when unset.
    #[serde(default)]
    pub storage_path: Option<String>,
}

fn default_enabled() -> bool {
    true
}
fn default_election_timeout_min_ms() -> u64 {
    5000
}
fn default_election_timeout_max_ms() -> u64 {
    10_000
}
fn default_heartbeat_interval_ms() -> u64 {
    1000
}
fn default_rpc_timeout_ms() -> u64 {
    750
}
fn default_max_entries_per_request() -> usize {
    64
}
fn default_commit_timeout_ms() -> u64 {
    5000
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            election_timeout_min_ms: default_election_timeout_min_ms(),
            election_timeout_max_ms: default_election_timeout_max_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            max_entries_per_request: default_max_entries_per_request(),
            commit_timeout_ms: default_commit_timeout_ms(),
            storage_path: None,
        }
    }
}

impl RaftConfig {
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    #[must_use]
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    #[must_use]
    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }

    /// # Errors
    ///
    /// Returns an error if the election window is empty or inverted, or if two heartbeats
    /// do not fit inside the shortest election timeout.
    pub fn validate(&self) -> Result<(), String> {
        if self.election_timeout_min_ms == 0 {
            return Err("election timeout must be greater than 0".to_string());
        }
        if self.election_timeout_min_ms > self.election_timeout_max_ms {
            return Err(format!(
                "election_timeout_min_ms ({}) exceeds election_timeout_max_ms ({})",
                self.election_timeout_min_ms, self.election_timeout_max_ms
            ));
        }
        if self.heartbeat_interval_ms == 0 || self.heartbeat_interval_ms * 2 >= self.election_timeout_min_ms {
            return Err(format!(
                "heartbeat_interval_ms ({}) must be positive and less than half of election_timeout_min_ms ({})",
                self.heartbeat_interval_ms, self.election_timeout_min_ms
            ));
        }
        if self.rpc_timeout_ms == 0 {
            return Err("raft rpc timeout must be greater than 0".to_string());
        }
        if self.max_entries_per_request == 0 {
            return Err("max_entries_per_request must be greater than 0".to_string());
        }
        Ok(())
    }
}
