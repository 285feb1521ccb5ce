//! Mock Infrastructure for Testing Vigil
//!
//! Reusable in-process stand-ins for the network-facing seams of the core crate, so
//! multi-validator scenarios run without sockets.
//!
//! ## Components
//!
//! - `RaftTestCluster`: N Raft nodes wired through a `LocalNetwork`, with partition control
//! - `RecordingGossipTransport`: Captures gossip pushes and delivers them to peer caches
//! - `RecordingAlertDispatcher` and `RecordingPublisher`: Capture aggregator side effects
//! - Test helpers for votes and configs
//!
//! ## Usage
//!
//! ```ignore
//! use tests::mock_infrastructure::RaftTestCluster;
//!
//! let cluster = RaftTestCluster::start(3);
//! let leader = cluster.wait_for_leader(Duration::from_secs(5)).await.unwrap();
//! ```

pub mod raft_cluster;
pub mod recording;
pub mod test_helpers;

pub use raft_cluster::RaftTestCluster;
pub use recording::{RecordingAlertDispatcher, RecordingGossipTransport, RecordingPublisher};
pub use test_helpers::*;
