//! Integration tests for vigil.
//!
//! This crate contains various test modules:
//!
//! - `quorum_tests`: Concurrent ingestion, weighted tallies and verdict side effects
//! - `raft_cluster_tests`: Elections, replication and failover on in-process clusters
//! - `raft_property_tests`: Randomized schedules checked against Raft safety properties
//! - `gossip_tests`: Dissemination rounds, merge policies and the HTTP wire format
//! - `probe_tests`: UP/DOWN classification against mockito targets
//! - `reputation_tests`: Weight bounds and reputation-weighted quorum
//! - `alerts_store_tests`: Regional webhooks and the vote journal
//! - `runtime_tests`: Whole-runtime scenarios with injected transports
//! - `mock_infrastructure`: Reusable clusters, recorders and fixtures
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package tests
//! ```
//!
//! Every test runs in-process; no external services are needed.

pub mod mock_infrastructure;

#[cfg(test)]
mod alerts_store_tests;
#[cfg(test)]
mod probe_tests;
#[cfg(test)]
mod quorum_tests;
#[cfg(test)]
mod raft_cluster_tests;
#[cfg(test)]
mod raft_property_tests;
#[cfg(test)]
mod runtime_tests;
