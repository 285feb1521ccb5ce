//! # Vigil Core
//!
//! Core library for vigil, a cooperative reachability monitor. Independent validators
//! probe the same targets, spread their observations by gossip, and agree on one
//! verdict per target and time window.
//!
//! This crate provides:
//!
//! - **[`probe`]**: HTTP(S) probing with a DNS cache, the per-target vote cache, and the
//!   scheduler that runs probe cycles.
//!
//! - **[`gossip`]**: Push-based gossip of votes to a random peer subset over a fixed
//!   number of rounds, and the receive-side merge.
//!
//! - **[`quorum`]**: Vote buffering per round key, weighted tallies, quorum resolution
//!   and TTL sweeping.
//!
//! - **[`raft`]**: A replicated log for resolved verdicts, with leader election, log
//!   replication and persistent term/vote/log state.
//!
//! - **[`reputation`]**: Per-validator accuracy, latency and success aggregates that turn
//!   into vote weights.
//!
//! - **[`alerts`]**, **[`store`]**, **[`bus`]**: Regional alert delivery, vote
//!   persistence and the event bus between validators and aggregators.
//!
//! - **[`metrics`]**: Prometheus metrics collection.
//!
//! ## Pipeline
//!
//! ```text
//!  ProbeScheduler ──► Prober ──► VoteCache ──► GossipDisseminator ──► peers
//!        │                                              ▲
//!        │ RawVoteEvent                                 │ POST /gossip
//!        ▼                                              │
//!    EventBus ──► VoteConsumer ──► QuorumAggregator ◄───┘
//!                                        │
//!                          quorum reached│ ConsensusVerdict
//!              ┌──────────────┬──────────┼──────────────┐
//!              ▼              ▼          ▼              ▼
//!          VoteStore    AlertDispatcher  EventBus   RaftNode ──► replicate ──► followers
//!                                                       │
//!                                               commit  │ apply
//!                                                       ▼
//!                                          ReputationScorer, committed stream
//! ```
//!
//! Every node resolves rounds from the votes it sees; only the leader's proposals enter
//! the log, so each round key is decided once cluster-wide.

pub mod alerts;
pub mod bus;
pub mod config;
pub mod gossip;
pub mod metrics;
pub mod probe;
pub mod quorum;
pub mod raft;
pub mod reputation;
pub mod runtime;
pub mod store;
pub mod types;
