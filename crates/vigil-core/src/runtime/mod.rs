//! Vigil runtime initialization and lifecycle management.
//!
//! Wires the probe, gossip, quorum, Raft, reputation and alerting components from one
//! [`AppConfig`](crate::config::AppConfig), starts their background tasks, and
//! coordinates shutdown through a single broadcast channel.
//!
//! # Example
//!
//! ```no_run
//! use vigil_core::{config::AppConfig, runtime::VigilRuntime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!
//!     let runtime = VigilRuntime::builder()
//!         .with_config(config)
//!         .enable_prober()
//!         .enable_aggregator()
//!         .enable_raft()
//!         .build()?;
//!
//!     let mut verdicts = runtime.components().subscribe_committed();
//!     while let Ok(verdict) = verdicts.recv().await {
//!         println!("{} is {}", verdict.target, verdict.status);
//!     }
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod components;
pub mod lifecycle;

pub use builder::{RuntimeError, VigilRuntimeBuilder};
pub use components::VigilComponents;
pub use lifecycle::VigilRuntime;
