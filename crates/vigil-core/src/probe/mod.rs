//! Reachability probing.
//!
//! A [`Prober`] performs one liveness check against a target and always produces a
//! [`Vote`](crate::types::Vote): failures degrade to `DOWN` rather than errors. The
//! result is written to the validator's [`VoteCache`], which gossip reads from.
//! Hostname lookups go through a shared [`DnsCache`].
//!
//! [`ProbeScheduler`] runs the probe cycle on an interval: probe every target, cache
//! the vote, submit it to the event bus, and gossip it to peers.

pub mod cache;
pub mod dns;
pub mod prober;
pub mod scheduler;

pub use cache::{MergePolicy, VoteCache};
pub use dns::{CachingResolver, DnsCache};
pub use prober::Prober;
pub use scheduler::ProbeScheduler;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Lowest allowed probe timeout.
pub const MIN_PROBE_TIMEOUT_MS: u64 = 3000;
/// Highest allowed probe timeout.
pub const MAX_PROBE_TIMEOUT_MS: u64 = 5000;

/// Probe transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMode {
    /// HTTP GET; any 2xx or 3xx reply is `UP`.
    #[default]
    Http,
    /// TCP connect to the target's host and port; an established connection is `UP`.
    Tcp,
}

/// Probe scheduling and transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub mode: ProbeMode,

    /// Per-probe timeout in milliseconds, 3000 to 5000 (default: 4000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Seconds between probe cycles (default: 30)
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    /// Target URLs to probe.
    #[serde(default)]
    pub targets: Vec<String>,

    /// Seconds a DNS resolution stays cached (default: 300)
    #[serde(default = "default_dns_ttl_seconds")]
    pub dns_ttl_seconds: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_ms() -> u64 {
    4000
}
fn default_interval_seconds() -> u64 {
    30
}
fn default_dns_ttl_seconds() -> u64 {
    300
}
fn default_user_agent() -> String {
    format!("vigil-validator/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            mode: ProbeMode::default(),
            timeout_ms: default_timeout_ms(),
            interval_seconds: default_interval_seconds(),
            targets: Vec::new(),
            dns_ttl_seconds: default_dns_ttl_seconds(),
            user_agent: default_user_agent(),
        }
    }
}

impl ProbeConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    #[must_use]
    pub fn dns_ttl(&self) -> Duration {
        Duration::from_secs(self.dns_ttl_seconds)
    }

    /// # Errors
    ///
    /// Returns an error for a timeout outside 3–5 seconds, a zero interval, or a target
    /// that is not an `http(s)` URL.
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_PROBE_TIMEOUT_MS..=MAX_PROBE_TIMEOUT_MS).contains(&self.timeout_ms) {
            return Err(format!(
                "probe timeout must be between {MIN_PROBE_TIMEOUT_MS} and {MAX_PROBE_TIMEOUT_MS} ms, got {}",
                self.timeout_ms
            ));
        }
        if self.interval_seconds == 0 {
            return Err("probe interval must be greater than 0".to_string());
        }
        for target in &self.targets {
            if !target.starts_with("http://") && !target.starts_with("https://") {
                return Err(format!("probe target must be an http(s) URL: {target}"));
            }
        }
        Ok(())
    }
}

/// Reasons a probe failed. These never escape the prober; each one becomes a `DOWN` vote.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid target URL {url}: {message}")]
    InvalidTarget { url: String, message: String },

    #[error("DNS resolution failed for {host}: {message}")]
    Dns { host: String, message: String },

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("failed to build probe client: {0}")]
    Client(String),
}

impl ProbeError {
    /// Whether the target answered at all. Only an unexpected status counts as a reply.
    #[must_use]
    pub fn target_replied(&self) -> bool {
        matches!(self, Self::Status(_))
    }
}
