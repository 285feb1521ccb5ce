//! Regional alerting.
//!
//! When a round resolves, every `DOWN` vote whose validator location has a configured
//! destination produces one [`RegionalAlert`]. The [`WebhookAlertDispatcher`] posts it to
//! that destination and records it in the bounded [`AlertManager`], which backs the
//! `/alerts` endpoint. Delivery failures are logged and recorded; they never affect the
//! verdict.

pub mod dispatcher;
pub mod manager;
pub mod types;

pub use dispatcher::{AlertDispatcher, AlertRouter, WebhookAlertDispatcher};
pub use manager::AlertManager;
pub use types::{AlertSeverity, AlertStatus, RegionalAlert};

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("failed to build alert client: {0}")]
    Client(String),

    #[error("alert delivery to {destination} failed: {message}")]
    Delivery { destination: String, message: String },
}

/// Regional alert routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Location name to destination URL.
    #[serde(default)]
    pub routes: HashMap<String, String>,

    /// Delivery timeout in milliseconds (default: 2000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Alerts retained for `/alerts` (default: 1000)
    #[serde(default = "default_max_retained")]
    pub max_retained: usize,
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_max_retained() -> usize {
    manager::DEFAULT_MAX_ALERTS
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
            timeout_ms: default_timeout_ms(),
            max_retained: default_max_retained(),
        }
    }
}

impl AlertsConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// # Errors
    ///
    /// Returns an error if a route destination is not an `http(s)` URL.
    pub fn validate(&self) -> Result<(), String> {
        for (location, destination) in &self.routes {
            if !destination.starts_with("http://") && !destination.starts_with("https://") {
                return Err(format!(
                    "alert route for {location} must be an http(s) URL, got {destination}"
                ));
            }
        }
        Ok(())
    }
}
