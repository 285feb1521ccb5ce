//! Bounded in-memory record of dispatched alerts.

use std::{collections::VecDeque, sync::Arc};

use parking_lot::RwLock;

use super::types::{AlertStatus, RegionalAlert};

/// Default number of alerts to keep in memory.
pub const DEFAULT_MAX_ALERTS: usize = 1000;

/// Records alerts for inspection via the HTTP API.
///
/// At capacity, failed alerts are kept in preference to delivered ones: delivered
/// alerts are evicted first, then the oldest of whatever remains.
#[derive(Clone)]
pub struct AlertManager {
    alerts: Arc<RwLock<VecDeque<RegionalAlert>>>,
    max_alerts: usize,
}

impl AlertManager {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ALERTS)
    }

    #[must_use]
    pub fn with_capacity(max_alerts: usize) -> Self {
        Self { alerts: Arc::new(RwLock::new(VecDeque::new())), max_alerts: max_alerts.max(1) }
    }

    pub fn record(&self, alert: RegionalAlert) {
        let mut alerts = self.alerts.write();

        if alerts.len() >= self.max_alerts {
            if let Some(pos) = alerts.iter().position(|a| a.status == AlertStatus::Delivered) {
                alerts.remove(pos);
            } else {
                alerts.pop_front();
            }
        }

        alerts.push_back(alert);
    }

    /// All recorded alerts, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<RegionalAlert> {
        self.alerts.read().iter().cloned().collect()
    }

    #[must_use]
    pub fn list_for_location(&self, location: &str) -> Vec<RegionalAlert> {
        self.alerts.read().iter().filter(|a| a.location == location).cloned().collect()
    }

    #[must_use]
    pub fn get(&self, alert_id: &str) -> Option<RegionalAlert> {
        self.alerts.read().iter().find(|a| a.id == alert_id).cloned()
    }

    #[must_use]
    pub fn count_by_status(&self, status: AlertStatus) -> usize {
        self.alerts.read().iter().filter(|a| a.status == status).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.alerts.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alerts.read().is_empty()
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new()
    }
}
