//! Regional fan-out of `DOWN` votes.

use super::{
    manager::AlertManager,
    types::{AlertStatus, RegionalAlert},
    AlertError, AlertsConfig,
};
use crate::{metrics::MetricsCollector, types::Vote};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::{debug, warn};

/// Maps validator locations to alert destinations.
#[derive(Debug, Clone, Default)]
pub struct AlertRouter {
    routes: HashMap<String, String>,
}

impl AlertRouter {
    #[must_use]
    pub fn new(routes: HashMap<String, String>) -> Self {
        Self { routes }
    }

    #[must_use]
    pub fn destination_for(&self, location: &str) -> Option<&str> {
        self.routes.get(location).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Sends one regional alert per `DOWN` vote whose location is routed.
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    /// Returns the alert if one was sent, `Ok(None)` when the location has no route.
    async fn dispatch(&self, target: &str, vote: &Vote) -> Result<Option<RegionalAlert>, AlertError>;
}

/// Posts alerts as JSON to the routed destination and records each one.
pub struct WebhookAlertDispatcher {
    router: AlertRouter,
    client: Client,
    timeout: Duration,
    manager: Arc<AlertManager>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl WebhookAlertDispatcher {
    /// # Errors
    ///
    /// Returns [`AlertError::Client`] if the HTTP client cannot be built.
    pub fn new(config: &AlertsConfig, manager: Arc<AlertManager>) -> Result<Self, AlertError> {
        let client = ClientBuilder::new()
            .use_rustls_tls()
            .connect_timeout(config.timeout())
            .build()
            .map_err(|e| AlertError::Client(e.to_string()))?;

        Ok(Self {
            router: AlertRouter::new(config.routes.clone()),
            client,
            timeout: config.timeout(),
            manager,
            metrics: None,
        })
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn deliver(&self, alert: &RegionalAlert) -> Result<(), AlertError> {
        let response = self
            .client
            .post(&alert.destination)
            .timeout(self.timeout)
            .json(alert)
            .send()
            .await
            .map_err(|e| AlertError::Delivery {
                destination: alert.destination.clone(),
                message: e.to_string(),
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AlertError::Delivery {
                destination: alert.destination.clone(),
                message: format!("status {}", response.status()),
            })
        }
    }
}

#[async_trait]
impl AlertDispatcher for WebhookAlertDispatcher {
    async fn dispatch(&self, target: &str, vote: &Vote) -> Result<Option<RegionalAlert>, AlertError> {
        let Some(destination) = self.router.destination_for(&vote.location) else {
            debug!(url = %target, location = %vote.location, "no alert route for location");
            return Ok(None);
        };

        let mut alert = RegionalAlert::for_down_vote(target, vote, destination);
        let outcome = self.deliver(&alert).await;
        let delivered = outcome.is_ok();
        alert.mark(if delivered { AlertStatus::Delivered } else { AlertStatus::Failed });
        self.manager.record(alert.clone());

        if let Some(metrics) = &self.metrics {
            metrics.record_alert(&alert.location, delivered);
        }

        match outcome {
            Ok(()) => {
                debug!(url = %target, location = %alert.location, alert_id = %alert.id, "regional alert delivered");
                Ok(Some(alert))
            }
            Err(e) => {
                warn!(url = %target, location = %alert.location, error = %e, "regional alert delivery failed");
                Err(e)
            }
        }
    }
}
