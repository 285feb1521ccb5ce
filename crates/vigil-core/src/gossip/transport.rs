use super::{GossipError, GossipMessage};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// Delivers one gossip message to one peer.
#[async_trait]
pub trait GossipTransport: Send + Sync {
    /// Pushes `message` to `peer`. Implementations must bound their own latency.
    async fn push(&self, peer: &str, message: &GossipMessage) -> Result<(), GossipError>;
}

/// `POST {peer}/gossip` over HTTP.
pub struct HttpGossipTransport {
    client: Client,
    timeout: Duration,
}

impl HttpGossipTransport {
    /// # Errors
    ///
    /// Returns [`GossipError::Transport`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, GossipError> {
        let client = ClientBuilder::new()
            .use_rustls_tls()
            .connect_timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| GossipError::Transport { peer: String::new(), message: e.to_string() })?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl GossipTransport for HttpGossipTransport {
    async fn push(&self, peer: &str, message: &GossipMessage) -> Result<(), GossipError> {
        let url = format!("{}/gossip", peer.trim_end_matches('/'));
        let response =
            self.client.post(&url).timeout(self.timeout).json(message).send().await.map_err(
                |e| {
                    if e.is_timeout() {
                        GossipError::Timeout { peer: peer.to_string() }
                    } else {
                        GossipError::Transport { peer: peer.to_string(), message: e.to_string() }
                    }
                },
            )?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(GossipError::Rejected { peer: peer.to_string(), status: status.as_u16() })
        }
    }
}
