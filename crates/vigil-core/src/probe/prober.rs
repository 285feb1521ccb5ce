use super::{CachingResolver, DnsCache, ProbeConfig, ProbeError, ProbeMode, VoteCache};
use crate::{
    metrics::MetricsCollector,
    reputation::ReputationScorer,
    types::{ValidatorId, Vote, VoteStatus, DEFAULT_VOTE_WEIGHT},
};
use reqwest::{redirect::Policy, Client, ClientBuilder, Url};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpStream, time::Instant};
use tracing::debug;

/// Performs single reachability checks on behalf of one validator.
pub struct Prober {
    client: Client,
    mode: ProbeMode,
    validator_id: ValidatorId,
    location: String,
    cache: Arc<VoteCache>,
    dns: Arc<DnsCache>,
    scorer: Option<Arc<ReputationScorer>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Prober {
    /// Creates a prober whose HTTP client resolves hostnames through `dns`.
    ///
    /// Redirects are not followed, so a 3xx reply is judged on its own.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Client`] if the HTTP client cannot be built.
    pub fn new(
        config: &ProbeConfig,
        validator_id: ValidatorId,
        location: impl Into<String>,
        cache: Arc<VoteCache>,
        dns: Arc<DnsCache>,
    ) -> Result<Self, ProbeError> {
        let client = ClientBuilder::new()
            .use_rustls_tls()
            .redirect(Policy::none())
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.timeout())
            .pool_idle_timeout(Duration::from_secs(30))
            .dns_resolver(Arc::new(CachingResolver::new(dns.clone())))
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;

        Ok(Self {
            client,
            mode: config.mode,
            validator_id,
            location: location.into(),
            cache,
            dns,
            scorer: None,
            metrics: None,
        })
    }

    /// Casts votes with the validator's reputation weight instead of the default.
    #[must_use]
    pub fn with_scorer(mut self, scorer: Arc<ReputationScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn validator_id(&self) -> ValidatorId {
        self.validator_id
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<VoteCache> {
        &self.cache
    }

    /// Probes `url` once and records the resulting vote in the cache.
    ///
    /// Never fails: a network error, timeout or non-2xx/3xx reply yields a `DOWN` vote.
    pub async fn check_target(&self, url: &str, timeout: Duration) -> Vote {
        let started = Instant::now();
        let outcome = match self.mode {
            ProbeMode::Http => self.probe_http(url, timeout).await,
            ProbeMode::Tcp => self.probe_tcp(url, timeout).await,
        };
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let weight =
            self.scorer.as_ref().map_or(DEFAULT_VOTE_WEIGHT, |s| s.weight(self.validator_id));
        let mut vote = Vote::new(self.validator_id, VoteStatus::Up, latency_ms, self.location.clone())
            .with_weight(weight);

        if let Err(e) = outcome {
            debug!(url = %url, error = %e, latency_ms, "probe failed");
            vote.status = VoteStatus::Down;
            vote.probe_ok = e.target_replied();
        }

        self.cache.put(url, vote.clone());
        if let Some(metrics) = &self.metrics {
            metrics.record_probe(url, vote.status, latency_ms);
        }
        vote
    }

    async fn probe_http(&self, url: &str, timeout: Duration) -> Result<(), ProbeError> {
        let parsed = parse_target(url)?;
        let response =
            self.client.get(parsed).timeout(timeout).send().await.map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout(timeout)
                } else {
                    ProbeError::Connection(describe_reqwest_error(&e))
                }
            })?;

        let status = response.status();
        if status.is_success() || status.is_redirection() {
            Ok(())
        } else {
            Err(ProbeError::Status(status.as_u16()))
        }
    }

    async fn probe_tcp(&self, url: &str, timeout: Duration) -> Result<(), ProbeError> {
        let parsed = parse_target(url)?;
        let host = parsed.host_str().ok_or_else(|| ProbeError::InvalidTarget {
            url: url.to_string(),
            message: "missing host".to_string(),
        })?;
        let port = parsed.port_or_known_default().unwrap_or(80);

        let addrs: Vec<SocketAddr> =
            self.dns.resolve(host).await?.into_iter().map(|ip| SocketAddr::new(ip, port)).collect();

        match tokio::time::timeout(timeout, TcpStream::connect(&addrs[..])).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(ProbeError::Connection(e.to_string())),
            Err(_) => Err(ProbeError::Timeout(timeout)),
        }
    }
}

fn parse_target(url: &str) -> Result<Url, ProbeError> {
    Url::parse(url)
        .map_err(|e| ProbeError::InvalidTarget { url: url.to_string(), message: e.to_string() })
}

fn describe_reqwest_error(error: &reqwest::Error) -> String {
    if error.is_connect() {
        "connection refused or unreachable".to_string()
    } else if error.is_request() {
        "request failed".to_string()
    } else if error.is_body() {
        "response body error".to_string()
    } else {
        "network error".to_string()
    }
}
