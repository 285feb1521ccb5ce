//! Per-hostname DNS cache shared by the HTTP client and TCP probes.

use super::ProbeError;
use crate::metrics::MetricsCollector;
use dashmap::DashMap;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::{
    net::{IpAddr, SocketAddr},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tracing::debug;

#[derive(Debug, Clone)]
struct CachedResolution {
    addrs: Vec<IpAddr>,
    resolved_at: Instant,
}

/// Caches resolved addresses per hostname.
///
/// A hit returns the cached addresses without touching the resolver; a miss (or an
/// entry older than the TTL) resolves and repopulates the entry. Failed resolutions
/// are not cached.
pub struct DnsCache {
    entries: DashMap<String, CachedResolution>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    metrics: Option<Arc<MetricsCollector>>,
}

impl DnsCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Resolves `host`, consulting the cache first.
    ///
    /// IP literals are returned as-is and never cached.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Dns`] if the lookup fails or yields no addresses.
    pub async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ProbeError> {
        if let Ok(ip) = host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        if let Some(cached) = self.lookup_cached(host) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            if let Some(metrics) = &self.metrics {
                metrics.record_dns_lookup(true);
            }
            return Ok(cached);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.record_dns_lookup(false);
        }

        let addrs: Vec<IpAddr> = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| ProbeError::Dns { host: host.to_string(), message: e.to_string() })?
            .map(|addr| addr.ip())
            .collect();

        if addrs.is_empty() {
            return Err(ProbeError::Dns {
                host: host.to_string(),
                message: "no addresses returned".to_string(),
            });
        }

        debug!(host = %host, addresses = addrs.len(), "dns resolution cached");
        self.insert(host, addrs.clone());
        Ok(addrs)
    }

    /// Seeds or replaces the cached addresses for a host.
    pub fn insert(&self, host: &str, addrs: Vec<IpAddr>) {
        self.entries
            .insert(host.to_string(), CachedResolution { addrs, resolved_at: Instant::now() });
    }

    #[must_use]
    pub fn contains(&self, host: &str) -> bool {
        self.lookup_cached(host).is_some()
    }

    /// Returns `(hits, misses)` since creation.
    #[must_use]
    pub fn stats(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }

    fn lookup_cached(&self, host: &str) -> Option<Vec<IpAddr>> {
        let entry = self.entries.get(host)?;
        if entry.resolved_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.addrs.clone())
    }
}

/// Adapter that lets `reqwest` resolve hostnames through a [`DnsCache`].
#[derive(Clone)]
pub struct CachingResolver {
    cache: Arc<DnsCache>,
}

impl CachingResolver {
    #[must_use]
    pub fn new(cache: Arc<DnsCache>) -> Self {
        Self { cache }
    }
}

impl Resolve for CachingResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let cache = self.cache.clone();
        Box::pin(async move {
            let ips = cache
                .resolve(name.as_str())
                .await
                .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })?;
            // The connector replaces the port with the one from the request URL.
            let addrs: Addrs = Box::new(ips.into_iter().map(|ip| SocketAddr::new(ip, 0)));
            Ok(addrs)
        })
    }
}
