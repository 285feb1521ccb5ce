//! Builder pattern for initializing the vigil runtime with configurable components.

use crate::{
    alerts::{AlertDispatcher, AlertManager, WebhookAlertDispatcher},
    bus::{BusVerdictPublisher, EventBus, LocalEventBus, DEFAULT_BUS_CAPACITY},
    config::AppConfig,
    gossip::{GossipDisseminator, GossipTransport, HttpGossipTransport},
    metrics::MetricsCollector,
    probe::{DnsCache, ProbeScheduler, Prober, VoteCache},
    quorum::QuorumAggregator,
    raft::{
        Command, FileStorage, HttpRaftTransport, LogEntry, MemoryStorage, RaftNode, RaftStorage,
        RaftTransport, RaftVerdictPublisher,
    },
    reputation::ReputationScorer,
    store::{JsonlVoteStore, MemoryVoteStore, VoteStore},
    types::ConsensusVerdict,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{lifecycle::VigilRuntime, VigilComponents};

/// Errors that can occur during runtime initialization.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Metrics collector initialization failed
    #[error("Failed to initialize metrics collector: {0}")]
    MetricsInitialization(String),

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// Generic initialization error
    #[error("Runtime initialization failed: {0}")]
    Initialization(String),
}

/// Configuration options for the runtime builder.
#[derive(Clone)]
struct RuntimeOptions {
    enable_prober: bool,
    enable_aggregator: bool,
    enable_raft: bool,
    shutdown_channel_capacity: usize,
    committed_channel_capacity: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            enable_prober: false,
            enable_aggregator: false,
            enable_raft: false,
            shutdown_channel_capacity: 16,
            committed_channel_capacity: 256,
        }
    }
}

/// Builder for constructing a [`VigilRuntime`].
///
/// Transports, storage and sinks default to their production implementations built from
/// the config; tests swap them for in-process ones.
#[derive(Default)]
pub struct VigilRuntimeBuilder {
    config: Option<AppConfig>,
    options: RuntimeOptions,
    gossip_transport: Option<Arc<dyn GossipTransport>>,
    raft_transport: Option<Arc<dyn RaftTransport>>,
    raft_storage: Option<Arc<dyn RaftStorage>>,
    vote_store: Option<Arc<dyn VoteStore>>,
    alert_dispatcher: Option<Arc<dyn AlertDispatcher>>,
    bus: Option<Arc<dyn EventBus>>,
}

impl VigilRuntimeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Probes the configured targets on an interval and gossips the results.
    #[must_use]
    pub fn enable_prober(mut self) -> Self {
        self.options.enable_prober = true;
        self
    }

    /// Consumes bus votes and resolves rounds.
    #[must_use]
    pub fn enable_aggregator(mut self) -> Self {
        self.options.enable_aggregator = true;
        self
    }

    /// Replicates verdicts through Raft. Ignored when `raft.enabled` is false.
    #[must_use]
    pub fn enable_raft(mut self) -> Self {
        self.options.enable_raft = true;
        self
    }

    /// Sets custom shutdown channel capacity (default: 16).
    #[must_use]
    pub fn with_shutdown_channel_capacity(mut self, capacity: usize) -> Self {
        self.options.shutdown_channel_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_gossip_transport(mut self, transport: Arc<dyn GossipTransport>) -> Self {
        self.gossip_transport = Some(transport);
        self
    }

    #[must_use]
    pub fn with_raft_transport(mut self, transport: Arc<dyn RaftTransport>) -> Self {
        self.raft_transport = Some(transport);
        self
    }

    #[must_use]
    pub fn with_raft_storage(mut self, storage: Arc<dyn RaftStorage>) -> Self {
        self.raft_storage = Some(storage);
        self
    }

    #[must_use]
    pub fn with_vote_store(mut self, store: Arc<dyn VoteStore>) -> Self {
        self.vote_store = Some(store);
        self
    }

    #[must_use]
    pub fn with_alert_dispatcher(mut self, dispatcher: Arc<dyn AlertDispatcher>) -> Self {
        self.alert_dispatcher = Some(dispatcher);
        self
    }

    #[must_use]
    pub fn with_event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Builds the runtime, initializing all components and starting background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError` if configuration is missing or invalid, or a component
    /// cannot be initialized.
    pub fn build(self) -> Result<VigilRuntime, RuntimeError> {
        let config = self.config.ok_or_else(|| {
            RuntimeError::ConfigValidation("No configuration provided".to_string())
        })?;

        config.validate().map_err(RuntimeError::ConfigValidation)?;
        let validator_id = config
            .validator_id()
            .ok_or_else(|| RuntimeError::ConfigValidation("node.validator_id is required".to_string()))?;

        let raft_enabled = self.options.enable_raft && config.raft.enabled;
        info!(
            validator_id = %validator_id,
            location = %config.node.location,
            cluster_size = config.cluster_size(),
            prober_enabled = self.options.enable_prober,
            aggregator_enabled = self.options.enable_aggregator,
            raft_enabled,
            "Initializing vigil runtime"
        );

        let (shutdown_tx, _) = broadcast::channel::<()>(self.options.shutdown_channel_capacity.max(1));
        let (committed, _) = broadcast::channel::<ConsensusVerdict>(self.options.committed_channel_capacity);

        let metrics_collector = Arc::new(
            MetricsCollector::new()
                .map_err(|e| RuntimeError::MetricsInitialization(e.to_string()))?,
        );
        debug!("Metrics collector initialized");

        let scorer = Arc::new(
            ReputationScorer::new(config.reputation.clone()).with_metrics(metrics_collector.clone()),
        );
        let vote_cache = Arc::new(VoteCache::new());
        let dns_cache =
            Arc::new(DnsCache::new(config.probe.dns_ttl()).with_metrics(metrics_collector.clone()));
        let bus = self.bus.unwrap_or_else(|| Arc::new(LocalEventBus::new(DEFAULT_BUS_CAPACITY)));

        let gossip_transport = match self.gossip_transport {
            Some(transport) => transport,
            None => Arc::new(
                HttpGossipTransport::new(config.gossip.request_timeout())
                    .map_err(|e| RuntimeError::Initialization(format!("Gossip transport: {e}")))?,
            ),
        };
        let gossip = Arc::new(
            GossipDisseminator::new(validator_id, vote_cache.clone(), gossip_transport, config.gossip.clone())
                .with_peers(config.peers.gossip.clone())
                .with_bus(bus.clone())
                .with_metrics(metrics_collector.clone()),
        );
        debug!(peers = config.peers.gossip.len(), "Gossip disseminator initialized");

        let alert_manager = Arc::new(AlertManager::with_capacity(config.alerts.max_retained));
        let vote_store: Arc<dyn VoteStore> = match (self.vote_store, &config.store.path) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(JsonlVoteStore::new(path)),
            (None, None) => Arc::new(MemoryVoteStore::new()),
        };

        let scheduler = if self.options.enable_prober {
            let prober = Prober::new(
                &config.probe,
                validator_id,
                config.node.location.clone(),
                vote_cache.clone(),
                dns_cache.clone(),
            )
            .map_err(|e| RuntimeError::Initialization(format!("Prober: {e}")))?
            .with_scorer(scorer.clone())
            .with_metrics(metrics_collector.clone());

            let scheduler = ProbeScheduler::new(
                Arc::new(prober),
                config.probe.targets.clone(),
                config.probe.interval(),
                config.probe.timeout(),
            )
            .with_gossip(gossip.clone())
            .with_bus(bus.clone());
            debug!(targets = config.probe.targets.len(), "Probe scheduler initialized");
            Some(Arc::new(scheduler))
        } else {
            None
        };

        let raft = if raft_enabled {
            let transport = match self.raft_transport {
                Some(transport) => transport,
                None => Arc::new(
                    HttpRaftTransport::new(config.raft_peer_urls(), config.raft.rpc_timeout())
                        .map_err(|e| RuntimeError::Initialization(format!("Raft transport: {e}")))?,
                ),
            };
            let storage: Arc<dyn RaftStorage> = match (self.raft_storage, &config.raft.storage_path) {
                (Some(storage), _) => storage,
                (None, Some(path)) => Arc::new(FileStorage::new(path)),
                (None, None) => Arc::new(MemoryStorage::new()),
            };

            let apply_scorer = scorer.clone();
            let apply_committed = committed.clone();
            let apply = move |index: u64, entry: &LogEntry| {
                if let Command::Verdict(verdict) = &entry.command {
                    debug!(index, key = %verdict.key(), status = %verdict.status, "applying committed verdict");
                    apply_scorer.record_verdict(verdict);
                    let _ = apply_committed.send(verdict.clone());
                }
            };

            let node = RaftNode::new(
                validator_id.0,
                config.peers.raft.iter().map(|p| p.id).collect(),
                config.raft.clone(),
                transport,
                storage,
            )
            .map_err(|e| RuntimeError::Initialization(format!("Raft node: {e}")))?
            .with_apply_handler(Arc::new(apply))
            .with_metrics(metrics_collector.clone());
            debug!(peers = config.peers.raft.len(), "Raft node initialized");
            Some(Arc::new(node))
        } else {
            None
        };

        let aggregator = if self.options.enable_aggregator {
            let alerts: Arc<dyn AlertDispatcher> = match self.alert_dispatcher {
                Some(dispatcher) => dispatcher,
                None => Arc::new(
                    WebhookAlertDispatcher::new(&config.alerts, alert_manager.clone())
                        .map_err(|e| RuntimeError::Initialization(format!("Alert dispatcher: {e}")))?
                        .with_metrics(metrics_collector.clone()),
                ),
            };

            let mut aggregator = QuorumAggregator::new(config.quorum.clone(), config.cluster_size())
                .map_err(|e| RuntimeError::ConfigValidation(e.to_string()))?
                .with_scorer(scorer.clone())
                .with_store(vote_store.clone())
                .with_publisher(Arc::new(BusVerdictPublisher::new(bus.clone())))
                .with_alerts(alerts)
                .with_metrics(metrics_collector.clone());
            if let Some(node) = &raft {
                aggregator = aggregator.with_publisher(Arc::new(RaftVerdictPublisher::new(node.clone())));
            }
            info!(quorum = aggregator.quorum(), "Quorum aggregator initialized");
            Some(Arc::new(aggregator))
        } else {
            None
        };

        let components = VigilComponents {
            metrics_collector,
            scorer,
            vote_cache,
            dns_cache,
            bus,
            gossip,
            alert_manager,
            vote_store,
            scheduler,
            aggregator,
            raft,
            committed,
        };
        let runtime = VigilRuntime::new(components, shutdown_tx, config);

        info!("Vigil runtime initialization complete");

        Ok(runtime)
    }
}
