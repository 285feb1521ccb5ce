//! Core component container for the vigil runtime.

use crate::{
    alerts::AlertManager,
    bus::EventBus,
    gossip::GossipDisseminator,
    metrics::MetricsCollector,
    probe::{DnsCache, ProbeScheduler, VoteCache},
    quorum::QuorumAggregator,
    raft::RaftNode,
    reputation::ReputationScorer,
    store::VoteStore,
    types::ConsensusVerdict,
};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Container for all initialized vigil components.
///
/// Everything is behind `Arc` and cheap to clone into HTTP handlers and tasks. Optional
/// components are `None` when the builder did not enable them.
#[derive(Clone)]
pub struct VigilComponents {
    pub(super) metrics_collector: Arc<MetricsCollector>,
    pub(super) scorer: Arc<ReputationScorer>,
    pub(super) vote_cache: Arc<VoteCache>,
    pub(super) dns_cache: Arc<DnsCache>,
    pub(super) bus: Arc<dyn EventBus>,
    pub(super) gossip: Arc<GossipDisseminator>,
    pub(super) alert_manager: Arc<AlertManager>,
    pub(super) vote_store: Arc<dyn VoteStore>,
    pub(super) scheduler: Option<Arc<ProbeScheduler>>,
    pub(super) aggregator: Option<Arc<QuorumAggregator>>,
    pub(super) raft: Option<Arc<RaftNode>>,
    pub(super) committed: broadcast::Sender<ConsensusVerdict>,
}

impl VigilComponents {
    #[must_use]
    pub fn metrics_collector(&self) -> &Arc<MetricsCollector> {
        &self.metrics_collector
    }

    #[must_use]
    pub fn scorer(&self) -> &Arc<ReputationScorer> {
        &self.scorer
    }

    #[must_use]
    pub fn vote_cache(&self) -> &Arc<VoteCache> {
        &self.vote_cache
    }

    #[must_use]
    pub fn dns_cache(&self) -> &Arc<DnsCache> {
        &self.dns_cache
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    /// Always present: peers may gossip to this node even when it does not probe.
    #[must_use]
    pub fn gossip(&self) -> &Arc<GossipDisseminator> {
        &self.gossip
    }

    #[must_use]
    pub fn alert_manager(&self) -> &Arc<AlertManager> {
        &self.alert_manager
    }

    #[must_use]
    pub fn vote_store(&self) -> &Arc<dyn VoteStore> {
        &self.vote_store
    }

    #[must_use]
    pub fn scheduler(&self) -> Option<&Arc<ProbeScheduler>> {
        self.scheduler.as_ref()
    }

    #[must_use]
    pub fn aggregator(&self) -> Option<&Arc<QuorumAggregator>> {
        self.aggregator.as_ref()
    }

    #[must_use]
    pub fn raft(&self) -> Option<&Arc<RaftNode>> {
        self.raft.as_ref()
    }

    /// Verdicts in commit order: applied from the Raft log when Raft is enabled, straight
    /// from the aggregator otherwise.
    #[must_use]
    pub fn subscribe_committed(&self) -> broadcast::Receiver<ConsensusVerdict> {
        self.committed.subscribe()
    }

    #[must_use]
    pub fn has_prober(&self) -> bool {
        self.scheduler.is_some()
    }

    #[must_use]
    pub fn has_aggregator(&self) -> bool {
        self.aggregator.is_some()
    }

    #[must_use]
    pub fn has_raft(&self) -> bool {
        self.raft.is_some()
    }
}
