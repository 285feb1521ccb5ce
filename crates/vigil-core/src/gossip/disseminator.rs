use super::{GossipConfig, GossipError, GossipMessage, GossipTransport};
use crate::{
    bus::EventBus,
    metrics::MetricsCollector,
    probe::VoteCache,
    types::{RawVoteEvent, ValidatorId},
};
use futures::future::join_all;
use rand::Rng;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

/// Outcome counters for one [`GossipDisseminator::run_rounds`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GossipReport {
    pub rounds_run: u32,
    pub skipped_rounds: u32,
    pub sent: u32,
    pub failed: u32,
}

/// Disseminates this validator's cached votes and merges votes received from peers.
pub struct GossipDisseminator {
    validator_id: ValidatorId,
    cache: Arc<VoteCache>,
    transport: Arc<dyn GossipTransport>,
    config: GossipConfig,
    peers: Vec<String>,
    bus: Option<Arc<dyn EventBus>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl GossipDisseminator {
    #[must_use]
    pub fn new(
        validator_id: ValidatorId,
        cache: Arc<VoteCache>,
        transport: Arc<dyn GossipTransport>,
        config: GossipConfig,
    ) -> Self {
        Self { validator_id, cache, transport, config, peers: Vec::new(), bus: None, metrics: None }
    }

    /// Sets the peer set used by [`Self::disseminate`].
    #[must_use]
    pub fn with_peers(mut self, peers: Vec<String>) -> Self {
        self.peers = peers;
        self
    }

    /// Submits every accepted peer vote onto `bus` so the local aggregator counts it.
    #[must_use]
    pub fn with_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    /// Runs the configured number of rounds against the configured peers.
    pub async fn disseminate(&self, target: &str) -> GossipReport {
        self.run_rounds(target, self.config.rounds, &self.peers).await
    }

    /// Pushes the cached vote for `target` to every peer, `rounds` times.
    ///
    /// Each round re-reads the cache so a newer probe result is picked up. A round with
    /// no cached vote is skipped and logged. Rounds are separated by a random delay
    /// within the configured window; a failing peer never aborts a round.
    pub async fn run_rounds(&self, target: &str, rounds: u32, peers: &[String]) -> GossipReport {
        let mut report = GossipReport::default();

        for round in 0..rounds {
            if round > 0 {
                tokio::time::sleep(self.round_delay()).await;
            }

            let Some(vote) = self.cache.get(target) else {
                info!(url = %target, round, "no cached vote for target, skipping gossip round");
                report.skipped_rounds += 1;
                continue;
            };

            let message = GossipMessage::new(target, vote, self.validator_id);
            let outcomes = join_all(peers.iter().map(|peer| self.push_one(peer, &message))).await;
            for delivered in outcomes {
                if delivered {
                    report.sent += 1;
                } else {
                    report.failed += 1;
                }
            }
            report.rounds_run += 1;
        }

        debug!(
            url = %target,
            rounds_run = report.rounds_run,
            skipped = report.skipped_rounds,
            sent = report.sent,
            failed = report.failed,
            "gossip dissemination finished"
        );
        report
    }

    /// Merges a vote pushed by a peer. Returns whether the local cache changed.
    ///
    /// A valid vote is also submitted for aggregation, whatever the merge policy decided
    /// for the cache. Re-gossiped copies count once per validator and round key.
    ///
    /// # Errors
    ///
    /// Returns [`GossipError::InvalidPayload`] for malformed messages; the cache is left
    /// untouched.
    pub fn receive_gossip(&self, message: GossipMessage) -> Result<bool, GossipError> {
        message.validate()?;

        let GossipMessage { target, vote, from_id, .. } = message;
        if let Some(bus) = &self.bus {
            if let Err(e) = bus.publish_vote(RawVoteEvent::from_vote(&target, &vote)) {
                warn!(url = %target, from = %from_id, error = %e, "failed to submit gossiped vote");
            }
        }
        let changed = self.cache.merge_gossip(&target, vote, self.config.merge_policy);

        debug!(url = %target, from = %from_id, changed, "gossip received");
        if let Some(metrics) = &self.metrics {
            metrics.record_gossip_received(changed);
        }
        Ok(changed)
    }

    async fn push_one(&self, peer: &str, message: &GossipMessage) -> bool {
        let outcome =
            tokio::time::timeout(self.config.request_timeout(), self.transport.push(peer, message))
                .await
                .unwrap_or_else(|_| Err(GossipError::Timeout { peer: peer.to_string() }));

        let delivered = match outcome {
            Ok(()) => true,
            Err(e) => {
                warn!(peer = %peer, url = %message.target, error = %e, "gossip push failed");
                false
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_gossip_send(peer, delivered);
        }
        delivered
    }

    fn round_delay(&self) -> Duration {
        let (low, high) = (self.config.min_delay_ms, self.config.max_delay_ms.max(self.config.min_delay_ms));
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }
}
