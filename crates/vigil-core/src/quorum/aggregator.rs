use super::{
    buffer::PendingConsensus, config::QuorumConfig, tally::Tally, IngestOutcome, QuorumError,
    VerdictPublisher,
};
use crate::{
    alerts::AlertDispatcher,
    metrics::MetricsCollector,
    reputation::ReputationScorer,
    store::VoteStore,
    types::{ConsensusVerdict, RoundKey, Vote, VoteStatus},
};
use chrono::Utc;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

#[derive(Default)]
struct AggregatorState {
    pending: HashMap<RoundKey, PendingConsensus>,
    /// Resolved keys and when they resolved.
    processed: HashMap<RoundKey, Instant>,
}

/// Buffers votes per `(target, round)` and emits exactly one verdict per key.
pub struct QuorumAggregator {
    config: QuorumConfig,
    quorum: usize,
    state: Mutex<AggregatorState>,
    verdicts: broadcast::Sender<ConsensusVerdict>,
    scorer: Option<Arc<ReputationScorer>>,
    store: Option<Arc<dyn VoteStore>>,
    publishers: Vec<Arc<dyn VerdictPublisher>>,
    alerts: Option<Arc<dyn AlertDispatcher>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl QuorumAggregator {
    /// # Errors
    ///
    /// Returns [`QuorumError::InvalidConfig`] if the configuration is invalid or no
    /// quorum can be derived for `cluster_size`.
    pub fn new(config: QuorumConfig, cluster_size: usize) -> Result<Self, QuorumError> {
        config.validate().map_err(QuorumError::InvalidConfig)?;
        let quorum = config.resolve_quorum(cluster_size).map_err(QuorumError::InvalidConfig)?;
        let (verdicts, _) = broadcast::channel(config.subscriber_capacity.max(1));

        Ok(Self {
            config,
            quorum,
            state: Mutex::new(AggregatorState::default()),
            verdicts,
            scorer: None,
            store: None,
            publishers: Vec::new(),
            alerts: None,
            metrics: None,
        })
    }

    #[must_use]
    pub fn with_scorer(mut self, scorer: Arc<ReputationScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn VoteStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Adds a downstream publisher. Publishers run in the order they were added.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn VerdictPublisher>) -> Self {
        self.publishers.push(publisher);
        self
    }

    #[must_use]
    pub fn with_alerts(mut self, alerts: Arc<dyn AlertDispatcher>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn quorum(&self) -> usize {
        self.quorum
    }

    #[must_use]
    pub fn config(&self) -> &QuorumConfig {
        &self.config
    }

    /// Live verdict stream. Subscribers that fall behind lose the oldest verdicts.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConsensusVerdict> {
        self.verdicts.subscribe()
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    #[must_use]
    pub fn processed_len(&self) -> usize {
        self.state.lock().processed.len()
    }

    #[must_use]
    pub fn is_processed(&self, key: &RoundKey) -> bool {
        self.state.lock().processed.contains_key(key)
    }

    /// Votes currently buffered for `key`.
    #[must_use]
    pub fn pending_votes(&self, key: &RoundKey) -> Vec<Vote> {
        self.state.lock().pending.get(key).map(|p| p.votes.clone()).unwrap_or_default()
    }

    /// Ingests a vote into the round window containing its observation time.
    pub async fn ingest_windowed(&self, vote: Vote, target: &str) -> IngestOutcome {
        let key = RoundKey::windowed(target, vote.observed_at, self.config.round_window());
        self.ingest(vote, &key.target, key.round).await
    }

    /// Adds a vote to the buffer for `(target, round)`.
    ///
    /// The call that completes quorum resolves the round: the buffer is removed, the key
    /// is marked processed and the verdict goes to the store, live subscribers,
    /// publishers and regional alerts, in that order. Those side effects never undo a
    /// resolution; their failures are logged.
    pub async fn ingest(&self, mut vote: Vote, target: &str, round: i64) -> IngestOutcome {
        let key = RoundKey::new(target, round);

        if self.is_stale(round) {
            debug!(key = %key, "vote for expired round rejected");
            self.record_outcome("stale");
            return IngestOutcome::Stale;
        }

        vote.weight = self.effective_weight(&vote);

        let verdict = {
            let mut state = self.state.lock();
            if state.processed.contains_key(&key) {
                drop(state);
                debug!(key = %key, validator = %vote.validator_id, "vote for resolved round ignored");
                self.record_outcome("already_processed");
                return IngestOutcome::AlreadyProcessed;
            }

            let pending = state
                .pending
                .entry(key.clone())
                .or_insert_with(|| PendingConsensus::new(Instant::now()));

            if !pending.push(vote) {
                drop(state);
                self.record_outcome("duplicate");
                return IngestOutcome::Duplicate;
            }

            let tally = Tally::of(&pending.votes, |v| v.weight);
            let count = pending.len();
            if count < self.quorum || tally.total_weight() < self.config.min_total_weight {
                let pending_rounds = state.pending.len();
                drop(state);
                self.record_outcome("buffered");
                if let Some(metrics) = &self.metrics {
                    metrics.record_pending_rounds(pending_rounds);
                }
                return IngestOutcome::Buffered { count, needed: self.quorum };
            }

            let Some(resolved) = state.pending.remove(&key) else {
                return IngestOutcome::Buffered { count, needed: self.quorum };
            };
            state.processed.insert(key.clone(), Instant::now());

            ConsensusVerdict {
                target: key.target.clone(),
                round: key.round,
                status: tally.verdict(),
                votes: resolved.votes,
                up_weight: tally.up_weight,
                down_weight: tally.down_weight,
                observed_at: Utc::now(),
            }
        };

        info!(
            key = %key,
            status = %verdict.status,
            votes = verdict.votes.len(),
            up_weight = verdict.up_weight,
            down_weight = verdict.down_weight,
            "consensus reached"
        );
        self.record_outcome("resolved");
        self.emit(&verdict).await;

        IngestOutcome::Resolved(verdict)
    }

    /// Drops pending rounds older than the vote TTL and forgets processed keys older
    /// than the retention window. Returns the number of pending rounds dropped.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let ttl = self.config.vote_ttl();
        let retention = self.config.processed_key_retention();

        let (evicted, pending_rounds) = {
            let mut state = self.state.lock();
            let before = state.pending.len();
            state.pending.retain(|_, pending| !pending.is_expired(now, ttl));
            state
                .processed
                .retain(|_, resolved_at| now.saturating_duration_since(*resolved_at) < retention);
            (before - state.pending.len(), state.pending.len())
        };

        if evicted > 0 {
            info!(evicted, remaining = pending_rounds, "expired pending rounds dropped");
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_ttl_evictions(evicted);
            metrics.record_pending_rounds(pending_rounds);
        }
        evicted
    }

    /// Spawns the periodic TTL sweep.
    #[must_use]
    pub fn start_sweeper(self: &Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let aggregator = Arc::clone(self);
        let period = self.config.sweep_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        aggregator.sweep_expired(Instant::now());
                    }
                    _ = shutdown_rx.recv() => {
                        info!("quorum sweeper shutting down");
                        break;
                    }
                }
            }
        })
    }

    fn effective_weight(&self, vote: &Vote) -> f64 {
        if !self.config.use_reputation_weights {
            return vote.weight;
        }
        self.scorer
            .as_ref()
            .and_then(|scorer| scorer.known_weight(vote.validator_id))
            .unwrap_or(vote.weight)
    }

    fn is_stale(&self, round: i64) -> bool {
        let retention_ms =
            i64::try_from(self.config.processed_key_retention().as_millis()).unwrap_or(i64::MAX);
        round < Utc::now().timestamp_millis().saturating_sub(retention_ms)
    }

    fn record_outcome(&self, outcome: &'static str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_vote_ingested(outcome);
        }
    }

    async fn emit(&self, verdict: &ConsensusVerdict) {
        if let Some(metrics) = &self.metrics {
            metrics.record_verdict(&verdict.target, verdict.status);
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.persist(verdict).await {
                warn!(key = %verdict.key(), error = %e, "failed to persist verdict");
            }
        }

        // No live subscribers is fine.
        let _ = self.verdicts.send(verdict.clone());

        for publisher in &self.publishers {
            if let Err(e) = publisher.publish(verdict).await {
                warn!(
                    key = %verdict.key(),
                    publisher = publisher.name(),
                    error = %e,
                    "verdict publish failed"
                );
            }
        }

        if let Some(alerts) = &self.alerts {
            for vote in verdict.votes.iter().filter(|v| v.status == VoteStatus::Down) {
                if let Err(e) = alerts.dispatch(&verdict.target, vote).await {
                    warn!(key = %verdict.key(), validator = %vote.validator_id, error = %e, "regional alert failed");
                }
            }
        }
    }
}
