//! Event bus between validators and aggregating nodes.
//!
//! Raw votes flow in, verdicts flow out. Delivery is at-least-once; the quorum
//! aggregator deduplicates repeated votes per round key. [`LocalEventBus`] is the
//! in-process implementation over `tokio::sync::broadcast`; an external broker client
//! plugs in behind the same [`EventBus`] trait.

use crate::{
    quorum::{PublishError, QuorumAggregator, VerdictPublisher},
    types::{ConsensusVerdict, RawVoteEvent, RoundKey, VerdictEvent},
};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

/// Buffered events per channel before slow subscribers start lagging.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("event bus unavailable: {0}")]
    Unavailable(String),
}

pub trait EventBus: Send + Sync {
    /// Publishes a raw vote. Returns the number of local subscribers reached.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unavailable`] if the bus cannot accept events.
    fn publish_vote(&self, event: RawVoteEvent) -> Result<usize, BusError>;

    /// Publishes a verdict. Returns the number of local subscribers reached.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unavailable`] if the bus cannot accept events.
    fn publish_verdict(&self, event: VerdictEvent) -> Result<usize, BusError>;

    fn subscribe_votes(&self) -> broadcast::Receiver<RawVoteEvent>;

    fn subscribe_verdicts(&self) -> broadcast::Receiver<VerdictEvent>;
}

/// In-process bus. Publishing with no subscribers is not an error.
pub struct LocalEventBus {
    votes: broadcast::Sender<RawVoteEvent>,
    verdicts: broadcast::Sender<VerdictEvent>,
}

impl LocalEventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (votes, _) = broadcast::channel(capacity.max(1));
        let (verdicts, _) = broadcast::channel(capacity.max(1));
        Self { votes, verdicts }
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl EventBus for LocalEventBus {
    fn publish_vote(&self, event: RawVoteEvent) -> Result<usize, BusError> {
        Ok(self.votes.send(event).unwrap_or(0))
    }

    fn publish_verdict(&self, event: VerdictEvent) -> Result<usize, BusError> {
        Ok(self.verdicts.send(event).unwrap_or(0))
    }

    fn subscribe_votes(&self) -> broadcast::Receiver<RawVoteEvent> {
        self.votes.subscribe()
    }

    fn subscribe_verdicts(&self) -> broadcast::Receiver<VerdictEvent> {
        self.verdicts.subscribe()
    }
}

/// Forwards resolved verdicts onto the bus.
pub struct BusVerdictPublisher {
    bus: Arc<dyn EventBus>,
}

impl BusVerdictPublisher {
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl VerdictPublisher for BusVerdictPublisher {
    fn name(&self) -> &'static str {
        "bus"
    }

    async fn publish(&self, verdict: &ConsensusVerdict) -> Result<(), PublishError> {
        self.bus
            .publish_verdict(VerdictEvent::from(verdict))
            .map(|_| ())
            .map_err(|e| PublishError::Unavailable(e.to_string()))
    }
}

/// Drains raw vote events from the bus into a quorum aggregator.
pub struct VoteConsumer {
    bus: Arc<dyn EventBus>,
    aggregator: Arc<QuorumAggregator>,
    round_window: Duration,
}

impl VoteConsumer {
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>, aggregator: Arc<QuorumAggregator>, round_window: Duration) -> Self {
        Self { bus, aggregator, round_window }
    }

    /// Spawns the consumer loop. It subscribes before returning, so no event published
    /// after this call is missed.
    #[must_use]
    pub fn start_with_shutdown(&self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let mut votes = self.bus.subscribe_votes();
        let aggregator = self.aggregator.clone();
        let window = self.round_window;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = votes.recv() => match received {
                        Ok(event) => {
                            let key = RoundKey::windowed(event.url.clone(), event.timestamp, window);
                            let (target, vote) = event.into_vote();
                            let outcome = aggregator.ingest(vote, &target, key.round).await;
                            debug!(url = %target, round = key.round, outcome = ?outcome, "bus vote ingested");
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "vote consumer lagged, events dropped");
                        }
                        Err(RecvError::Closed) => {
                            info!("vote bus closed, consumer stopping");
                            break;
                        }
                    },
                    _ = shutdown_rx.recv() => {
                        info!("vote consumer shutting down");
                        break;
                    }
                }
            }
        })
    }
}
