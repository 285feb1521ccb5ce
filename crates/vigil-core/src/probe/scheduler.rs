use super::Prober;
use crate::{bus::EventBus, gossip::GossipDisseminator, types::RawVoteEvent};
use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

/// Runs the probe cycle for every target on a fixed interval.
///
/// One cycle probes each target, submits the vote to the event bus and then gossips it.
/// Targets are processed concurrently; gossip rounds for one target never delay the
/// probe of another.
pub struct ProbeScheduler {
    prober: Arc<Prober>,
    gossip: Option<Arc<GossipDisseminator>>,
    bus: Option<Arc<dyn EventBus>>,
    targets: Vec<String>,
    interval: Duration,
    timeout: Duration,
}

impl ProbeScheduler {
    #[must_use]
    pub fn new(prober: Arc<Prober>, targets: Vec<String>, interval: Duration, timeout: Duration) -> Self {
        Self { prober, gossip: None, bus: None, targets, interval, timeout }
    }

    #[must_use]
    pub fn with_gossip(mut self, gossip: Arc<GossipDisseminator>) -> Self {
        self.gossip = Some(gossip);
        self
    }

    #[must_use]
    pub fn with_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    #[must_use]
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Probes, submits and gossips one target.
    pub async fn run_target(&self, target: &str) {
        let vote = self.prober.check_target(target, self.timeout).await;
        debug!(url = %target, status = %vote.status, latency_ms = vote.latency_ms, "probe complete");

        if let Some(bus) = &self.bus {
            if let Err(e) = bus.publish_vote(RawVoteEvent::from_vote(target, &vote)) {
                warn!(url = %target, error = %e, "failed to submit vote");
            }
        }

        if let Some(gossip) = &self.gossip {
            gossip.disseminate(target).await;
        }
    }

    /// Runs one full cycle over every target.
    pub async fn run_cycle(&self) {
        futures::future::join_all(self.targets.iter().map(|target| self.run_target(target))).await;
    }

    /// Spawns the interval loop. The first cycle starts immediately; a cycle in flight is
    /// abandoned on shutdown.
    #[must_use]
    pub fn start_with_shutdown(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(targets = self.targets.len(), interval_secs = self.interval.as_secs(), "probe scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tokio::select! {
                            () = self.run_cycle() => {}
                            _ = shutdown_rx.recv() => {
                                info!("probe scheduler shutting down mid-cycle");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("probe scheduler shutting down");
                        break;
                    }
                }
            }
        })
    }
}
