//! Runtime lifecycle management including background tasks and graceful shutdown.

use crate::{
    bus::VoteConsumer,
    config::AppConfig,
    raft::RaftRuntime,
    reputation::ReputationScorer,
    types::ConsensusVerdict,
};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use super::{builder::VigilRuntimeBuilder, VigilComponents};

/// Main runtime container managing component lifecycles and background tasks.
///
/// Owns all initialized components and their background tasks, providing graceful
/// shutdown coordination via a broadcast channel. When `shutdown()` is called, every task
/// is signaled and awaited.
pub struct VigilRuntime {
    components: VigilComponents,
    shutdown_tx: broadcast::Sender<()>,
    config: AppConfig,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    raft_runtime: Mutex<Option<RaftRuntime>>,
    shutdown_initiated: AtomicBool,
}

impl VigilRuntime {
    /// Creates a new builder for constructing a `VigilRuntime`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let runtime = VigilRuntime::builder()
    ///     .with_config(config)
    ///     .enable_aggregator()
    ///     .build()?;
    /// ```
    #[must_use]
    pub fn builder() -> VigilRuntimeBuilder {
        VigilRuntimeBuilder::new()
    }

    /// Starts the background tasks for every enabled component.
    ///
    /// Called by `VigilRuntimeBuilder` during initialization.
    pub(super) fn new(
        components: VigilComponents,
        shutdown_tx: broadcast::Sender<()>,
        config: AppConfig,
    ) -> Self {
        let mut tasks = Vec::new();

        if let Some(aggregator) = components.aggregator() {
            let consumer = VoteConsumer::new(
                components.bus().clone(),
                aggregator.clone(),
                config.quorum.round_window(),
            );
            tasks.push(("vote_consumer", consumer.start_with_shutdown(shutdown_tx.subscribe())));
            tasks.push(("quorum_sweeper", aggregator.start_sweeper(shutdown_tx.subscribe())));
            debug!("Vote consumer and sweeper tasks started");

            // Without Raft, locally resolved verdicts are final.
            if components.raft().is_none() {
                let feed = Self::start_reputation_feed(
                    aggregator.subscribe(),
                    components.scorer().clone(),
                    components.committed.clone(),
                    shutdown_tx.subscribe(),
                );
                tasks.push(("reputation_feed", feed));
                debug!("Reputation feed task started");
            }
        }

        let raft_runtime = components.raft().map(|node| {
            debug!(node = node.id(), "Raft timers started");
            RaftRuntime::start_with_shutdown(node.clone(), shutdown_tx.subscribe())
        });

        if let Some(scheduler) = components.scheduler() {
            tasks.push(("probe_scheduler", scheduler.clone().start_with_shutdown(shutdown_tx.subscribe())));
            debug!(targets = scheduler.targets().len(), "Probe scheduler task started");
        }

        Self {
            components,
            shutdown_tx,
            config,
            tasks: Mutex::new(tasks),
            raft_runtime: Mutex::new(raft_runtime),
            shutdown_initiated: AtomicBool::new(false),
        }
    }

    /// Returns a reference to all runtime components.
    #[must_use]
    pub fn components(&self) -> &VigilComponents {
        &self.components
    }

    /// Returns a reference to the application configuration.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Creates a new shutdown receiver for external shutdown coordination.
    ///
    /// Useful for listening to shutdown signals in custom background tasks.
    #[must_use]
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Initiates graceful shutdown of all background tasks.
    ///
    /// Broadcasts the shutdown signal and waits for every task to finish. Idempotent.
    pub async fn shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Shutdown already initiated, ignoring duplicate call");
            return;
        }

        info!("Initiating vigil runtime shutdown");
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!(error = %e, "Failed to send shutdown signal (no receivers)");
        }
        debug!("Shutdown signal broadcast to all tasks");

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for (name, handle) in tasks {
            match handle.await {
                Ok(()) => debug!(task = name, "Task completed"),
                Err(e) if e.is_cancelled() => debug!(task = name, "Task was cancelled"),
                Err(e) => error!(task = name, error = %e, "Task panicked"),
            }
        }

        let raft_runtime = self.raft_runtime.lock().take();
        if let Some(raft_runtime) = raft_runtime {
            raft_runtime.join().await;
            debug!("Raft timers stopped");
        }

        info!("Vigil runtime shutdown complete");
    }

    /// Waits for a shutdown signal (SIGTERM or SIGINT) and then performs graceful shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if signal handlers cannot be installed.
    #[cfg(unix)]
    pub async fn wait_for_shutdown(&self) -> Result<(), std::io::Error> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }

        self.shutdown().await;
        Ok(())
    }

    /// Waits for Ctrl+C and then performs graceful shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the Ctrl+C handler cannot be installed.
    #[cfg(not(unix))]
    pub async fn wait_for_shutdown(&self) -> Result<(), std::io::Error> {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
        self.shutdown().await;
        Ok(())
    }

    fn start_reputation_feed(
        mut verdicts: broadcast::Receiver<ConsensusVerdict>,
        scorer: Arc<ReputationScorer>,
        committed: broadcast::Sender<ConsensusVerdict>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = verdicts.recv() => match received {
                        Ok(verdict) => {
                            scorer.record_verdict(&verdict);
                            let _ = committed.send(verdict);
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "reputation feed lagged, verdicts not scored");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = shutdown_rx.recv() => {
                        info!("Reputation feed shutting down");
                        break;
                    }
                }
            }
        })
    }
}

// Handlers hold the runtime behind an `Arc` across await points.
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<VigilRuntime>();
};
