//! Background tasks that drive a [`RaftNode`]: the election timer and the leader's
//! heartbeat loop.

use super::{node::RaftNode, types::RaftRole};
use std::sync::Arc;
use tokio::{sync::broadcast, task::JoinHandle, time::Instant};
use tracing::{debug, info};

pub struct RaftRuntime {
    election: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
}

impl RaftRuntime {
    /// Spawns both loops. They exit when `shutdown_rx` fires or its sender is dropped.
    #[must_use]
    pub fn start_with_shutdown(node: Arc<RaftNode>, shutdown_rx: broadcast::Receiver<()>) -> Self {
        let election = tokio::spawn(election_loop(node.clone(), shutdown_rx.resubscribe()));
        let heartbeat = tokio::spawn(heartbeat_loop(node, shutdown_rx));
        Self { election, heartbeat }
    }

    pub fn abort(&self) {
        self.election.abort();
        self.heartbeat.abort();
    }

    /// Waits for both loops to exit.
    pub async fn join(self) {
        let _ = self.election.await;
        let _ = self.heartbeat.await;
    }
}

async fn election_loop(node: Arc<RaftNode>, mut shutdown_rx: broadcast::Receiver<()>) {
    let heartbeat = node.config().heartbeat_interval();

    loop {
        // Leaders have no election deadline; poll at heartbeat pace until they step down.
        let wake_at = if node.role() == RaftRole::Leader {
            Instant::now() + heartbeat
        } else {
            node.election_deadline()
        };

        tokio::select! {
            () = tokio::time::sleep_until(wake_at) => {}
            _ = shutdown_rx.recv() => {
                info!(node = node.id(), "raft election loop shutting down");
                return;
            }
        }

        // The deadline moves whenever a leader is heard from or a vote is granted.
        if node.role() != RaftRole::Leader && Instant::now() >= node.election_deadline() {
            node.start_election().await;
        }
    }
}

async fn heartbeat_loop(node: Arc<RaftNode>, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut epoch = node.leadership_epoch();
    let interval = node.config().heartbeat_interval();

    loop {
        if node.is_leader() {
            epoch.borrow_and_update();
            debug!(node = node.id(), term = node.current_term(), "heartbeat loop leading");

            loop {
                node.replicate_once().await;

                tokio::select! {
                    () = tokio::time::sleep(interval) => {}
                    () = node.replication_requested() => {}
                    changed = epoch.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        info!(node = node.id(), "raft heartbeat loop shutting down");
                        return;
                    }
                }

                if !node.is_leader() {
                    break;
                }
            }
            debug!(node = node.id(), "heartbeat loop stopped leading");
        } else {
            tokio::select! {
                changed = epoch.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!(node = node.id(), "raft heartbeat loop shutting down");
                    return;
                }
            }
        }
    }
}
