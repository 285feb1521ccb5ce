//! In-process Raft cluster over a [`LocalNetwork`].

use parking_lot::Mutex;
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::sync::broadcast;
use vigil_core::raft::{
    LocalNetwork, LogEntry, MemoryStorage, NodeId, RaftConfig, RaftNode, RaftRole, RaftRuntime,
    RaftStorage,
};

use super::test_helpers::fast_raft_config;

type AppliedLog = Arc<Mutex<Vec<(u64, LogEntry)>>>;

/// Nodes `1..=n`, each with its election and heartbeat tasks running.
pub struct RaftTestCluster {
    network: Arc<LocalNetwork>,
    nodes: Vec<Arc<RaftNode>>,
    storages: Vec<Arc<MemoryStorage>>,
    applied: Vec<AppliedLog>,
    runtimes: Vec<RaftRuntime>,
    isolated: Mutex<HashSet<NodeId>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl RaftTestCluster {
    /// Starts `size` nodes with [`fast_raft_config`].
    pub fn start(size: u64) -> Self {
        Self::start_with(size, fast_raft_config())
    }

    pub fn start_with(size: u64, config: RaftConfig) -> Self {
        let network = LocalNetwork::new();
        let (shutdown_tx, _) = broadcast::channel(1);
        let ids: Vec<NodeId> = (1..=size).collect();

        let mut nodes = Vec::new();
        let mut storages = Vec::new();
        let mut applied = Vec::new();
        for &id in &ids {
            let storage = Arc::new(MemoryStorage::new());
            let log: AppliedLog = Arc::new(Mutex::new(Vec::new()));
            let sink = log.clone();

            let node = RaftNode::new(
                id,
                ids.clone(),
                config.clone(),
                Arc::new(network.transport(id)),
                storage.clone() as Arc<dyn RaftStorage>,
            )
            .expect("valid raft config")
            .with_apply_handler(Arc::new(move |index: u64, entry: &LogEntry| {
                sink.lock().push((index, entry.clone()));
            }));
            let node = Arc::new(node);
            network.register(&node);

            nodes.push(node);
            storages.push(storage);
            applied.push(log);
        }

        let runtimes = nodes
            .iter()
            .map(|node| RaftRuntime::start_with_shutdown(node.clone(), shutdown_tx.subscribe()))
            .collect();

        Self {
            network,
            nodes,
            storages,
            applied,
            runtimes,
            isolated: Mutex::new(HashSet::new()),
            shutdown_tx,
        }
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &Arc<RaftNode> {
        &self.nodes[Self::slot(id)]
    }

    #[must_use]
    pub fn nodes(&self) -> &[Arc<RaftNode>] {
        &self.nodes
    }

    #[must_use]
    pub fn storage(&self, id: NodeId) -> &Arc<MemoryStorage> {
        &self.storages[Self::slot(id)]
    }

    /// Entries handed to the apply handler of node `id`, in order.
    #[must_use]
    pub fn applied(&self, id: NodeId) -> Vec<(u64, LogEntry)> {
        self.applied[Self::slot(id)].lock().clone()
    }

    pub fn isolate(&self, id: NodeId) {
        self.isolated.lock().insert(id);
        self.network.isolate(id);
    }

    pub fn heal(&self, id: NodeId) {
        self.isolated.lock().remove(&id);
        self.network.heal(id);
    }

    /// Leaders among nodes that are not isolated.
    #[must_use]
    pub fn connected_leaders(&self) -> Vec<Arc<RaftNode>> {
        let isolated = self.isolated.lock().clone();
        self.nodes
            .iter()
            .filter(|node| !isolated.contains(&node.id()) && node.role() == RaftRole::Leader)
            .cloned()
            .collect()
    }

    /// Polls until exactly one connected node leads, or `timeout` passes.
    pub async fn wait_for_leader(&self, timeout: Duration) -> Option<Arc<RaftNode>> {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            let leaders = self.connected_leaders();
            if leaders.len() == 1 {
                return leaders.into_iter().next();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }

    /// Waits until node `id` has applied at least `index`.
    pub async fn wait_for_applied(&self, id: NodeId, index: u64, timeout: Duration) -> bool {
        let mut applied = self.node(id).applied_watch();
        tokio::time::timeout(timeout, applied.wait_for(|applied| *applied >= index))
            .await
            .is_ok_and(|result| result.is_ok())
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        for runtime in self.runtimes {
            runtime.join().await;
        }
    }

    fn slot(id: NodeId) -> usize {
        usize::try_from(id - 1).expect("node ids start at 1")
    }
}
