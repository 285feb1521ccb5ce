//! Raft RPC transports.

use super::{
    errors::RaftError,
    node::RaftNode,
    types::{
        AppendEntriesRequest, AppendEntriesResponse, NodeId, RequestVoteRequest, RequestVoteResponse,
    },
};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, ClientBuilder};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Weak},
    time::Duration,
};

#[async_trait]
pub trait RaftTransport: Send + Sync {
    async fn request_vote(
        &self,
        peer: NodeId,
        request: RequestVoteRequest,
    ) -> Result<RequestVoteResponse, RaftError>;

    async fn append_entries(
        &self,
        peer: NodeId,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, RaftError>;
}

/// JSON over HTTP to `{peer}/raft/request-vote` and `{peer}/raft/append-entries`.
pub struct HttpRaftTransport {
    client: Client,
    peers: HashMap<NodeId, String>,
    timeout: Duration,
}

impl HttpRaftTransport {
    /// # Errors
    ///
    /// Returns [`RaftError::Transport`] if the HTTP client cannot be built.
    pub fn new(peers: HashMap<NodeId, String>, timeout: Duration) -> Result<Self, RaftError> {
        let client = ClientBuilder::new()
            .use_rustls_tls()
            .connect_timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| RaftError::Transport { peer: 0, message: e.to_string() })?;
        Ok(Self { client, peers, timeout })
    }

    async fn post<Req, Resp>(&self, peer: NodeId, path: &str, body: &Req) -> Result<Resp, RaftError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let base = self.peers.get(&peer).ok_or(RaftError::UnknownPeer(peer))?;
        let url = format!("{}{path}", base.trim_end_matches('/'));

        let response = self.client.post(&url).timeout(self.timeout).json(body).send().await.map_err(
            |e| {
                if e.is_timeout() {
                    RaftError::Timeout { peer }
                } else {
                    RaftError::Transport { peer, message: e.to_string() }
                }
            },
        )?;

        if !response.status().is_success() {
            return Err(RaftError::Transport {
                peer,
                message: format!("status {}", response.status()),
            });
        }
        response.json::<Resp>().await.map_err(|e| RaftError::Transport { peer, message: e.to_string() })
    }
}

#[async_trait]
impl RaftTransport for HttpRaftTransport {
    async fn request_vote(
        &self,
        peer: NodeId,
        request: RequestVoteRequest,
    ) -> Result<RequestVoteResponse, RaftError> {
        self.post(peer, "/raft/request-vote", &request).await
    }

    async fn append_entries(
        &self,
        peer: NodeId,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, RaftError> {
        self.post(peer, "/raft/append-entries", &request).await
    }
}

/// In-process network of nodes with partition control.
#[derive(Default)]
pub struct LocalNetwork {
    nodes: RwLock<HashMap<NodeId, Weak<RaftNode>>>,
    isolated: RwLock<HashSet<NodeId>>,
}

impl LocalNetwork {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, node: &Arc<RaftNode>) {
        self.nodes.write().insert(node.id(), Arc::downgrade(node));
    }

    /// Cuts `id` off from every other node in both directions.
    pub fn isolate(&self, id: NodeId) {
        self.isolated.write().insert(id);
    }

    pub fn heal(&self, id: NodeId) {
        self.isolated.write().remove(&id);
    }

    #[must_use]
    pub fn transport(self: &Arc<Self>, from: NodeId) -> LocalRaftTransport {
        LocalRaftTransport { from, network: Arc::clone(self) }
    }

    fn route(&self, from: NodeId, to: NodeId) -> Result<Arc<RaftNode>, RaftError> {
        {
            let isolated = self.isolated.read();
            if isolated.contains(&from) || isolated.contains(&to) {
                return Err(RaftError::Transport { peer: to, message: "partitioned".to_string() });
            }
        }
        self.nodes.read().get(&to).and_then(Weak::upgrade).ok_or(RaftError::UnknownPeer(to))
    }
}

pub struct LocalRaftTransport {
    from: NodeId,
    network: Arc<LocalNetwork>,
}

#[async_trait]
impl RaftTransport for LocalRaftTransport {
    async fn request_vote(
        &self,
        peer: NodeId,
        request: RequestVoteRequest,
    ) -> Result<RequestVoteResponse, RaftError> {
        let node = self.network.route(self.from, peer)?;
        Ok(node.handle_request_vote(&request))
    }

    async fn append_entries(
        &self,
        peer: NodeId,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, RaftError> {
        let node = self.network.route(self.from, peer)?;
        Ok(node.handle_append_entries(request))
    }
}
