use super::types::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RaftError {
    #[error("not the leader (leader hint: {leader_hint:?})")]
    NotLeader { leader_hint: Option<NodeId> },

    #[error("unknown peer {0}")]
    UnknownPeer(NodeId),

    #[error("rpc to peer {peer} failed: {message}")]
    Transport { peer: NodeId, message: String },

    #[error("rpc to peer {peer} timed out")]
    Timeout { peer: NodeId },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid raft configuration: {0}")]
    InvalidConfig(String),

    #[error("timed out waiting for index {index} to commit")]
    CommitTimeout { index: u64 },

    #[error("raft node is shutting down")]
    Shutdown,
}

impl From<std::io::Error> for RaftError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for RaftError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
