//! Recording implementations of the core's transport and sink traits.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use vigil_core::{
    alerts::{AlertDispatcher, AlertError, RegionalAlert},
    gossip::{GossipDisseminator, GossipError, GossipMessage, GossipTransport},
    quorum::{PublishError, VerdictPublisher},
    types::{ConsensusVerdict, Vote},
};

/// Records every push and, for registered peers, delivers it to their disseminator.
///
/// Peers named in `unreachable` fail with a transport error.
#[derive(Default)]
pub struct RecordingGossipTransport {
    sent: Mutex<Vec<(String, GossipMessage)>>,
    peers: Mutex<HashMap<String, Arc<GossipDisseminator>>>,
    unreachable: Mutex<Vec<String>>,
}

impl RecordingGossipTransport {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connect(&self, peer: impl Into<String>, disseminator: Arc<GossipDisseminator>) {
        self.peers.lock().insert(peer.into(), disseminator);
    }

    pub fn make_unreachable(&self, peer: impl Into<String>) {
        self.unreachable.lock().push(peer.into());
    }

    #[must_use]
    pub fn sent(&self) -> Vec<(String, GossipMessage)> {
        self.sent.lock().clone()
    }

    #[must_use]
    pub fn sent_to(&self, peer: &str) -> usize {
        self.sent.lock().iter().filter(|(p, _)| p == peer).count()
    }
}

#[async_trait]
impl GossipTransport for RecordingGossipTransport {
    async fn push(&self, peer: &str, message: &GossipMessage) -> Result<(), GossipError> {
        if self.unreachable.lock().iter().any(|p| p == peer) {
            return Err(GossipError::Transport {
                peer: peer.to_string(),
                message: "connection refused".to_string(),
            });
        }

        self.sent.lock().push((peer.to_string(), message.clone()));
        let receiver = self.peers.lock().get(peer).cloned();
        if let Some(receiver) = receiver {
            receiver.receive_gossip(message.clone())?;
        }
        Ok(())
    }
}

/// Captures dispatched alerts without any network.
#[derive(Default)]
pub struct RecordingAlertDispatcher {
    dispatched: Mutex<Vec<(String, Vote)>>,
}

impl RecordingAlertDispatcher {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn dispatched(&self) -> Vec<(String, Vote)> {
        self.dispatched.lock().clone()
    }
}

#[async_trait]
impl AlertDispatcher for RecordingAlertDispatcher {
    async fn dispatch(&self, target: &str, vote: &Vote) -> Result<Option<RegionalAlert>, AlertError> {
        self.dispatched.lock().push((target.to_string(), vote.clone()));
        Ok(None)
    }
}

/// Captures published verdicts; can be told to fail every publish.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<ConsensusVerdict>>,
    fail: bool,
}

impl RecordingPublisher {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn failing() -> Arc<Self> {
        Arc::new(Self { published: Mutex::new(Vec::new()), fail: true })
    }

    #[must_use]
    pub fn published(&self) -> Vec<ConsensusVerdict> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl VerdictPublisher for RecordingPublisher {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn publish(&self, verdict: &ConsensusVerdict) -> Result<(), PublishError> {
        self.published.lock().push(verdict.clone());
        if self.fail {
            return Err(PublishError::Unavailable("sink offline".to_string()));
        }
        Ok(())
    }
}
