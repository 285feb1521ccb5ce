use super::{errors::RaftError, node::RaftNode, types::Command};
use crate::{
    quorum::{PublishError, VerdictPublisher},
    types::ConsensusVerdict,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Proposes resolved verdicts to the replicated log.
///
/// Only the leader's proposals enter the log. Followers resolve the same rounds from
/// the same bus votes, so their proposals are dropped rather than reported as failures.
pub struct RaftVerdictPublisher {
    node: Arc<RaftNode>,
}

impl RaftVerdictPublisher {
    #[must_use]
    pub fn new(node: Arc<RaftNode>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl VerdictPublisher for RaftVerdictPublisher {
    fn name(&self) -> &'static str {
        "raft"
    }

    async fn publish(&self, verdict: &ConsensusVerdict) -> Result<(), PublishError> {
        match self.node.propose(Command::Verdict(verdict.clone())) {
            Ok(index) => {
                debug!(key = %verdict.key(), index, "verdict proposed to raft log");
                Ok(())
            }
            Err(RaftError::NotLeader { leader_hint }) => {
                debug!(key = %verdict.key(), leader = ?leader_hint, "not leader, verdict not proposed");
                Ok(())
            }
            Err(e) => Err(PublishError::Unavailable(e.to_string())),
        }
    }
}
