//! Multi-node Raft scenarios over the in-process network.
//!
//! Nodes run their real election and heartbeat tasks with short timings, so these tests
//! exercise elections, replication and partitions end to end. Every wait is bounded.

use crate::mock_infrastructure::{vote, verdict, RaftTestCluster, TEST_TARGET};
use std::time::Duration;
use vigil_core::{
    raft::{Command, RaftError, RaftRole, RaftStorage},
    types::VoteStatus,
};

const LEADER_TIMEOUT: Duration = Duration::from_secs(5);
const COMMIT_TIMEOUT: Duration = Duration::from_secs(2);

fn verdict_command(status: VoteStatus) -> Command {
    Command::Verdict(verdict(TEST_TARGET, status, vec![vote(1, status), vote(2, status)]))
}

#[tokio::test]
async fn test_three_nodes_elect_one_leader() {
    let cluster = RaftTestCluster::start(3);

    let leader = cluster.wait_for_leader(LEADER_TIMEOUT).await.expect("leader elected");
    let term = leader.current_term();
    assert!(term >= 1);

    // Followers learn the leader from its first heartbeat.
    let mut agreed = false;
    for _ in 0..100 {
        agreed = cluster
            .nodes()
            .iter()
            .all(|node| node.leader_id() == Some(leader.id()) && node.current_term() == term);
        if agreed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(agreed, "followers did not converge on leader {}", leader.id());

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_committed_verdict_applies_everywhere_in_order() {
    let cluster = RaftTestCluster::start(3);
    let leader = cluster.wait_for_leader(LEADER_TIMEOUT).await.expect("leader elected");

    let first = leader
        .propose_and_wait(verdict_command(VoteStatus::Down), COMMIT_TIMEOUT)
        .await
        .expect("first verdict commits");
    let second = leader
        .propose_and_wait(verdict_command(VoteStatus::Up), COMMIT_TIMEOUT)
        .await
        .expect("second verdict commits");
    assert!(second > first);

    for node in cluster.nodes() {
        assert!(
            cluster.wait_for_applied(node.id(), second, COMMIT_TIMEOUT).await,
            "node {} did not apply index {second}",
            node.id()
        );
    }

    let reference = cluster.applied(leader.id());
    for node in cluster.nodes() {
        let applied = cluster.applied(node.id());
        let indexes: Vec<u64> = applied.iter().map(|(index, _)| *index).collect();
        assert_eq!(indexes, (1..=indexes.len() as u64).collect::<Vec<_>>(), "gap on node {}", node.id());
        assert_eq!(applied[..second as usize], reference[..second as usize]);
    }

    let statuses: Vec<VoteStatus> = reference
        .iter()
        .filter_map(|(_, entry)| match &entry.command {
            Command::Verdict(v) => Some(v.status),
            Command::Noop => None,
        })
        .collect();
    assert_eq!(statuses, vec![VoteStatus::Down, VoteStatus::Up]);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_follower_rejects_proposal_with_leader_hint() {
    let cluster = RaftTestCluster::start(3);
    let leader = cluster.wait_for_leader(LEADER_TIMEOUT).await.expect("leader elected");

    // Let a heartbeat reach the followers.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let follower = cluster.nodes().iter().find(|n| n.id() != leader.id()).expect("follower").clone();

    match follower.propose(verdict_command(VoteStatus::Up)) {
        Err(RaftError::NotLeader { leader_hint }) => assert_eq!(leader_hint, Some(leader.id())),
        other => panic!("expected NotLeader, got {other:?}"),
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_isolated_leader_is_replaced_and_steps_down_on_heal() {
    let cluster = RaftTestCluster::start(3);
    let old_leader = cluster.wait_for_leader(LEADER_TIMEOUT).await.expect("leader elected");
    let old_term = old_leader.current_term();

    cluster.isolate(old_leader.id());
    let new_leader = cluster.wait_for_leader(LEADER_TIMEOUT).await.expect("majority re-elects");
    assert_ne!(new_leader.id(), old_leader.id());
    assert!(new_leader.current_term() > old_term);

    let index = new_leader
        .propose_and_wait(verdict_command(VoteStatus::Down), COMMIT_TIMEOUT)
        .await
        .expect("majority side commits");

    cluster.heal(old_leader.id());
    assert!(
        cluster.wait_for_applied(old_leader.id(), index, LEADER_TIMEOUT).await,
        "healed node did not catch up"
    );
    assert_eq!(old_leader.role(), RaftRole::Follower);
    assert_eq!(old_leader.current_term(), new_leader.current_term());

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_commit_with_isolated_follower_applies_once_after_heal() {
    let cluster = RaftTestCluster::start(3);
    let leader = cluster.wait_for_leader(LEADER_TIMEOUT).await.expect("leader elected");
    tokio::time::sleep(Duration::from_millis(150)).await;
    let lagging = cluster.nodes().iter().find(|n| n.id() != leader.id()).expect("follower").clone();
    let peer = cluster
        .nodes()
        .iter()
        .find(|n| n.id() != leader.id() && n.id() != lagging.id())
        .expect("second follower")
        .clone();

    cluster.isolate(lagging.id());
    let index = leader
        .propose_and_wait(verdict_command(VoteStatus::Down), COMMIT_TIMEOUT)
        .await
        .expect("leader and one follower form a majority");

    assert!(leader.commit_index() >= index);
    assert!(cluster.wait_for_applied(peer.id(), index, COMMIT_TIMEOUT).await, "connected follower did not apply");
    assert!(lagging.commit_index() < index);
    assert!(cluster.applied(lagging.id()).iter().all(|(applied, _)| *applied < index));

    // The healed node may force a new election with its inflated term, but its shorter
    // log keeps it from winning, so the committed entry survives.
    cluster.heal(lagging.id());
    assert!(
        cluster.wait_for_applied(lagging.id(), index, LEADER_TIMEOUT).await,
        "healed follower did not catch up"
    );

    let committed = cluster.applied(leader.id()).into_iter().find(|(i, _)| *i == index).expect("leader applied");
    for node in cluster.nodes() {
        let applied = cluster.applied(node.id());
        let indexes: Vec<u64> = applied.iter().map(|(i, _)| *i).collect();
        assert_eq!(indexes, (1..=indexes.len() as u64).collect::<Vec<_>>(), "node {} applied out of order", node.id());
        let copies: Vec<_> = applied.iter().filter(|(i, _)| *i == index).collect();
        assert_eq!(copies.len(), 1, "node {} applied index {index} {} times", node.id(), copies.len());
        assert_eq!(*copies[0], committed);
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_leader_without_majority_cannot_commit() {
    let cluster = RaftTestCluster::start(3);
    let leader = cluster.wait_for_leader(LEADER_TIMEOUT).await.expect("leader elected");
    tokio::time::sleep(Duration::from_millis(150)).await;
    let commit_before = leader.commit_index();

    for node in cluster.nodes() {
        if node.id() != leader.id() {
            cluster.isolate(node.id());
        }
    }

    let result = leader
        .propose_and_wait(verdict_command(VoteStatus::Down), Duration::from_millis(300))
        .await;
    assert!(matches!(result, Err(RaftError::CommitTimeout { .. })), "got {result:?}");
    assert_eq!(leader.commit_index(), commit_before);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_term_and_vote_survive_in_storage() {
    let cluster = RaftTestCluster::start(3);
    let leader = cluster.wait_for_leader(LEADER_TIMEOUT).await.expect("leader elected");
    let index = leader
        .propose_and_wait(verdict_command(VoteStatus::Up), COMMIT_TIMEOUT)
        .await
        .expect("verdict commits");

    let saved = cluster.storage(leader.id()).load().expect("memory storage loads");
    assert_eq!(saved.current_term, leader.current_term());
    assert_eq!(saved.voted_for, Some(leader.id()));
    assert!(saved.entries.len() as u64 >= index);

    cluster.shutdown().await;
}
