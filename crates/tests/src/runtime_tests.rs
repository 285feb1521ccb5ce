//! End-to-end runtime scenarios with injected transports and sinks.

use crate::mock_infrastructure::{
    fast_raft_config, single_node_config, RecordingAlertDispatcher, RecordingGossipTransport,
};
use chrono::Utc;
use mockito::Server;
use std::{sync::Arc, time::Duration};
use vigil_core::{
    raft::Command,
    runtime::VigilRuntime,
    store::MemoryVoteStore,
    types::{RawVoteEvent, ValidatorId, Vote, VoteStatus},
};

const TARGET: &str = "https://api.example";

async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    tokio::time::timeout(timeout, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .is_ok()
}

#[tokio::test]
async fn test_single_node_raft_commits_bus_votes() {
    let mut config = single_node_config();
    config.raft = fast_raft_config();
    let store = Arc::new(MemoryVoteStore::new());
    let alerts = RecordingAlertDispatcher::new();

    let runtime = VigilRuntime::builder()
        .with_config(config)
        .enable_aggregator()
        .enable_raft()
        .with_vote_store(store.clone())
        .with_alert_dispatcher(alerts.clone())
        .build()
        .expect("runtime builds");
    let raft = runtime.components().raft().expect("raft enabled").clone();
    assert!(eventually(Duration::from_secs(5), || raft.is_leader()).await, "no leader elected");

    let mut committed = runtime.components().subscribe_committed();
    let vote = Vote::new(1u64, VoteStatus::Down, 80, "eu-west").with_observed_at(Utc::now());
    runtime.components().bus().publish_vote(RawVoteEvent::from_vote(TARGET, &vote)).unwrap();

    let verdict = tokio::time::timeout(Duration::from_secs(5), committed.recv())
        .await
        .expect("verdict committed in time")
        .unwrap();
    assert_eq!(verdict.target, TARGET);
    assert_eq!(verdict.status, VoteStatus::Down);

    let logged: Vec<_> = raft
        .committed_entries()
        .into_iter()
        .filter(|entry| matches!(entry.command, Command::Verdict(_)))
        .collect();
    assert_eq!(logged.len(), 1);
    // One raw vote row plus the aggregate row.
    assert_eq!(store.records_for(TARGET, verdict.round).len(), 2);
    assert_eq!(alerts.dispatched().len(), 1);
    assert_eq!(runtime.components().scorer().meta(ValidatorId(1)).map(|m| m.total_votes), Some(1));

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_probe_cycle_resolves_and_gossips() {
    let mut server = Server::new_async().await;
    let _health = server.mock("GET", "/health").with_status(200).create_async().await;
    let target = format!("{}/health", server.url());

    let mut config = single_node_config();
    config.raft.enabled = false;
    config.probe.targets = vec![target.clone()];
    config.peers.gossip = vec!["http://peer-a".to_string()];
    config.gossip.rounds = 1;
    let transport = RecordingGossipTransport::new();

    let runtime = VigilRuntime::builder()
        .with_config(config)
        .enable_prober()
        .enable_aggregator()
        .with_gossip_transport(transport.clone())
        .build()
        .expect("runtime builds");
    let mut committed = runtime.components().subscribe_committed();

    // Two validators in the cluster, so one local vote is a quorum.
    let verdict = tokio::time::timeout(Duration::from_secs(5), committed.recv())
        .await
        .expect("first probe cycle resolves")
        .unwrap();
    assert_eq!(verdict.target, target);
    assert_eq!(verdict.status, VoteStatus::Up);

    assert!(eventually(Duration::from_secs(5), || transport.sent_to("http://peer-a") == 1).await);
    let (_, message) = transport.sent().remove(0);
    assert_eq!(message.target, target);
    assert_eq!(message.from_id, ValidatorId(1));
    assert!(runtime.components().vote_cache().get(&target).is_some());

    runtime.shutdown().await;
}

fn gossiping_validator(id: u64, peers: &[&str], transport: Arc<RecordingGossipTransport>) -> VigilRuntime {
    let mut config = single_node_config();
    config.node.validator_id = Some(id);
    config.raft.enabled = false;
    config.peers.gossip = peers.iter().map(|p| (*p).to_string()).collect();
    config.gossip.rounds = 1;

    VigilRuntime::builder()
        .with_config(config)
        .enable_aggregator()
        .with_gossip_transport(transport)
        .build()
        .expect("runtime builds")
}

fn observe(runtime: &VigilRuntime, vote: &Vote) {
    runtime.components().vote_cache().put(TARGET, vote.clone());
    runtime.components().bus().publish_vote(RawVoteEvent::from_vote(TARGET, vote)).unwrap();
}

fn gossip_endpoint(runtime: &VigilRuntime) -> Arc<vigil_core::gossip::GossipDisseminator> {
    runtime.components().gossip().clone()
}

#[tokio::test]
async fn test_gossiped_votes_complete_quorum_across_validators() {
    let transport_1 = RecordingGossipTransport::new();
    let transport_2 = RecordingGossipTransport::new();
    transport_1.make_unreachable("http://node-3");
    transport_2.make_unreachable("http://node-3");
    let node_1 = gossiping_validator(1, &["http://node-2", "http://node-3"], transport_1.clone());
    let node_2 = gossiping_validator(2, &["http://node-1", "http://node-3"], transport_2.clone());
    transport_1.connect("http://node-2", gossip_endpoint(&node_2));
    transport_2.connect("http://node-1", gossip_endpoint(&node_1));
    assert_eq!(node_1.components().aggregator().map(|a| a.quorum()), Some(2));

    let mut committed_1 = node_1.components().subscribe_committed();
    let mut committed_2 = node_2.components().subscribe_committed();
    let observed_at = Utc::now();

    observe(&node_1, &Vote::new(1u64, VoteStatus::Down, 30, "us-east").with_observed_at(observed_at));
    node_1.components().gossip().disseminate(TARGET).await;
    observe(&node_2, &Vote::new(2u64, VoteStatus::Down, 45, "ap-south").with_observed_at(observed_at));
    node_2.components().gossip().disseminate(TARGET).await;

    for committed in [&mut committed_1, &mut committed_2] {
        let verdict = tokio::time::timeout(Duration::from_secs(5), committed.recv())
            .await
            .expect("two of three validators reach quorum")
            .unwrap();
        assert_eq!(verdict.status, VoteStatus::Down);
        let mut voters: Vec<_> = verdict.votes.iter().map(|v| v.validator_id).collect();
        voters.sort();
        assert_eq!(voters, vec![ValidatorId(1), ValidatorId(2)]);
    }

    node_1.shutdown().await;
    node_2.shutdown().await;
}

#[tokio::test]
async fn test_prober_only_runtime_has_no_aggregator() {
    let runtime = VigilRuntime::builder()
        .with_config(single_node_config())
        .enable_prober()
        .with_gossip_transport(RecordingGossipTransport::new())
        .build()
        .expect("runtime builds");

    assert!(runtime.components().has_prober());
    assert!(!runtime.components().has_aggregator());
    assert!(!runtime.components().has_raft());

    runtime.shutdown().await;
    assert!(runtime.is_shutting_down());
}

#[tokio::test]
async fn test_missing_validator_id_is_rejected() {
    let mut config = single_node_config();
    config.node.validator_id = None;

    let result = VigilRuntime::builder().with_config(config).build();
    assert!(result.is_err());
}
