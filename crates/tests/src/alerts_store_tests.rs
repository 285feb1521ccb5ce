//! Regional alert delivery against mockito webhooks, and the JSON-lines vote journal.

use crate::mock_infrastructure::{single_node_config, vote};
use chrono::Utc;
use mockito::{Matcher, Server};
use serde_json::json;
use std::{collections::HashMap, sync::Arc, time::Duration};
use vigil_core::{
    alerts::{AlertDispatcher, AlertManager, AlertStatus, AlertsConfig, WebhookAlertDispatcher},
    runtime::VigilRuntime,
    store::VoteRecord,
    types::{RawVoteEvent, Vote, VoteStatus},
};

const TARGET: &str = "https://api.example";

fn dispatcher(routes: HashMap<String, String>) -> (WebhookAlertDispatcher, Arc<AlertManager>) {
    let config = AlertsConfig { routes, timeout_ms: 1000, ..Default::default() };
    let manager = Arc::new(AlertManager::new());
    let dispatcher = WebhookAlertDispatcher::new(&config, manager.clone()).expect("client builds");
    (dispatcher, manager)
}

#[tokio::test]
async fn test_routed_down_vote_is_delivered() {
    let mut server = Server::new_async().await;
    let hook = server
        .mock("POST", "/eu")
        .match_body(Matcher::PartialJson(json!({"target": TARGET, "location": "eu-west"})))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let (dispatcher, manager) =
        dispatcher(HashMap::from([("eu-west".to_string(), format!("{}/eu", server.url()))]));

    // Validator 3 sits in eu-west.
    let alert = dispatcher
        .dispatch(TARGET, &vote(3, VoteStatus::Down))
        .await
        .expect("delivery succeeds")
        .expect("location is routed");

    hook.assert_async().await;
    assert_eq!(alert.status, AlertStatus::Delivered);
    assert_eq!(manager.list_for_location("eu-west").len(), 1);
}

#[tokio::test]
async fn test_unrouted_location_sends_nothing() {
    let (dispatcher, manager) = dispatcher(HashMap::new());

    let outcome = dispatcher.dispatch(TARGET, &vote(1, VoteStatus::Down)).await.unwrap();

    assert!(outcome.is_none());
    assert!(manager.is_empty());
}

#[tokio::test]
async fn test_rejected_delivery_is_recorded_as_failed() {
    let mut server = Server::new_async().await;
    let _hook = server.mock("POST", "/us").with_status(500).create_async().await;
    let (dispatcher, manager) =
        dispatcher(HashMap::from([("us-east".to_string(), format!("{}/us", server.url()))]));

    let result = dispatcher.dispatch(TARGET, &vote(1, VoteStatus::Down)).await;

    assert!(result.is_err());
    assert_eq!(manager.count_by_status(AlertStatus::Failed), 1);
}

#[tokio::test]
async fn test_runtime_journals_resolved_rounds() {
    let dir = tempfile::tempdir().unwrap();
    let journal = dir.path().join("votes.jsonl");
    let mut config = single_node_config();
    config.raft.enabled = false;
    config.store.path = Some(journal.to_string_lossy().into_owned());

    let runtime = VigilRuntime::builder()
        .with_config(config)
        .enable_aggregator()
        .build()
        .expect("runtime builds");
    let mut committed = runtime.components().subscribe_committed();

    let down = Vote::new(1u64, VoteStatus::Down, 25, "eu-west").with_observed_at(Utc::now());
    runtime.components().bus().publish_vote(RawVoteEvent::from_vote(TARGET, &down)).unwrap();
    let verdict = tokio::time::timeout(Duration::from_secs(5), committed.recv())
        .await
        .expect("round resolves")
        .unwrap();

    let contents = tokio::fs::read_to_string(&journal).await.unwrap();
    let rows: Vec<VoteRecord> =
        contents.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
    assert_eq!(rows.len(), 2);
    assert!(!rows[0].aggregate);
    assert_eq!(rows[0].location.as_deref(), Some("eu-west"));
    assert!(rows[1].aggregate);
    assert_eq!(rows[1].round, verdict.round);
    assert_eq!(rows[1].status, VoteStatus::Down);

    runtime.shutdown().await;
}
