//! Integration tests for quorum aggregation.
//!
//! Cover the contracts the rest of the pipeline relies on:
//! - a round key resolves exactly once, even under concurrent ingestion
//! - every side effect of a resolution happens, and a failing sink never blocks the others
//! - votes from the bus are windowed into shared round keys

use crate::mock_infrastructure::{
    current_round, unweighted_quorum, vote, weighted_vote, RecordingAlertDispatcher,
    RecordingPublisher, TEST_TARGET,
};
use chrono::{Duration as ChronoDuration, Utc};
use futures::future::join_all;
use std::{sync::Arc, time::Duration};
use vigil_core::{
    bus::{BusVerdictPublisher, EventBus, LocalEventBus, VoteConsumer},
    quorum::{IngestOutcome, QuorumAggregator, QuorumConfig},
    store::{MemoryVoteStore, VoteStore},
    types::{RawVoteEvent, RoundKey, VoteStatus},
};

fn aggregator(cluster: usize) -> QuorumAggregator {
    QuorumAggregator::new(unweighted_quorum(), cluster).expect("valid quorum config")
}

#[tokio::test]
async fn test_concurrent_ingest_resolves_once() {
    let aggregator = Arc::new(aggregator(9));
    let round = current_round();

    let handles: Vec<_> = (1..=9u64)
        .map(|id| {
            let aggregator = aggregator.clone();
            tokio::spawn(async move { aggregator.ingest(vote(id, VoteStatus::Up), TEST_TARGET, round).await })
        })
        .collect();

    let outcomes: Vec<IngestOutcome> =
        join_all(handles).await.into_iter().map(|r| r.expect("task panicked")).collect();

    let resolved = outcomes.iter().filter(|o| matches!(o, IngestOutcome::Resolved(_))).count();
    let late = outcomes.iter().filter(|o| **o == IngestOutcome::AlreadyProcessed).count();
    let buffered = outcomes.iter().filter(|o| matches!(o, IngestOutcome::Buffered { .. })).count();

    assert_eq!(resolved, 1);
    assert_eq!(buffered, 4);
    assert_eq!(late, 4);
    assert!(aggregator.is_processed(&RoundKey::new(TEST_TARGET, round)));
    assert_eq!(aggregator.pending_len(), 0);
}

#[tokio::test]
async fn test_split_vote_with_equal_weight_resolves_up() {
    let aggregator = aggregator(4);
    let round = current_round();

    assert_eq!(aggregator.quorum(), 2);
    aggregator.ingest(vote(1, VoteStatus::Up), TEST_TARGET, round).await;
    let outcome = aggregator.ingest(vote(2, VoteStatus::Down), TEST_TARGET, round).await;
    assert_eq!(outcome.verdict().expect("quorum reached").status, VoteStatus::Up);

    // Later votes for the resolved key change nothing.
    let late = aggregator.ingest(vote(3, VoteStatus::Down), TEST_TARGET, round).await;
    assert_eq!(late, IngestOutcome::AlreadyProcessed);
}

#[tokio::test]
async fn test_heavier_down_side_wins() {
    let aggregator = aggregator(3);
    let round = current_round();

    aggregator.ingest(weighted_vote(1, VoteStatus::Up, 0.2, 30), TEST_TARGET, round).await;
    let outcome =
        aggregator.ingest(weighted_vote(2, VoteStatus::Down, 0.9, 4000), TEST_TARGET, round).await;

    let verdict = outcome.verdict().expect("quorum of 2 reached");
    assert_eq!(verdict.status, VoteStatus::Down);
    assert!((verdict.down_weight - 0.9).abs() < f64::EPSILON);
    assert!((verdict.up_weight - 0.2).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_resolution_side_effects() {
    let store = Arc::new(MemoryVoteStore::new());
    let publisher = RecordingPublisher::new();
    let alerts = RecordingAlertDispatcher::new();
    let aggregator = aggregator(3)
        .with_store(store.clone() as Arc<dyn VoteStore>)
        .with_publisher(publisher.clone())
        .with_alerts(alerts.clone());
    let mut live = aggregator.subscribe();
    let round = current_round();

    aggregator.ingest(vote(1, VoteStatus::Down), TEST_TARGET, round).await;
    aggregator.ingest(vote(2, VoteStatus::Up), TEST_TARGET, round).await;

    let rows = store.records_for(TEST_TARGET, round);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows.iter().filter(|r| r.aggregate).count(), 1);
    assert!(rows.last().expect("aggregate row").aggregate);

    let streamed = live.recv().await.expect("verdict broadcast");
    assert_eq!(streamed.key(), RoundKey::new(TEST_TARGET, round));
    assert_eq!(publisher.published().len(), 1);

    let dispatched = alerts.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].1.status, VoteStatus::Down);
}

#[tokio::test]
async fn test_failing_publisher_does_not_block_others() {
    let failing = RecordingPublisher::failing();
    let healthy = RecordingPublisher::new();
    let aggregator = aggregator(1).with_publisher(failing.clone()).with_publisher(healthy.clone());

    let outcome = aggregator.ingest(vote(1, VoteStatus::Up), TEST_TARGET, current_round()).await;

    assert!(outcome.verdict().is_some());
    assert_eq!(failing.published().len(), 1);
    assert_eq!(healthy.published().len(), 1);
}

#[tokio::test]
async fn test_vote_older_than_retention_is_stale() {
    let aggregator = aggregator(3);
    let old_round = (Utc::now() - ChronoDuration::hours(2)).timestamp_millis();

    let outcome = aggregator.ingest(vote(1, VoteStatus::Up), TEST_TARGET, old_round).await;

    assert_eq!(outcome, IngestOutcome::Stale);
    assert_eq!(aggregator.pending_len(), 0);
}

#[tokio::test]
async fn test_explicit_quorum_size_overrides_default() {
    let config = QuorumConfig { quorum_size: Some(2), ..unweighted_quorum() };
    let aggregator = QuorumAggregator::new(config, 7).expect("valid quorum config");
    assert_eq!(aggregator.quorum(), 2);

    let round = current_round();
    aggregator.ingest(vote(1, VoteStatus::Up), TEST_TARGET, round).await;
    let outcome = aggregator.ingest(vote(2, VoteStatus::Up), TEST_TARGET, round).await;
    assert!(outcome.verdict().is_some());
}

#[tokio::test]
async fn test_bus_votes_share_a_windowed_round() {
    let bus: Arc<dyn EventBus> = Arc::new(LocalEventBus::default());
    let aggregator = Arc::new(aggregator(3).with_publisher(Arc::new(BusVerdictPublisher::new(bus.clone()))));
    let mut verdicts = bus.subscribe_verdicts();
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let window = Duration::from_secs(60);
    let consumer = VoteConsumer::new(bus.clone(), aggregator.clone(), window);
    let handle = consumer.start_with_shutdown(shutdown_tx.subscribe());

    // Both votes fall in the same minute.
    let base = RoundKey::windowed(TEST_TARGET, Utc::now(), window).round;
    let first = vote(1, VoteStatus::Down)
        .with_observed_at(chrono::DateTime::from_timestamp_millis(base + 1_000).expect("valid ts"));
    let second = vote(2, VoteStatus::Down)
        .with_observed_at(chrono::DateTime::from_timestamp_millis(base + 30_000).expect("valid ts"));
    bus.publish_vote(RawVoteEvent::from_vote(TEST_TARGET, &first)).expect("bus accepts votes");
    bus.publish_vote(RawVoteEvent::from_vote(TEST_TARGET, &second)).expect("bus accepts votes");

    let event = tokio::time::timeout(Duration::from_secs(5), verdicts.recv())
        .await
        .expect("verdict published")
        .expect("bus open");
    assert_eq!(event.url, TEST_TARGET);
    assert_eq!(event.consensus, VoteStatus::Down);
    assert_eq!(event.votes.len(), 2);
    assert!(aggregator.is_processed(&RoundKey::new(TEST_TARGET, base)));

    let _ = shutdown_tx.send(());
    handle.await.expect("consumer exits cleanly");
}
