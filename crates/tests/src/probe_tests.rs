//! Integration tests for probing against mockito targets.
//!
//! Cover the UP/DOWN classification rules, the `probe_ok` distinction between "no reply"
//! and "bad reply", DNS cache use, and a full scheduler cycle onto the bus.

use mockito::Server;
use std::{net::IpAddr, sync::Arc, time::Duration};
use vigil_core::{
    bus::{EventBus, LocalEventBus},
    probe::{DnsCache, ProbeConfig, ProbeMode, ProbeScheduler, Prober, VoteCache},
    reputation::{ReputationConfig, ReputationScorer},
    types::{ValidatorId, VoteStatus, DEFAULT_VOTE_WEIGHT},
};

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

fn prober_with(config: &ProbeConfig) -> (Prober, Arc<VoteCache>, Arc<DnsCache>) {
    let cache = Arc::new(VoteCache::new());
    let dns = Arc::new(DnsCache::new(config.dns_ttl()));
    let prober = Prober::new(config, ValidatorId(7), "eu-west", cache.clone(), dns.clone())
        .expect("probe client builds");
    (prober, cache, dns)
}

fn prober() -> (Prober, Arc<VoteCache>, Arc<DnsCache>) {
    prober_with(&ProbeConfig::default())
}

#[tokio::test]
async fn test_success_status_is_up() {
    let mut server = Server::new_async().await;
    let _mock = server.mock("GET", "/health").with_status(204).create_async().await;
    let (prober, cache, _) = prober();
    let url = format!("{}/health", server.url());

    let vote = prober.check_target(&url, PROBE_TIMEOUT).await;

    assert_eq!(vote.status, VoteStatus::Up);
    assert!(vote.probe_ok);
    assert_eq!(vote.validator_id, ValidatorId(7));
    assert_eq!(vote.location, "eu-west");
    assert!((vote.weight - DEFAULT_VOTE_WEIGHT).abs() < f64::EPSILON);
    assert_eq!(cache.get(&url), Some(vote));
}

#[tokio::test]
async fn test_redirect_is_up_and_not_followed() {
    let mut server = Server::new_async().await;
    let _redirect = server
        .mock("GET", "/moved")
        .with_status(301)
        .with_header("location", "/elsewhere")
        .create_async()
        .await;
    let elsewhere = server.mock("GET", "/elsewhere").with_status(500).expect(0).create_async().await;
    let (prober, _, _) = prober();

    let vote = prober.check_target(&format!("{}/moved", server.url()), PROBE_TIMEOUT).await;

    assert_eq!(vote.status, VoteStatus::Up);
    elsewhere.assert_async().await;
}

#[tokio::test]
async fn test_server_error_is_down_but_replied() {
    let mut server = Server::new_async().await;
    let _mock = server.mock("GET", "/health").with_status(503).create_async().await;
    let (prober, _, _) = prober();

    let vote = prober.check_target(&format!("{}/health", server.url()), PROBE_TIMEOUT).await;

    assert_eq!(vote.status, VoteStatus::Down);
    assert!(vote.probe_ok);
}

#[tokio::test]
async fn test_refused_connection_is_down_without_reply() {
    let (prober, cache, _) = prober();
    let url = "http://127.0.0.1:9/health";

    let vote = prober.check_target(url, PROBE_TIMEOUT).await;

    assert_eq!(vote.status, VoteStatus::Down);
    assert!(!vote.probe_ok);
    assert_eq!(cache.get(url).map(|v| v.status), Some(VoteStatus::Down));
}

#[tokio::test]
async fn test_invalid_target_is_down() {
    let (prober, _, _) = prober();

    let vote = prober.check_target("not a url", PROBE_TIMEOUT).await;

    assert_eq!(vote.status, VoteStatus::Down);
    assert!(!vote.probe_ok);
}

#[tokio::test]
async fn test_hostname_resolves_through_dns_cache() {
    let mut server = Server::new_async().await;
    let _mock = server.mock("GET", "/health").with_status(200).expect_at_least(2).create_async().await;
    let (prober, _, dns) = prober();
    let localhost: IpAddr = "127.0.0.1".parse().expect("ip literal");
    dns.insert("validator-target.test", vec![localhost]);

    let port = server.socket_address().port();
    let url = format!("http://validator-target.test:{port}/health");

    assert_eq!(prober.check_target(&url, PROBE_TIMEOUT).await.status, VoteStatus::Up);
    assert_eq!(prober.check_target(&url, PROBE_TIMEOUT).await.status, VoteStatus::Up);

    let (hits, misses) = dns.stats();
    assert!(hits >= 1);
    assert_eq!(misses, 0);
}

#[tokio::test]
async fn test_tcp_mode_connects_without_http() {
    let server = Server::new_async().await;
    let config = ProbeConfig { mode: ProbeMode::Tcp, ..Default::default() };
    let (prober, _, _) = prober_with(&config);

    let up = prober.check_target(&server.url(), PROBE_TIMEOUT).await;
    let down = prober.check_target("http://127.0.0.1:9", PROBE_TIMEOUT).await;

    assert_eq!(up.status, VoteStatus::Up);
    assert_eq!(down.status, VoteStatus::Down);
}

#[tokio::test]
async fn test_vote_carries_reputation_weight() {
    let mut server = Server::new_async().await;
    let _mock = server.mock("GET", "/").with_status(200).create_async().await;
    let scorer = Arc::new(ReputationScorer::new(ReputationConfig::default()));
    scorer.record_outcome(ValidatorId(7), false, 4_000, false);
    let expected = scorer.weight(ValidatorId(7));
    let (prober, _, _) = prober();
    let prober = prober.with_scorer(scorer);

    let vote = prober.check_target(&server.url(), PROBE_TIMEOUT).await;

    assert!(expected < DEFAULT_VOTE_WEIGHT);
    assert!((vote.weight - expected).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_scheduler_cycle_publishes_one_event_per_target() {
    let mut server = Server::new_async().await;
    let _up = server.mock("GET", "/up").with_status(200).create_async().await;
    let _down = server.mock("GET", "/down").with_status(502).create_async().await;
    let targets = vec![format!("{}/up", server.url()), format!("{}/down", server.url())];

    let (prober, cache, _) = prober();
    let bus: Arc<dyn EventBus> = Arc::new(LocalEventBus::default());
    let mut events = bus.subscribe_votes();
    let scheduler =
        ProbeScheduler::new(Arc::new(prober), targets.clone(), Duration::from_secs(30), PROBE_TIMEOUT)
            .with_bus(bus.clone());

    scheduler.run_cycle().await;

    let mut seen = Vec::new();
    for _ in 0..2 {
        let event = events.recv().await.expect("vote event");
        seen.push((event.url, event.status));
    }
    seen.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(seen, vec![(targets[1].clone(), VoteStatus::Down), (targets[0].clone(), VoteStatus::Up)]);
    assert_eq!(cache.len(), 2);
}
