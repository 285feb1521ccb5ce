//! HTTP handlers for peer RPCs, vote intake and introspection.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::{stream, Stream};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{convert::Infallible, sync::Arc, time::Duration};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use vigil_core::{
    gossip::GossipMessage,
    raft::{AppendEntriesRequest, Command, RaftError, RaftNode, RequestVoteRequest},
    runtime::VigilRuntime,
    types::RawVoteEvent,
};

/// Shared handler state.
pub type SharedRuntime = Arc<VigilRuntime>;

const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn raft_node(runtime: &VigilRuntime) -> Result<&Arc<RaftNode>, Response> {
    runtime
        .components()
        .raft()
        .ok_or_else(|| error_response(StatusCode::SERVICE_UNAVAILABLE, "raft is not enabled"))
}

/// Merges a peer's gossiped vote into the local cache and submits it for aggregation.
pub async fn handle_gossip(
    State(runtime): State<SharedRuntime>,
    Json(message): Json<GossipMessage>,
) -> Response {
    match runtime.components().gossip().receive_gossip(message) {
        Ok(changed) => (StatusCode::OK, Json(json!({ "accepted": changed }))).into_response(),
        Err(e) => {
            debug!(error = %e, "rejected gossip payload");
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

pub async fn handle_request_vote(
    State(runtime): State<SharedRuntime>,
    Json(request): Json<RequestVoteRequest>,
) -> Response {
    match raft_node(&runtime) {
        Ok(node) => Json(node.handle_request_vote(&request)).into_response(),
        Err(response) => response,
    }
}

pub async fn handle_append_entries(
    State(runtime): State<SharedRuntime>,
    Json(request): Json<AppendEntriesRequest>,
) -> Response {
    match raft_node(&runtime) {
        Ok(node) => Json(node.handle_append_entries(request)).into_response(),
        Err(response) => response,
    }
}

pub async fn handle_raft_status(State(runtime): State<SharedRuntime>) -> Response {
    match raft_node(&runtime) {
        Ok(node) => Json(node.status()).into_response(),
        Err(response) => response,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProposeResponse {
    index: u64,
    term: u64,
}

/// Appends a command through the leader and waits for it to commit.
///
/// Followers answer `409` with the leader they know of, so clients can retry there.
pub async fn handle_propose(
    State(runtime): State<SharedRuntime>,
    Json(command): Json<Command>,
) -> Response {
    let node = match raft_node(&runtime) {
        Ok(node) => node,
        Err(response) => return response,
    };

    match node.propose_and_wait(command, node.config().commit_timeout()).await {
        Ok(index) => {
            info!(index, "proposal committed");
            Json(ProposeResponse { index, term: node.current_term() }).into_response()
        }
        Err(RaftError::NotLeader { leader_hint }) => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "not the leader", "leaderHint": leader_hint })),
        )
            .into_response(),
        Err(e @ RaftError::CommitTimeout { .. }) => {
            warn!(error = %e, "proposal did not commit in time");
            error_response(StatusCode::GATEWAY_TIMEOUT, e.to_string())
        }
        Err(e) => {
            warn!(error = %e, "proposal failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

/// Bridges a raw vote onto the event bus.
pub async fn handle_submit_vote(
    State(runtime): State<SharedRuntime>,
    Json(event): Json<RawVoteEvent>,
) -> Response {
    if event.url.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "url must not be empty");
    }
    if event.weight.is_some_and(|w| !w.is_finite() || w < 0.0) {
        return error_response(StatusCode::BAD_REQUEST, "weight must be a non-negative number");
    }

    match runtime.components().bus().publish_vote(event) {
        Ok(delivered) => {
            (StatusCode::ACCEPTED, Json(json!({ "delivered": delivered }))).into_response()
        }
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

/// Streams committed verdicts as server-sent events.
pub async fn handle_verdict_stream(
    State(runtime): State<SharedRuntime>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = runtime.components().subscribe_committed();

    let events = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(verdict) => {
                    let event = Event::default()
                        .event("verdict")
                        .json_data(&verdict)
                        .unwrap_or_else(|_| Event::default().event("verdict"));
                    return Some((Ok(event), receiver));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "verdict stream subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE))
}

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    location: Option<String>,
}

pub async fn handle_alerts(
    State(runtime): State<SharedRuntime>,
    Query(query): Query<AlertsQuery>,
) -> Response {
    let manager = runtime.components().alert_manager();
    let alerts = match query.location {
        Some(location) => manager.list_for_location(&location),
        None => manager.list(),
    };
    Json(alerts).into_response()
}

pub async fn handle_reputation(State(runtime): State<SharedRuntime>) -> Response {
    let validators: Vec<_> = runtime
        .components()
        .scorer()
        .snapshot()
        .into_iter()
        .map(|(validator_id, meta)| json!({ "validatorId": validator_id, "meta": meta }))
        .collect();
    Json(validators).into_response()
}

pub async fn handle_health(State(runtime): State<SharedRuntime>) -> Response {
    let components = runtime.components();
    let shutting_down = runtime.is_shutting_down();

    let raft = components.raft().map(|node| {
        json!({
            "role": node.role().as_str(),
            "term": node.current_term(),
            "leaderId": node.leader_id(),
            "commitIndex": node.commit_index(),
        })
    });
    let pending_rounds = components.aggregator().map(|aggregator| aggregator.pending_len());

    let body = json!({
        "status": if shutting_down { "shutting_down" } else { "healthy" },
        "validatorId": runtime.config().node.validator_id,
        "location": runtime.config().node.location,
        "prober": components.has_prober(),
        "pendingRounds": pending_rounds,
        "raft": raft,
        "cachedTargets": components.vote_cache().len(),
        "knownValidators": components.scorer().len(),
    });

    let status = if shutting_down { StatusCode::SERVICE_UNAVAILABLE } else { StatusCode::OK };
    (status, Json(body)).into_response()
}

pub async fn handle_metrics(State(runtime): State<SharedRuntime>) -> Response {
    if !runtime.config().metrics.enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        runtime.components().metrics_collector().render(),
    )
        .into_response()
}
