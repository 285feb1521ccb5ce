//! HTTP surface of a vigil node: peer RPCs (gossip and Raft), vote intake, the live
//! verdict stream and introspection endpoints.

pub mod middleware;
pub mod router;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    compression::CompressionLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};
use vigil_core::runtime::VigilRuntime;

/// Request bodies above this size are rejected with `413`.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Builds the application router over a running [`VigilRuntime`].
pub fn create_app(runtime: Arc<VigilRuntime>) -> Router {
    let config = runtime.config().clone();
    let (set_request_id_public, propagate_request_id_public) =
        middleware::create_request_id_layers();
    let (set_request_id, propagate_request_id) = middleware::create_request_id_layers();

    let public = Router::new()
        .route("/health", get(router::handle_health))
        .route("/metrics", get(router::handle_metrics))
        .with_state(runtime.clone())
        .layer(propagate_request_id_public)
        .layer(set_request_id_public);

    let api = Router::new()
        .route("/gossip", post(router::handle_gossip))
        .route("/votes", post(router::handle_submit_vote))
        .route("/raft/request-vote", post(router::handle_request_vote))
        .route("/raft/append-entries", post(router::handle_append_entries))
        .route("/raft/status", get(router::handle_raft_status))
        .route("/raft/propose", post(router::handle_propose))
        .route("/alerts", get(router::handle_alerts))
        .route("/reputation", get(router::handle_reputation))
        .with_state(runtime.clone())
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(ConcurrencyLimitLayer::new(config.server.max_concurrent_requests))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CompressionLayer::new());

    // Long-lived; kept out of the timeout and concurrency limits.
    let stream = Router::new()
        .route("/verdicts/stream", get(router::handle_verdict_stream))
        .with_state(runtime);

    // Layers run outermost-last: set, then propagate, then trace.
    public.merge(
        api.merge(stream)
            .layer(TraceLayer::new_for_http().make_span_with(middleware::request_span::<axum::body::Body>))
            .layer(propagate_request_id)
            .layer(set_request_id),
    )
}
