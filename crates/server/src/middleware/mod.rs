//! HTTP middleware components for the vigil server.

pub mod correlation_id;

pub use correlation_id::{create_request_id_layers, request_span, UuidRequestIdGenerator, X_REQUEST_ID};
