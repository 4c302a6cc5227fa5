//! HTTP ingress.
//!
//! Every request, whatever its method, is turned into one message: the path
//! becomes the subject and the body the payload. The response is sent once
//! the message is queued, so `200 OK` means "accepted", not "delivered".
//!
//! A client that stops sending its body is cut off after the read timeout
//! and gets `400`, so a stalled connection cannot hold up shutdown.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{StatusCode, Uri};
use axum::Router;
use tower_http::timeout::RequestBodyTimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::bus::{DispatchError, DispatchQueue, Message};
use crate::config::HttpConfig;
use crate::utils::subject::{path_to_subject, validate_subject};

/// Build the ingress router (separated for testing).
pub fn router(queue: Arc<DispatchQueue>, config: &HttpConfig) -> Router {
    Router::new()
        .fallback(ingest)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(RequestBodyTimeoutLayer::new(config.read_timeout()))
        .layer(TraceLayer::new_for_http())
        .with_state(queue)
}

async fn ingest(
    State(queue): State<Arc<DispatchQueue>>,
    uri: Uri,
    body: Result<Bytes, BytesRejection>,
) -> StatusCode {
    let path = uri.path();
    let subject = path_to_subject(path);
    if let Err(e) = validate_subject(&subject) {
        debug!(path = %path, error = %e, "Rejected request path");
        return StatusCode::BAD_REQUEST;
    }

    let payload = match body {
        Ok(payload) => payload,
        Err(e) => {
            warn!(path = %path, error = %e, "Failed to read request body");
            return StatusCode::BAD_REQUEST;
        }
    };

    match queue.enqueue(Message { subject, payload }).await {
        Ok(()) => StatusCode::OK,
        Err(DispatchError::Closed) => {
            warn!(path = %path, "Dispatch queue closed, request refused");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
