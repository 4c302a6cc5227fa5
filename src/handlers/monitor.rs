//! Monitoring endpoint.
//!
//! Serves dispatch statistics as JSON on the monitor port:
//! - `GET /varz`
//! - `GET /debug/vars`

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::bus::{DispatchMetrics, DispatchQueue};

/// Shared state for the monitor handlers.
#[derive(Clone)]
pub struct MonitorState {
    pub queue: Arc<DispatchQueue>,
    pub metrics: Arc<DispatchMetrics>,
}

/// Snapshot of the dispatch pipeline.
#[derive(Debug, Serialize)]
pub struct DispatchStats {
    pub queue_capacity: usize,
    pub queue_depth: usize,
    pub peak_queue_depth: usize,
    pub published: u64,
    pub publish_failures: u64,
}

impl DispatchStats {
    pub fn collect(state: &MonitorState) -> Self {
        Self {
            queue_capacity: state.queue.capacity(),
            queue_depth: state.queue.depth(),
            peak_queue_depth: state.metrics.peak_depth(),
            published: state.metrics.published(),
            publish_failures: state.metrics.publish_failures(),
        }
    }
}

/// Build the monitor router (separated for testing).
pub fn router(state: MonitorState) -> Router {
    Router::new()
        .route("/varz", get(stats))
        .route("/debug/vars", get(stats))
        .with_state(state)
}

async fn stats(State(state): State<MonitorState>) -> Json<DispatchStats> {
    Json(DispatchStats::collect(&state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::dispatch::dispatch_channel;
    use crate::bus::{Message, MockPublisher};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_stats_report_dispatch_counts() {
        let publisher = MockPublisher::new();
        let metrics = Arc::new(DispatchMetrics::new());
        let (queue, dispatcher) =
            dispatch_channel(32, Box::new(publisher.clone()), metrics.clone());
        let queue = Arc::new(queue);
        let done = dispatcher.spawn();

        for i in 0..3 {
            queue
                .enqueue(Message::new(format!("s.{}", i), "x"))
                .await
                .unwrap();
        }
        queue.shutdown().await;
        done.await.unwrap();

        let app = router(MonitorState { queue, metrics });
        for path in ["/varz", "/debug/vars"] {
            let request = Request::builder().uri(path).body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(json["queue_capacity"], 32);
            assert_eq!(json["queue_depth"], 0);
            assert_eq!(json["published"], 3);
            assert_eq!(json["publish_failures"], 0);
            assert!(json["peak_queue_depth"].as_u64().unwrap() >= 1);
        }
    }

    #[tokio::test]
    async fn test_unknown_path_not_found() {
        let (queue, _dispatcher) = dispatch_channel(
            1,
            Box::new(MockPublisher::new()),
            Arc::new(DispatchMetrics::new()),
        );
        let app = router(MonitorState {
            queue: Arc::new(queue),
            metrics: Arc::new(DispatchMetrics::new()),
        });

        let request = Request::builder().uri("/other").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
