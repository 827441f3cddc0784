//! Reconcile metrics and probe endpoints.
//!
//! Serves `/healthz`, `/readyz` and `/metrics` (Prometheus text format) on the
//! configured bind address.

use crate::error::ControllerError;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Buckets for reconcile pass duration (in seconds)
const RECONCILE_DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Controller metrics and readiness state
pub struct Metrics {
    registry: Registry,
    /// Reconcile passes by `controller` and `outcome` (done, requeue, error)
    reconciliations: IntCounterVec,
    /// Reconcile pass duration by `controller`
    duration: HistogramVec,
    ready: AtomicBool,
}

impl Metrics {
    /// Creates the metrics and registers them with a fresh registry.
    pub fn new() -> Result<Self, ControllerError> {
        let registry = Registry::new();

        let reconciliations = IntCounterVec::new(
            Opts::new("metal_provider_reconcile_total", "Reconcile passes by controller and outcome"),
            &["controller", "outcome"],
        )?;
        registry.register(Box::new(reconciliations.clone()))?;

        let duration = HistogramVec::new(
            HistogramOpts::new("metal_provider_reconcile_duration_seconds", "Duration of reconcile passes")
                .buckets(RECONCILE_DURATION_BUCKETS.to_vec()),
            &["controller"],
        )?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            reconciliations,
            duration,
            ready: AtomicBool::new(false),
        })
    }

    /// Records one reconcile pass
    pub fn record(&self, controller: &str, outcome: &str, elapsed: Duration) {
        self.reconciliations.with_label_values(&[controller, outcome]).inc();
        self.duration
            .with_label_values(&[controller])
            .observe(elapsed.as_secs_f64());
    }

    /// Flips `/readyz` once the controllers are running
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    /// Prometheus text exposition of every registered metric
    pub fn encode(&self) -> Result<String, ControllerError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| ControllerError::Metrics(e.to_string()))
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    if metrics.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Build the probe and metrics router
pub fn router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(metrics)
}

/// Serve the probe and metrics router on `addr` until the process exits
pub async fn serve(addr: SocketAddr, metrics: Arc<Metrics>) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ControllerError::Metrics(format!("failed to bind {addr}: {e}")))?;
    info!("Metrics and probes listening on {}", addr);

    axum::serve(listener, router(metrics))
        .await
        .map_err(|e| ControllerError::Metrics(format!("metrics server error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_path(metrics: Arc<Metrics>, path: &str) -> (StatusCode, String) {
        let response = router(metrics)
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_readyz_follows_ready_flag() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let (status, _) = get_path(metrics.clone(), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        metrics.set_ready(true);
        let (status, body) = get_path(metrics, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_healthz_is_always_ok() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let (status, body) = get_path(metrics, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_metrics_exposes_reconcile_counters() {
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.record("metalmachine", "requeue", Duration::from_millis(12));
        metrics.record("metalmachine", "requeue", Duration::from_millis(8));

        let (status, body) = get_path(metrics, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("metal_provider_reconcile_total{controller=\"metalmachine\",outcome=\"requeue\"} 2"));
        assert!(body.contains("metal_provider_reconcile_duration_seconds_count{controller=\"metalmachine\"} 2"));
    }
}
