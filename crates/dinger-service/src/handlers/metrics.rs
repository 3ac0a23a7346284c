//! Prometheus metrics endpoint handler.
//!
//! This endpoint is unauthenticated so Prometheus can scrape it. Labels are
//! bounded and never carry dinger ids, client ids or tokens.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// Returns 200 OK with Prometheus text format:
/// ```text
/// # TYPE dingaling_http_requests_total counter
/// dingaling_http_requests_total{method="POST",endpoint="/d/{id}",status_code="200"} 42
/// ```
#[tracing::instrument(skip_all, name = "dingaling.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
