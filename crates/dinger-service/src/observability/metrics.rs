//! Metrics definitions for Dingaling.
//!
//! All metrics follow Prometheus naming conventions:
//! - `dingaling_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: 7 values max (GET, POST, PATCH, DELETE, PUT, HEAD, OPTIONS)
//! - `endpoint`: normalized paths, dinger ids replaced with `{id}`
//! - `status`: 3 values (success, error, timeout)
//! - `operation`: bounded by repository methods
//! - `outcome`: 3 values (delivered, pruned, prune_failed)
//! - `error_type`: bounded by `DingerError` variants
//!
//! Client ids, dinger ids and tokens never appear as label values.

use crate::models::BroadcastReport;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("dingaling_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("dingaling_db_query".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set DB query buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("dingaling_subscription".to_string()),
            &[0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000],
        )
        .map_err(|e| format!("Failed to set subscription buckets: {e}"))?
        // Broadcast duration grows with subscriber count
        .set_buckets_for_metric(
            Matcher::Prefix("dingaling_broadcast".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set broadcast buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `dingaling_http_requests_total`, `dingaling_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("dingaling_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("dingaling_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/health" | "/ready" | "/metrics" | "/d" => path.to_string(),
        _ => normalize_dynamic_endpoint(path),
    }
}

/// Replace the dinger id segment of `/d/{id}[/action]` paths.
fn normalize_dynamic_endpoint(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("/d/") {
        let mut segments = rest.split('/');
        let _id = segments.next();
        return match (segments.next(), segments.next()) {
            (None, _) => "/d/{id}".to_string(),
            (Some(action @ ("info" | "connect" | "listen")), None) => format!("/d/{{id}}/{action}"),
            _ => "/other".to_string(),
        };
    }

    "/other".to_string()
}

// ============================================================================
// Store Metrics
// ============================================================================

/// Record a subscription store query.
///
/// Metric: `dingaling_db_query_duration_seconds`, `dingaling_db_queries_total`
/// Labels: `operation`, `status`
pub fn record_db_query(operation: &str, status: &str, duration: Duration) {
    histogram!("dingaling_db_query_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("dingaling_db_queries_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Subscription & Broadcast Metrics
// ============================================================================

/// Record a subscribe attempt.
///
/// Metric: `dingaling_subscriptions_total`, `dingaling_subscription_duration_seconds`
/// Labels: `status`, `error_type`
pub fn record_subscription(status: &str, error_type: Option<&str>, duration: Duration) {
    histogram!("dingaling_subscription_duration_seconds",
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("dingaling_subscriptions_total",
        "status" => status.to_string(),
        "error_type" => error_type.unwrap_or("none").to_string()
    )
    .increment(1);
}

/// Record a completed or aborted broadcast.
///
/// Metric: `dingaling_broadcasts_total`, `dingaling_broadcast_duration_seconds`,
/// `dingaling_broadcast_recipients` (histogram of attempted deliveries)
/// Labels: `status`
pub fn record_broadcast(status: &str, report: &BroadcastReport, duration: Duration) {
    histogram!("dingaling_broadcast_duration_seconds",
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    histogram!("dingaling_broadcast_recipients").record(report.attempted() as f64);

    counter!("dingaling_broadcasts_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record the outcome of one client delivery.
///
/// Metric: `dingaling_deliveries_total`
/// Labels: `outcome` (delivered, pruned, prune_failed)
pub fn record_delivery(outcome: &str) {
    counter!("dingaling_deliveries_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // These execute the recording functions against the global no-op recorder.

    #[test]
    fn test_record_http_request() {
        record_http_request("POST", "/d", 201, Duration::from_millis(5));
        record_http_request("GET", "/d/2a/info", 200, Duration::from_millis(3));
        record_http_request("POST", "/d/2a", 503, Duration::from_millis(20));
        record_http_request("GET", "/d/2a/connect", 504, Duration::from_secs(30));
    }

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(201), "success");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(504), "timeout");
        assert_eq!(categorize_status_code(400), "error");
        assert_eq!(categorize_status_code(404), "error");
        assert_eq!(categorize_status_code(503), "error");
    }

    #[test]
    fn test_normalize_endpoint_known_paths() {
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/ready"), "/ready");
        assert_eq!(normalize_endpoint("/metrics"), "/metrics");
        assert_eq!(normalize_endpoint("/d"), "/d");
    }

    #[test]
    fn test_normalize_endpoint_dinger_paths() {
        assert_eq!(normalize_endpoint("/d/2a"), "/d/{id}");
        assert_eq!(normalize_endpoint("/d/7fffffff/info"), "/d/{id}/info");
        assert_eq!(normalize_endpoint("/d/ff/connect"), "/d/{id}/connect");
        assert_eq!(normalize_endpoint("/d/ff/listen"), "/d/{id}/listen");
    }

    #[test]
    fn test_normalize_endpoint_unknown_paths() {
        assert_eq!(normalize_endpoint("/d/ff/bogus"), "/other");
        assert_eq!(normalize_endpoint("/d/ff/info/extra"), "/other");
        assert_eq!(normalize_endpoint("/wp-admin"), "/other");
    }

    #[test]
    fn test_record_store_and_fanout_metrics() {
        record_db_query("create_dinger", "success", Duration::from_millis(2));
        record_db_query("delete_client", "error", Duration::from_millis(9));
        record_subscription("success", None, Duration::from_millis(4));
        record_subscription("error", Some("not_found"), Duration::from_millis(1));
        record_broadcast(
            "success",
            &BroadcastReport {
                delivered: 4,
                pruned: 1,
                prune_failures: 0,
            },
            Duration::from_millis(12),
        );
        record_delivery("delivered");
        record_delivery("pruned");
        record_delivery("prune_failed");
    }

    #[test]
    fn test_delivery_outcomes_are_counted_per_label() {
        use metrics_util::debugging::{DebugValue, DebuggingRecorder};

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        ::metrics::with_local_recorder(&recorder, || {
            record_delivery("delivered");
            record_delivery("delivered");
            record_delivery("pruned");
        });

        let counts: Vec<(String, u64)> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter(|(key, _, _, _)| key.key().name() == "dingaling_deliveries_total")
            .filter_map(|(key, _, _, value)| {
                let outcome = key
                    .key()
                    .labels()
                    .find(|label| label.key() == "outcome")
                    .map(|label| label.value().to_string())?;
                match value {
                    DebugValue::Counter(count) => Some((outcome, count)),
                    _ => None,
                }
            })
            .collect();

        assert!(counts.contains(&("delivered".to_string(), 2)));
        assert!(counts.contains(&("pruned".to_string(), 1)));
        assert!(!counts.iter().any(|(outcome, _)| outcome == "prune_failed"));
    }
}
