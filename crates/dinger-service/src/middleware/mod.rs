//! HTTP middleware for Dingaling.
//!
//! - `http_metrics` - Request count/latency metrics for every response

pub mod http_metrics;

pub use http_metrics::http_metrics_middleware;
