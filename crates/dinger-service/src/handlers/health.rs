//! Health check handlers.
//!
//! - `/health`: Liveness probe - returns OK if the process is running
//! - `/ready`: Readiness probe - checks the subscription store and the
//!   delivery channel

use crate::models::ReadinessResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

/// Liveness probe handler.
///
/// Does NOT check any dependencies.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe handler.
///
/// Returns 200 if both backends answer, 503 otherwise. Backend errors are
/// logged server-side and never returned.
#[tracing::instrument(skip_all, name = "dingaling.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = match state.store.ping().await {
        Ok(()) => "healthy",
        Err(e) => {
            tracing::warn!(target: "dingaling.health", error = %e, "Readiness check failed: store");
            "unhealthy"
        }
    };

    let channel = match state.channel.ping().await {
        Ok(()) => "healthy",
        Err(e) => {
            tracing::warn!(target: "dingaling.health", error = %e, "Readiness check failed: channel");
            "unhealthy"
        }
    };

    let ready = store == "healthy" && channel == "healthy";
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            status: if ready { "ready" } else { "not_ready" },
            store,
            channel,
        }),
    )
}
