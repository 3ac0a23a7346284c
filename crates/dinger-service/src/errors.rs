//! Dingaling error types.
//!
//! All errors map to appropriate HTTP status codes via the `IntoResponse` impl.
//! Error messages returned to clients are intentionally generic for backend
//! failures. Actual errors are logged server-side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Dingaling error type.
///
/// Maps to HTTP status codes:
/// - InvalidIdentifier, MalformedRequest: 400 Bad Request
/// - NotFound: 404 Not Found
/// - StoreUnavailable, ChannelProvisionFailed: 503 Service Unavailable
/// - DeliveryFailed, Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum DingerError {
    #[error("Invalid dinger id: {0}")]
    InvalidIdentifier(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Channel provisioning failed: {0}")]
    ChannelProvisionFailed(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// A single delivery failed. Absorbed by broadcast, only surfaces if a
    /// caller uses the delivery channel directly.
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Internal server error")]
    Internal,
}

impl DingerError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            DingerError::InvalidIdentifier(_) | DingerError::MalformedRequest(_) => 400,
            DingerError::NotFound(_) => 404,
            DingerError::StoreUnavailable(_) | DingerError::ChannelProvisionFailed(_) => 503,
            DingerError::DeliveryFailed(_) | DingerError::Internal => 500,
        }
    }

    /// Bounded label for the `error_type` metric dimension.
    pub fn error_type(&self) -> &'static str {
        match self {
            DingerError::InvalidIdentifier(_) => "invalid_identifier",
            DingerError::NotFound(_) => "not_found",
            DingerError::StoreUnavailable(_) => "store_unavailable",
            DingerError::ChannelProvisionFailed(_) => "channel_provision_failed",
            DingerError::MalformedRequest(_) => "malformed_request",
            DingerError::DeliveryFailed(_) => "delivery_failed",
            DingerError::Internal => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for DingerError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            DingerError::InvalidIdentifier(id) => (
                StatusCode::BAD_REQUEST,
                "INVALID_IDENTIFIER",
                format!("Invalid dinger id: {id}"),
            ),
            DingerError::NotFound(resource) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone())
            }
            DingerError::StoreUnavailable(err) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "dingaling.store", error = %err, "Store operation failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORE_UNAVAILABLE",
                    "Storage temporarily unavailable".to_string(),
                )
            }
            DingerError::ChannelProvisionFailed(err) => {
                tracing::error!(target: "dingaling.channel", error = %err, "Channel provisioning failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "CHANNEL_UNAVAILABLE",
                    "Delivery channel temporarily unavailable".to_string(),
                )
            }
            DingerError::MalformedRequest(reason) => (
                StatusCode::BAD_REQUEST,
                "MALFORMED_REQUEST",
                reason.clone(),
            ),
            DingerError::DeliveryFailed(err) => {
                tracing::warn!(target: "dingaling.channel", error = %err, "Delivery failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DELIVERY_FAILED",
                    "Message could not be delivered".to_string(),
                )
            }
            DingerError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}

/// Convert sqlx errors to DingerError.
///
/// `RowNotFound` is the only sqlx error with a meaning of its own here;
/// every other failure is a backend problem.
impl From<sqlx::Error> for DingerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DingerError::NotFound("Dinger not found".to_string()),
            other => DingerError::StoreUnavailable(other.to_string()),
        }
    }
}
