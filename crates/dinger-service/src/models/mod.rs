//! Dingaling models.
//!
//! Store records plus one statically defined request/response type per
//! HTTP operation.

use crate::identifier::DingerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name given to a dinger created without one.
pub const DEFAULT_DINGER_NAME: &str = "Untitled dinger";

/// Message broadcast when a post has an empty body.
pub const DEFAULT_DING_MESSAGE: &str = "Ding-A-Ling!";

/// A named notification channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dinger {
    /// Store-assigned identifier.
    pub id: DingerId,

    /// Display name (write-once).
    pub name: String,

    /// When the store created the record.
    pub created_at: DateTime<Utc>,
}

/// A single subscription to a dinger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Client {
    /// Opaque client id, used as the delivery routing key.
    pub id: String,

    /// Session token used to attach to the delivery channel.
    pub token: String,
}

/// Key of a subscription row: the parent dinger plus the client id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientKey {
    pub dinger_id: DingerId,
    pub client_id: String,
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Clients the message was handed to.
    pub delivered: u64,

    /// Subscriptions removed after a failed delivery.
    pub pruned: u64,

    /// Failed deliveries whose subscription could not be removed.
    #[serde(skip)]
    pub prune_failures: u64,
}

impl BroadcastReport {
    /// Number of clients the broadcast attempted to reach.
    pub fn attempted(&self) -> u64 {
        self.delivered + self.pruned + self.prune_failures
    }
}

// ============================================================================
// HTTP request/response types
// ============================================================================

/// Query parameters for `POST /d`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateDingerParams {
    /// Requested display name. Empty or absent means the default name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Response for `POST /d`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDingerResponse {
    /// External dinger id.
    pub id: String,

    /// Display name as stored.
    pub name: String,

    /// URL at which the dinger can be reached.
    pub url: String,
}

/// Response for `GET /d/:id/info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DingerInfoResponse {
    pub id: String,
    pub name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Response for `/d/:id/connect`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectResponse {
    /// Client id assigned to the subscriber.
    pub id: String,

    /// Session token for `/d/:id/listen`.
    pub token: String,
}

/// Response for `POST /d/:id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub delivered: u64,
    pub pruned: u64,
}

impl From<BroadcastReport> for BroadcastResponse {
    fn from(report: BroadcastReport) -> Self {
        Self {
            delivered: report.delivered,
            pruned: report.pruned,
        }
    }
}

/// Query parameters for `GET /d/:id/listen`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenParams {
    pub token: String,
}

/// Readiness check response.
///
/// Returned by the `/ready` endpoint (readiness probe).
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// Service readiness status ("ready" or "not_ready").
    pub status: &'static str,

    /// Subscription store connectivity status.
    pub store: &'static str,

    /// Delivery channel connectivity status.
    pub channel: &'static str,
}
