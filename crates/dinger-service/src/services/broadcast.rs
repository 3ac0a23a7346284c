//! Broadcast dispatcher.
//!
//! Fans a message out to every client of a dinger, one delivery per
//! subscription, in store order.
//!
//! # Failure Policy
//!
//! - A failed delivery means the client's session is dead: its subscription
//!   is deleted.
//! - A failed delete is logged and counted, never returned.
//! - No single client aborts the fan-out.
//! - Only enumeration failures are returned to the caller. Clients reached
//!   before such a failure have already received the message.

use crate::errors::DingerError;
use crate::identifier::DingerId;
use crate::models::{BroadcastReport, Client, ClientKey, DEFAULT_DING_MESSAGE};
use crate::observability::metrics;
use crate::repositories::SubscriptionStore;
use crate::services::delivery::DeliveryChannel;
use futures::TryStreamExt;
use std::time::Instant;
use tracing::{debug, error, info, instrument};

/// Result of delivering to one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Message handed to the delivery channel.
    Delivered,
    /// Delivery failed and the subscription was removed.
    Pruned,
    /// Delivery failed and removing the subscription failed too.
    PruneFailed,
}

impl DeliveryOutcome {
    fn as_str(self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered => "delivered",
            DeliveryOutcome::Pruned => "pruned",
            DeliveryOutcome::PruneFailed => "prune_failed",
        }
    }
}

/// Fold one delivery outcome into a report.
fn tally(mut report: BroadcastReport, outcome: DeliveryOutcome) -> BroadcastReport {
    match outcome {
        DeliveryOutcome::Delivered => report.delivered += 1,
        DeliveryOutcome::Pruned => report.pruned += 1,
        DeliveryOutcome::PruneFailed => report.prune_failures += 1,
    }
    report
}

/// Service broadcasting messages to a dinger's clients.
pub struct BroadcastDispatcher;

impl BroadcastDispatcher {
    /// Broadcast `message` to every current client of `dinger_id`.
    ///
    /// An empty message is replaced with `"Ding-A-Ling!"`. A dinger with no
    /// clients (including one that was never created) yields an empty report.
    ///
    /// # Errors
    ///
    /// - `DingerError::StoreUnavailable` - Client enumeration failed
    #[instrument(skip_all, name = "dingaling.service.broadcast", fields(dinger_id = %dinger_id))]
    pub async fn broadcast(
        store: &dyn SubscriptionStore,
        channel: &dyn DeliveryChannel,
        dinger_id: DingerId,
        message: &str,
    ) -> Result<BroadcastReport, DingerError> {
        let start = Instant::now();
        let message = if message.is_empty() {
            DEFAULT_DING_MESSAGE
        } else {
            message
        };

        let result = store
            .list_clients(dinger_id)
            .try_fold(BroadcastReport::default(), |report, (key, client)| async move {
                let outcome = Self::deliver(store, channel, &key, &client, message).await;
                Ok(tally(report, outcome))
            })
            .await;

        match &result {
            Ok(report) => {
                metrics::record_broadcast("success", report, start.elapsed());
                info!(
                    target: "dingaling.service.broadcast",
                    delivered = report.delivered,
                    pruned = report.pruned,
                    prune_failures = report.prune_failures,
                    "Broadcast complete"
                );
            }
            Err(e) => {
                metrics::record_broadcast("error", &BroadcastReport::default(), start.elapsed());
                error!(
                    target: "dingaling.service.broadcast",
                    error = %e,
                    "Broadcast aborted: client enumeration failed"
                );
            }
        }

        result
    }

    /// Deliver to one client, pruning its subscription on failure.
    async fn deliver(
        store: &dyn SubscriptionStore,
        channel: &dyn DeliveryChannel,
        key: &ClientKey,
        client: &Client,
        message: &str,
    ) -> DeliveryOutcome {
        let outcome = match channel.send(&client.id, message).await {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(send_err) => {
                debug!(
                    target: "dingaling.service.broadcast",
                    client_id = %client.id,
                    error = %send_err,
                    "Delivery failed, removing client"
                );
                match store.delete_client(key).await {
                    Ok(()) => DeliveryOutcome::Pruned,
                    Err(delete_err) => {
                        error!(
                            target: "dingaling.service.broadcast",
                            client_id = %client.id,
                            error = %delete_err,
                            "Error deleting client"
                        );
                        DeliveryOutcome::PruneFailed
                    }
                }
            }
        };

        metrics::record_delivery(outcome.as_str());
        outcome
    }
}
