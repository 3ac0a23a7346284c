//! Client identity and delivery session issuance.
//!
//! # Client Ids
//!
//! A client id is the URL-safe base64 SHA-256 digest of the dinger's external
//! id followed by a CSPRNG integer in `[0, 2^63)`. Uniqueness is
//! probabilistic: ids are not checked against the store. Two clients collide
//! only if both the dinger id and 63 bits of randomness match, or SHA-256
//! collides.
//!
//! # Atomicity
//!
//! The delivery session is provisioned before anything is written. If
//! provisioning fails, no subscription row exists.

use crate::errors::DingerError;
use crate::identifier::{self, DingerId};
use crate::models::Client;
use crate::observability::metrics;
use crate::repositories::SubscriptionStore;
use crate::services::delivery::DeliveryChannel;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Mask keeping the low 63 bits of a random draw.
const NONCE_MASK: u64 = i64::MAX as u64;

/// Service issuing client subscriptions.
pub struct SessionIssuer;

impl SessionIssuer {
    /// Subscribe a new client to a dinger.
    ///
    /// # Errors
    ///
    /// - `DingerError::NotFound` - Dinger does not exist
    /// - `DingerError::ChannelProvisionFailed` - Session could not be opened
    /// - `DingerError::StoreUnavailable` - Store operation failed
    #[instrument(skip_all, name = "dingaling.service.subscribe", fields(dinger_id = %dinger_id))]
    pub async fn subscribe(
        store: &dyn SubscriptionStore,
        channel: &dyn DeliveryChannel,
        dinger_id: DingerId,
    ) -> Result<Client, DingerError> {
        let start = Instant::now();

        let result = Self::issue(store, channel, dinger_id).await;

        match &result {
            Ok(_) => metrics::record_subscription("success", None, start.elapsed()),
            Err(e) => {
                metrics::record_subscription("error", Some(e.error_type()), start.elapsed())
            }
        }

        result
    }

    async fn issue(
        store: &dyn SubscriptionStore,
        channel: &dyn DeliveryChannel,
        dinger_id: DingerId,
    ) -> Result<Client, DingerError> {
        store.get_dinger(dinger_id).await?;

        let client_id = derive_client_id(dinger_id, random_nonce()?);

        let token = channel.provision(&client_id).await.map_err(|e| {
            warn!(
                target: "dingaling.service.subscribe",
                error = %e,
                "Delivery session provisioning failed"
            );
            match e {
                DingerError::ChannelProvisionFailed(_) => e,
                other => DingerError::ChannelProvisionFailed(other.to_string()),
            }
        })?;

        let client = Client {
            id: client_id,
            token,
        };
        store.put_client(dinger_id, &client).await?;

        info!(
            target: "dingaling.service.subscribe",
            client_id = %client.id,
            "Client subscribed"
        );

        Ok(client)
    }
}

/// Derive a client id from the dinger id and a random nonce.
pub fn derive_client_id(dinger_id: DingerId, nonce: u64) -> String {
    let material = format!("{}{}", identifier::encode(dinger_id), nonce);
    URL_SAFE_NO_PAD.encode(digest(&SHA256, material.as_bytes()))
}

/// Draw a CSPRNG integer in `[0, 2^63)`.
fn random_nonce() -> Result<u64, DingerError> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 8];
    rng.fill(&mut bytes).map_err(|_| {
        tracing::error!(target: "dingaling.service.subscribe", "CSPRNG failure generating client id");
        DingerError::Internal
    })?;
    Ok(u64::from_be_bytes(bytes) & NONCE_MASK)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::repositories::MemorySubscriptionStore;
    use crate::services::delivery::MemoryDeliveryChannel;
    use futures::TryStreamExt;

    #[test]
    fn test_derive_client_id_is_deterministic_and_url_safe() {
        let dinger = DingerId::new(0x1f).unwrap();
        let a = derive_client_id(dinger, 12345);
        let b = derive_client_id(dinger, 12345);

        assert_eq!(a, b);
        // 32-byte digest -> 43 chars of unpadded base64
        assert_eq!(a.len(), 43);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_derive_client_id_depends_on_dinger_and_nonce() {
        let d1 = DingerId::new(1).unwrap();
        let d2 = DingerId::new(2).unwrap();

        assert_ne!(derive_client_id(d1, 7), derive_client_id(d2, 7));
        assert_ne!(derive_client_id(d1, 7), derive_client_id(d1, 8));
    }

    #[test]
    fn test_random_nonce_is_non_negative_63_bit() {
        for _ in 0..64 {
            let nonce = random_nonce().unwrap();
            assert!(nonce <= NONCE_MASK);
        }
    }

    #[tokio::test]
    async fn test_subscribe_persists_client() {
        let store = MemorySubscriptionStore::new();
        let channel = MemoryDeliveryChannel::new();
        let dinger = store.create_dinger("Party").await.unwrap();

        let client = SessionIssuer::subscribe(&store, &channel, dinger.id)
            .await
            .unwrap();

        let rows: Vec<_> = store.list_clients(dinger.id).try_collect().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, client);
        assert_eq!(rows[0].0.client_id, client.id);
    }

    #[tokio::test]
    async fn test_two_subscriptions_get_distinct_ids_and_tokens() {
        let store = MemorySubscriptionStore::new();
        let channel = MemoryDeliveryChannel::new();
        let dinger = store.create_dinger("Party").await.unwrap();

        let a = SessionIssuer::subscribe(&store, &channel, dinger.id)
            .await
            .unwrap();
        let b = SessionIssuer::subscribe(&store, &channel, dinger.id)
            .await
            .unwrap();

        assert_ne!(a.id, b.id);
        assert_ne!(a.token, b.token);
        assert_eq!(store.client_count(dinger.id).await, 2);
    }

    #[tokio::test]
    async fn test_subscribe_unknown_dinger_is_not_found() {
        let store = MemorySubscriptionStore::new();
        let channel = MemoryDeliveryChannel::new();

        let result = SessionIssuer::subscribe(&store, &channel, DingerId::new(99).unwrap()).await;
        assert!(matches!(result, Err(DingerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_provision_failure_persists_nothing() {
        let store = MemorySubscriptionStore::new();
        let channel = MemoryDeliveryChannel::new();
        let dinger = store.create_dinger("Party").await.unwrap();
        channel.set_fail_provision(true);

        let result = SessionIssuer::subscribe(&store, &channel, dinger.id).await;

        assert!(matches!(result, Err(DingerError::ChannelProvisionFailed(_))));
        assert_eq!(store.client_count(dinger.id).await, 0);
    }
}
