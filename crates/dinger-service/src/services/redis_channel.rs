//! Redis-backed delivery channel.
//!
//! # Key Patterns
//!
//! - `dingaling:session:{token}` - client id owning the session (TTL)
//! - `dingaling:client:{client_id}` - marker that the client's session is open (TTL)
//! - `dingaling:deliver:{client_id}` - pub/sub topic carrying the client's messages
//!
//! A session lives for `session_ttl_seconds`. Once it expires, `send` fails
//! and the next broadcast prunes the subscription.
//!
//! # Connection Pattern
//!
//! Commands share one `MultiplexedConnection`, cloned per operation. Each
//! attached listener opens its own pub/sub connection.

use crate::errors::DingerError;
use crate::services::delivery::{generate_session_token, DeliveryChannel, MessageStream};
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tracing::{debug, error, instrument, warn};

fn session_key(token: &str) -> String {
    format!("dingaling:session:{token}")
}

fn client_key(client_id: &str) -> String {
    format!("dingaling:client:{client_id}")
}

fn delivery_topic(client_id: &str) -> String {
    format!("dingaling:deliver:{client_id}")
}

/// Delivery channel over Redis keys and pub/sub.
#[derive(Clone)]
pub struct RedisDeliveryChannel {
    client: Client,
    connection: MultiplexedConnection,
    session_ttl_seconds: u64,
}

impl RedisDeliveryChannel {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `DingerError::ChannelProvisionFailed` if the connection cannot
    /// be established.
    pub async fn new(redis_url: &str, session_ttl_seconds: u64) -> Result<Self, DingerError> {
        let client = Client::open(redis_url).map_err(|e| {
            // Do NOT log redis_url, it may contain credentials
            error!(target: "dingaling.redis", error = %e, "Failed to open Redis client");
            DingerError::ChannelProvisionFailed(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "dingaling.redis", error = %e, "Failed to connect to Redis");
                DingerError::ChannelProvisionFailed(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self {
            client,
            connection,
            session_ttl_seconds,
        })
    }
}

#[async_trait::async_trait]
impl DeliveryChannel for RedisDeliveryChannel {
    #[instrument(skip_all, name = "dingaling.channel.provision")]
    async fn provision(&self, client_id: &str) -> Result<String, DingerError> {
        let mut conn = self.connection.clone();
        let token = generate_session_token()?;

        let _: () = redis::pipe()
            .atomic()
            .set_ex(session_key(&token), client_id, self.session_ttl_seconds)
            .ignore()
            .set_ex(client_key(client_id), 1, self.session_ttl_seconds)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(target: "dingaling.redis", error = %e, "Failed to open delivery session");
                DingerError::ChannelProvisionFailed(format!("Failed to open session: {e}"))
            })?;

        debug!(
            target: "dingaling.redis",
            ttl_seconds = self.session_ttl_seconds,
            "Opened delivery session"
        );

        Ok(token)
    }

    async fn send(&self, client_id: &str, message: &str) -> Result<(), DingerError> {
        let mut conn = self.connection.clone();

        let open: bool = conn
            .exists(client_key(client_id))
            .await
            .map_err(|e| DingerError::DeliveryFailed(format!("Session lookup failed: {e}")))?;

        if !open {
            return Err(DingerError::DeliveryFailed("Session expired".to_string()));
        }

        let listeners: i64 = conn
            .publish(delivery_topic(client_id), message)
            .await
            .map_err(|e| DingerError::DeliveryFailed(format!("Publish failed: {e}")))?;

        debug!(target: "dingaling.redis", listeners, "Published message");

        Ok(())
    }

    #[instrument(skip_all, name = "dingaling.channel.attach")]
    async fn attach(&self, token: &str) -> Result<(String, MessageStream), DingerError> {
        let mut conn = self.connection.clone();

        let client_id: Option<String> = conn.get(session_key(token)).await.map_err(|e| {
            warn!(target: "dingaling.redis", error = %e, "Session lookup failed");
            DingerError::ChannelProvisionFailed(format!("Session lookup failed: {e}"))
        })?;
        let client_id =
            client_id.ok_or_else(|| DingerError::NotFound("Session not found".to_string()))?;

        let mut pubsub = self.client.get_async_pubsub().await.map_err(|e| {
            warn!(target: "dingaling.redis", error = %e, "Failed to open pub/sub connection");
            DingerError::ChannelProvisionFailed(format!("Failed to open pub/sub: {e}"))
        })?;

        pubsub
            .subscribe(delivery_topic(&client_id))
            .await
            .map_err(|e| {
                warn!(target: "dingaling.redis", error = %e, "Failed to subscribe");
                DingerError::ChannelProvisionFailed(format!("Failed to subscribe: {e}"))
            })?;

        let messages = pubsub
            .into_on_message()
            .filter_map(|msg| async move { msg.get_payload::<String>().ok() })
            .boxed();

        Ok((client_id, messages))
    }

    async fn ping(&self) -> Result<(), DingerError> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| DingerError::ChannelProvisionFailed(format!("Redis ping failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_patterns() {
        assert_eq!(session_key("tok"), "dingaling:session:tok");
        assert_eq!(client_key("abc="), "dingaling:client:abc=");
        assert_eq!(delivery_topic("abc="), "dingaling:deliver:abc=");
    }
}
