//! Delivery channel abstraction.
//!
//! A delivery channel pushes messages to individual clients, addressed by
//! client id. Subscribers hold a session token issued by `provision` and use
//! it to `attach` and receive their messages.
//!
//! Any `send` error is treated by the broadcast dispatcher as "client gone".

use crate::errors::DingerError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use futures::stream::BoxStream;
use futures::StreamExt;
use ring::rand::{SecureRandom, SystemRandom};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

/// Length of session tokens in bytes (256 bits).
const SESSION_TOKEN_BYTES: usize = 32;

/// Messages delivered to one attached client.
pub type MessageStream = BoxStream<'static, String>;

/// Push-messaging primitive keyed by client id.
#[async_trait::async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Open a delivery session for a client and return its token.
    async fn provision(&self, client_id: &str) -> Result<String, DingerError>;

    /// Deliver a message to a client.
    async fn send(&self, client_id: &str, message: &str) -> Result<(), DingerError>;

    /// Attach to the session identified by `token`.
    ///
    /// Returns the client id owning the session and the stream of messages
    /// sent to it from now on.
    async fn attach(&self, token: &str) -> Result<(String, MessageStream), DingerError>;

    /// Check backend connectivity.
    async fn ping(&self) -> Result<(), DingerError>;
}

/// Generate a session token (256 bits CSPRNG, URL-safe base64).
pub fn generate_session_token() -> Result<String, DingerError> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    rng.fill(&mut bytes).map_err(|_| {
        tracing::error!(target: "dingaling.channel", "CSPRNG failure generating session token");
        DingerError::ChannelProvisionFailed("random generation failed".to_string())
    })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Capacity of each client's in-memory message buffer.
const MEMORY_CHANNEL_CAPACITY: usize = 64;

/// Delivery channel held in process memory.
///
/// Used by the test server harness and unit tests. Records every delivered
/// message and supports failure injection per client.
#[derive(Default)]
pub struct MemoryDeliveryChannel {
    /// Session token -> client id.
    sessions: RwLock<HashMap<String, String>>,
    /// Client id -> live fan-out to attached listeners.
    senders: RwLock<HashMap<String, broadcast::Sender<String>>>,
    /// Client id -> messages accepted for that client.
    delivered: RwLock<HashMap<String, Vec<String>>>,
    /// Clients whose sends fail.
    failing: RwLock<HashSet<String>>,
    fail_provision: AtomicBool,
    send_count: AtomicUsize,
}

impl MemoryDeliveryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends to `client_id` fail.
    pub async fn fail_client(&self, client_id: &str) {
        self.failing.write().await.insert(client_id.to_string());
    }

    /// Make `provision` fail.
    pub fn set_fail_provision(&self, fail: bool) {
        self.fail_provision.store(fail, Ordering::SeqCst);
    }

    /// Messages accepted for a client, in delivery order.
    pub async fn delivered_to(&self, client_id: &str) -> Vec<String> {
        self.delivered
            .read()
            .await
            .get(client_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of `send` calls made, successful or not.
    pub fn send_count(&self) -> usize {
        self.send_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DeliveryChannel for MemoryDeliveryChannel {
    async fn provision(&self, client_id: &str) -> Result<String, DingerError> {
        if self.fail_provision.load(Ordering::SeqCst) {
            return Err(DingerError::ChannelProvisionFailed(
                "in-memory channel rejecting provisioning".to_string(),
            ));
        }

        let token = generate_session_token()?;
        self.sessions
            .write()
            .await
            .insert(token.clone(), client_id.to_string());
        self.senders
            .write()
            .await
            .entry(client_id.to_string())
            .or_insert_with(|| broadcast::channel(MEMORY_CHANNEL_CAPACITY).0);
        Ok(token)
    }

    async fn send(&self, client_id: &str, message: &str) -> Result<(), DingerError> {
        self.send_count.fetch_add(1, Ordering::SeqCst);

        if self.failing.read().await.contains(client_id) {
            return Err(DingerError::DeliveryFailed(format!(
                "session closed for client {client_id}"
            )));
        }

        let senders = self.senders.read().await;
        let sender = senders.get(client_id).ok_or_else(|| {
            DingerError::DeliveryFailed(format!("no session for client {client_id}"))
        })?;

        // No attached listener is not a failure: the session is still open.
        let _ = sender.send(message.to_string());

        self.delivered
            .write()
            .await
            .entry(client_id.to_string())
            .or_default()
            .push(message.to_string());
        Ok(())
    }

    async fn attach(&self, token: &str) -> Result<(String, MessageStream), DingerError> {
        let client_id = self
            .sessions
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or_else(|| DingerError::NotFound("Session not found".to_string()))?;

        let receiver = self
            .senders
            .read()
            .await
            .get(&client_id)
            .map(broadcast::Sender::subscribe)
            .ok_or_else(|| DingerError::NotFound("Session not found".to_string()))?;

        let messages = BroadcastStream::new(receiver)
            .filter_map(|item| async move {
                item.map_err(|e| warn!(target: "dingaling.channel", error = %e, "Listener lagged"))
                    .ok()
            })
            .boxed();

        Ok((client_id, messages))
    }

    async fn ping(&self) -> Result<(), DingerError> {
        Ok(())
    }
}
