//! In-memory subscription store.
//!
//! Used by the test server harness and unit tests. Supports fault injection
//! so callers can exercise store outages and failed prunes.

use crate::errors::DingerError;
use crate::identifier::DingerId;
use crate::models::{Client, ClientKey, Dinger};
use crate::repositories::{ClientStream, SubscriptionStore};
use chrono::Utc;
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tokio::sync::RwLock;

/// Subscription store held in process memory.
///
/// `list_clients` enumerates a snapshot taken when the stream is first polled.
pub struct MemorySubscriptionStore {
    next_id: AtomicI64,
    dingers: RwLock<HashMap<DingerId, Dinger>>,
    clients: RwLock<BTreeMap<ClientKey, Client>>,
    unavailable: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            dingers: RwLock::new(HashMap::new()),
            clients: RwLock::new(BTreeMap::new()),
            unavailable: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    /// Make every operation fail with `StoreUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `delete_client` fail with `StoreUnavailable`.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Number of subscriptions currently held for a dinger.
    pub async fn client_count(&self, dinger_id: DingerId) -> usize {
        self.clients
            .read()
            .await
            .keys()
            .filter(|key| key.dinger_id == dinger_id)
            .count()
    }

    fn check_available(&self) -> Result<(), DingerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DingerError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MemorySubscriptionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn create_dinger(&self, name: &str) -> Result<Dinger, DingerError> {
        self.check_available()?;

        let raw = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = DingerId::new(raw).ok_or(DingerError::Internal)?;
        let dinger = Dinger {
            id,
            name: name.to_string(),
            created_at: Utc::now(),
        };

        self.dingers.write().await.insert(id, dinger.clone());
        Ok(dinger)
    }

    async fn get_dinger(&self, id: DingerId) -> Result<Dinger, DingerError> {
        self.check_available()?;

        self.dingers
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| DingerError::NotFound("Dinger not found".to_string()))
    }

    async fn put_client(&self, dinger_id: DingerId, client: &Client) -> Result<(), DingerError> {
        self.check_available()?;

        if !self.dingers.read().await.contains_key(&dinger_id) {
            return Err(DingerError::NotFound("Dinger not found".to_string()));
        }

        let key = ClientKey {
            dinger_id,
            client_id: client.id.clone(),
        };
        self.clients.write().await.insert(key, client.clone());
        Ok(())
    }

    fn list_clients(&self, dinger_id: DingerId) -> ClientStream<'_> {
        let snapshot = async move {
            self.check_available()?;

            let clients = self.clients.read().await;
            let rows: Vec<Result<(ClientKey, Client), DingerError>> = clients
                .iter()
                .filter(|(key, _)| key.dinger_id == dinger_id)
                .map(|(key, client)| Ok((key.clone(), client.clone())))
                .collect();
            Ok::<_, DingerError>(rows)
        };

        futures::stream::once(snapshot)
            .flat_map(|rows| match rows {
                Ok(rows) => futures::stream::iter(rows),
                Err(e) => futures::stream::iter(vec![Err(e)]),
            })
            .boxed()
    }

    async fn client_exists(&self, key: &ClientKey) -> Result<bool, DingerError> {
        self.check_available()?;

        Ok(self.clients.read().await.contains_key(key))
    }

    async fn delete_client(&self, key: &ClientKey) -> Result<(), DingerError> {
        self.check_available()?;

        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(DingerError::StoreUnavailable(
                "in-memory store rejecting deletes".to_string(),
            ));
        }

        self.clients.write().await.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), DingerError> {
        self.check_available()
    }
}
