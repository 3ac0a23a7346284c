//! Repository layer for Dingaling.
//!
//! Provides the subscription store following the Handler -> Service ->
//! Repository architecture. Dingers are parents, clients are rows keyed
//! under their dinger.
//!
//! # Consistency
//!
//! Single-record reads and writes are atomic. There is no transaction
//! spanning "enumerate a dinger's clients" and "mutate that set": an
//! enumeration may or may not observe a concurrent subscribe, and two
//! broadcasts may race to delete the same client (delete is idempotent).

pub mod memory;
pub mod postgres;

pub use memory::MemorySubscriptionStore;
pub use postgres::PgSubscriptionStore;

use crate::errors::DingerError;
use crate::identifier::DingerId;
use crate::models::{Client, ClientKey, Dinger};
use futures::stream::BoxStream;

/// Lazy sequence of a dinger's subscriptions.
pub type ClientStream<'a> = BoxStream<'a, Result<(ClientKey, Client), DingerError>>;

/// Durable storage of dingers and their subscribed clients.
#[async_trait::async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Persist a new dinger. The store allocates the id.
    async fn create_dinger(&self, name: &str) -> Result<Dinger, DingerError>;

    /// Fetch a dinger. `NotFound` if no record exists.
    async fn get_dinger(&self, id: DingerId) -> Result<Dinger, DingerError>;

    /// Persist a client under its parent dinger.
    async fn put_client(&self, dinger_id: DingerId, client: &Client) -> Result<(), DingerError>;

    /// Enumerate the current clients of a dinger, ordered by client id.
    fn list_clients(&self, dinger_id: DingerId) -> ClientStream<'_>;

    /// Whether a subscription exists.
    async fn client_exists(&self, key: &ClientKey) -> Result<bool, DingerError>;

    /// Remove a subscription. Removing an absent key is not an error.
    async fn delete_client(&self, key: &ClientKey) -> Result<(), DingerError>;

    /// Check backend connectivity.
    async fn ping(&self) -> Result<(), DingerError>;
}
