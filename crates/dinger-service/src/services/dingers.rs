//! Dinger creation and lookup.

use crate::errors::DingerError;
use crate::identifier::DingerId;
use crate::models::{Dinger, DEFAULT_DINGER_NAME};
use crate::repositories::SubscriptionStore;
use tracing::{info, instrument};

/// Service for dinger records.
pub struct DingerService;

impl DingerService {
    /// Create a dinger. A missing or empty name gets the default name.
    ///
    /// # Errors
    ///
    /// - `DingerError::StoreUnavailable` - Store operation failed
    #[instrument(skip_all, name = "dingaling.service.create_dinger")]
    pub async fn create(
        store: &dyn SubscriptionStore,
        name: Option<&str>,
    ) -> Result<Dinger, DingerError> {
        let name = name
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_DINGER_NAME);

        let dinger = store.create_dinger(name).await?;

        info!(
            target: "dingaling.service.dingers",
            dinger_id = %dinger.id,
            "Dinger created"
        );

        Ok(dinger)
    }

    /// Fetch a dinger by id.
    ///
    /// # Errors
    ///
    /// - `DingerError::NotFound` - No dinger with this id
    /// - `DingerError::StoreUnavailable` - Store operation failed
    pub async fn lookup(store: &dyn SubscriptionStore, id: DingerId) -> Result<Dinger, DingerError> {
        store.get_dinger(id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::repositories::MemorySubscriptionStore;

    #[tokio::test]
    async fn test_create_without_name_uses_default() {
        let store = MemorySubscriptionStore::new();

        let unnamed = DingerService::create(&store, None).await.unwrap();
        assert_eq!(unnamed.name, "Untitled dinger");

        let empty = DingerService::create(&store, Some("")).await.unwrap();
        assert_eq!(empty.name, "Untitled dinger");
        assert_ne!(unnamed.id, empty.id);
    }

    #[tokio::test]
    async fn test_create_with_name_persists_it() {
        let store = MemorySubscriptionStore::new();

        let party = DingerService::create(&store, Some("Party")).await.unwrap();
        assert_eq!(party.name, "Party");

        let fetched = DingerService::lookup(&store, party.id).await.unwrap();
        assert_eq!(fetched, party);
    }

    #[tokio::test]
    async fn test_lookup_never_created_id_is_not_found() {
        let store = MemorySubscriptionStore::new();
        let result = DingerService::lookup(&store, DingerId::new(0xbeef).unwrap()).await;
        assert!(matches!(result, Err(DingerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_propagates_store_failure() {
        let store = MemorySubscriptionStore::new();
        store.set_unavailable(true);

        let result = DingerService::create(&store, Some("Party")).await;
        assert!(matches!(result, Err(DingerError::StoreUnavailable(_))));
    }
}
