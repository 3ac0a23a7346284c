//! PostgreSQL subscription store.
//!
//! # Tables
//!
//! - `dingers` - one row per dinger, id from a `BIGSERIAL` sequence
//! - `dinger_clients` - one row per subscription, primary key
//!   `(dinger_id, client_id)`, foreign key to `dingers`
//!
//! # Connections
//!
//! `list_clients` pages through a dinger's clients by keyset
//! (`client_id > last seen`), one short query per page. No connection is held
//! between pages, so pruning and other requests never wait on an enumeration.
//! A page reflects the table when it is fetched: clients added or removed
//! mid-enumeration may or may not be seen.

use crate::errors::DingerError;
use crate::identifier::DingerId;
use crate::models::{Client, ClientKey, Dinger};
use crate::observability::metrics;
use crate::repositories::{ClientStream, SubscriptionStore};
use futures::stream::{self, StreamExt, TryStreamExt};
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::{instrument, warn};

/// Clients fetched per enumeration query.
pub const CLIENT_PAGE_SIZE: i64 = 100;

/// Position of a keyset enumeration.
enum PageCursor {
    Start,
    After(String),
    Done,
}

/// Subscription store backed by PostgreSQL.
#[derive(Clone)]
pub struct PgSubscriptionStore {
    pool: PgPool,
}

impl PgSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Advance a client enumeration by one page.
    async fn next_client_page(
        &self,
        dinger_id: DingerId,
        cursor: PageCursor,
    ) -> Result<Option<(Vec<(ClientKey, Client)>, PageCursor)>, DingerError> {
        let after = match cursor {
            PageCursor::Start => None,
            PageCursor::After(client_id) => Some(client_id),
            PageCursor::Done => return Ok(None),
        };

        let page = self.fetch_client_page(dinger_id, after.as_deref()).await?;
        if page.is_empty() {
            return Ok(None);
        }

        let next = match page.last() {
            Some((key, _)) if page.len() as i64 >= CLIENT_PAGE_SIZE => {
                PageCursor::After(key.client_id.clone())
            }
            _ => PageCursor::Done,
        };

        Ok(Some((page, next)))
    }

    /// Fetch one page of clients ordered by client id, strictly after `after`.
    ///
    /// The connection goes back to the pool before the page is returned.
    async fn fetch_client_page(
        &self,
        dinger_id: DingerId,
        after: Option<&str>,
    ) -> Result<Vec<(ClientKey, Client)>, DingerError> {
        let start = Instant::now();

        let rows = sqlx::query(
            r#"
            SELECT client_id, token
            FROM dinger_clients
            WHERE dinger_id = $1 AND ($2::TEXT IS NULL OR client_id > $2)
            ORDER BY client_id
            LIMIT $3
            "#,
        )
        .bind(dinger_id.get())
        .bind(after)
        .bind(CLIENT_PAGE_SIZE)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("list_clients", "error", start.elapsed());
            warn!(target: "dingaling.repo", error = %e, dinger_id = %dinger_id, "Client enumeration failed");
            DingerError::StoreUnavailable(e.to_string())
        })?;

        metrics::record_db_query("list_clients", "success", start.elapsed());

        rows.iter()
            .map(|row| -> Result<(ClientKey, Client), DingerError> {
                let client_id: String = row.try_get("client_id")?;
                let token: String = row.try_get("token")?;
                Ok((
                    ClientKey {
                        dinger_id,
                        client_id: client_id.clone(),
                    },
                    Client {
                        id: client_id,
                        token,
                    },
                ))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    #[instrument(skip_all, name = "dingaling.repo.create_dinger")]
    async fn create_dinger(&self, name: &str) -> Result<Dinger, DingerError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            INSERT INTO dingers (name)
            VALUES ($1)
            RETURNING dinger_id, name, created_at
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("create_dinger", "error", start.elapsed());
            DingerError::StoreUnavailable(e.to_string())
        })?;

        metrics::record_db_query("create_dinger", "success", start.elapsed());

        map_row_to_dinger(&row)
    }

    #[instrument(skip_all, name = "dingaling.repo.get_dinger", fields(dinger_id = %id))]
    async fn get_dinger(&self, id: DingerId) -> Result<Dinger, DingerError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            SELECT dinger_id, name, created_at
            FROM dingers
            WHERE dinger_id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("get_dinger", "error", start.elapsed());
            DingerError::StoreUnavailable(e.to_string())
        })?;

        metrics::record_db_query("get_dinger", "success", start.elapsed());

        match row {
            Some(row) => map_row_to_dinger(&row),
            None => Err(DingerError::NotFound("Dinger not found".to_string())),
        }
    }

    #[instrument(skip_all, name = "dingaling.repo.put_client", fields(dinger_id = %dinger_id))]
    async fn put_client(&self, dinger_id: DingerId, client: &Client) -> Result<(), DingerError> {
        let start = Instant::now();

        let result = sqlx::query(
            r#"
            INSERT INTO dinger_clients (dinger_id, client_id, token)
            VALUES ($1, $2, $3)
            ON CONFLICT (dinger_id, client_id) DO UPDATE SET token = EXCLUDED.token
            "#,
        )
        .bind(dinger_id.get())
        .bind(&client.id)
        .bind(&client.token)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                metrics::record_db_query("put_client", "success", start.elapsed());
                Ok(())
            }
            Err(e) => {
                metrics::record_db_query("put_client", "error", start.elapsed());
                let parent_missing = e
                    .as_database_error()
                    .is_some_and(|db| db.is_foreign_key_violation());
                if parent_missing {
                    Err(DingerError::NotFound("Dinger not found".to_string()))
                } else {
                    Err(DingerError::StoreUnavailable(e.to_string()))
                }
            }
        }
    }

    fn list_clients(&self, dinger_id: DingerId) -> ClientStream<'_> {
        stream::try_unfold(PageCursor::Start, move |cursor| {
            self.next_client_page(dinger_id, cursor)
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, DingerError>)))
        .try_flatten()
        .boxed()
    }

    #[instrument(skip_all, name = "dingaling.repo.client_exists", fields(dinger_id = %key.dinger_id))]
    async fn client_exists(&self, key: &ClientKey) -> Result<bool, DingerError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            SELECT 1
            FROM dinger_clients
            WHERE dinger_id = $1 AND client_id = $2
            "#,
        )
        .bind(key.dinger_id.get())
        .bind(&key.client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("client_exists", "error", start.elapsed());
            DingerError::StoreUnavailable(e.to_string())
        })?;

        metrics::record_db_query("client_exists", "success", start.elapsed());

        Ok(row.is_some())
    }

    #[instrument(skip_all, name = "dingaling.repo.delete_client", fields(dinger_id = %key.dinger_id))]
    async fn delete_client(&self, key: &ClientKey) -> Result<(), DingerError> {
        let start = Instant::now();

        sqlx::query(
            r#"
            DELETE FROM dinger_clients
            WHERE dinger_id = $1 AND client_id = $2
            "#,
        )
        .bind(key.dinger_id.get())
        .bind(&key.client_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("delete_client", "error", start.elapsed());
            DingerError::StoreUnavailable(e.to_string())
        })?;

        metrics::record_db_query("delete_client", "success", start.elapsed());

        Ok(())
    }

    async fn ping(&self) -> Result<(), DingerError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| DingerError::StoreUnavailable(e.to_string()))
    }
}

/// Map a `dingers` row to a Dinger.
fn map_row_to_dinger(row: &sqlx::postgres::PgRow) -> Result<Dinger, DingerError> {
    let raw_id: i64 = row.try_get("dinger_id")?;
    let id = DingerId::new(raw_id).ok_or_else(|| {
        tracing::error!(target: "dingaling.repo", raw_id, "Store returned a negative dinger id");
        DingerError::Internal
    })?;

    Ok(Dinger {
        id,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
    })
}
