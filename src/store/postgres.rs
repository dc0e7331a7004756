//! PostgreSQL durable store
//!
//! Rows live in `collection_items`, keyed by `(user_id, item_id)`. A trigger
//! (see `migrations/`) publishes every row change on a `NOTIFY` channel as
//! JSON `{"user_id", "item_id", "op"}`; `subscribe` listens on that channel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgListener, PgPool};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use super::{ChangeStream, DurableStore, CHANGE_STREAM_BUFFER};
use crate::error::{Error, Result};
use crate::events::{ChangeFilter, ChangeNotification};
use crate::models::{Collection, CollectionItem, Domain, ItemId, ItemStatus};
use crate::recommendation::metrics::PerformanceTimer;

/// Delay before re-polling a listener that returned an error
const LISTENER_BACKOFF: Duration = Duration::from_secs(1);

/// Collection storage backed by PostgreSQL
#[derive(Clone)]
pub struct PgCollectionStore {
    pool: PgPool,
    channel: String,
}

impl PgCollectionStore {
    pub fn new(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Raw row, converted into a `CollectionItem` after validation
#[derive(Debug, sqlx::FromRow)]
struct CollectionItemRow {
    item_id: String,
    domain: String,
    title: String,
    status: String,
    rating: Option<i16>,
    genre: Option<String>,
    creator: Option<String>,
    release_year: Option<i32>,
    image_url: Option<String>,
    added_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CollectionItemRow> for CollectionItem {
    type Error = Error;

    fn try_from(row: CollectionItemRow) -> Result<Self> {
        let id = ItemId::parse(&row.item_id)?;
        let domain: Domain = row.domain.parse()?;
        let rating = row
            .rating
            .map(|r| {
                u8::try_from(r)
                    .map_err(|_| Error::invalid_format(format!("Rating {} out of range", r)))
            })
            .transpose()?;

        let item = CollectionItem {
            id,
            domain,
            title: row.title,
            status: ItemStatus::parse(&row.status),
            rating,
            genre: row.genre,
            creator: row.creator,
            release_year: row.release_year,
            image_url: row.image_url,
            added_at: row.added_at,
            updated_at: row.updated_at,
        };
        item.validate()?;
        Ok(item)
    }
}

#[async_trait]
impl DurableStore for PgCollectionStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    #[instrument(skip(self), fields(channel = %self.channel))]
    async fn subscribe(&self, filter: ChangeFilter) -> Result<ChangeStream> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(&self.channel).await?;
        info!("📡 Listening for collection changes");

        let (tx, rx) = mpsc::channel(CHANGE_STREAM_BUFFER);
        let forwarder = tokio::spawn(async move {
            loop {
                let notification = match listener.try_recv().await {
                    Ok(Some(message)) => {
                        match serde_json::from_str::<ChangeNotification>(message.payload()) {
                            Ok(n) if filter.matches(&n) => n,
                            Ok(_) => continue,
                            Err(e) => {
                                warn!("Unparsable change payload '{}': {}", message.payload(), e);
                                continue;
                            }
                        }
                    }
                    // Connection dropped; anything sent meanwhile is lost
                    Ok(None) => {
                        warn!("Change listener reconnecting, requesting resync");
                        ChangeNotification::resync(filter.user_id.clone())
                    }
                    Err(e) => {
                        error!("Change listener error: {}", e);
                        tokio::time::sleep(LISTENER_BACKOFF).await;
                        ChangeNotification::resync(filter.user_id.clone())
                    }
                };
                if tx.send(notification).await.is_err() {
                    debug!("Change subscriber gone, stopping listener");
                    break;
                }
            }
        });

        Ok(ChangeStream::new(rx, forwarder))
    }

    #[instrument(skip(self))]
    async fn get_all(&self, user_id: &str) -> Result<Collection> {
        let timer = PerformanceTimer::new("pg_get_all");
        let rows: Vec<CollectionItemRow> = sqlx::query_as(
            r#"
            SELECT item_id, domain, title, status, rating, genre, creator,
                   release_year, image_url, added_at, updated_at
            FROM collection_items
            WHERE user_id = $1
            ORDER BY added_at, item_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let items: Collection = rows
            .into_iter()
            .filter_map(|row| {
                let raw_id = row.item_id.clone();
                match CollectionItem::try_from(row) {
                    Ok(item) => Some(item),
                    Err(e) => {
                        warn!("Skipping malformed collection row {}: {}", raw_id, e);
                        None
                    }
                }
            })
            .collect();

        debug!("Loaded {} items for {}", items.len(), user_id);
        timer.log_if_slow(500);
        Ok(items)
    }

    #[instrument(skip(self, item), fields(item_id = %item.id))]
    async fn upsert(&self, user_id: &str, item: &CollectionItem) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO collection_items (
                user_id, item_id, domain, title, status, rating, genre, creator,
                release_year, image_url, added_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (user_id, item_id) DO UPDATE SET
                domain = EXCLUDED.domain,
                title = EXCLUDED.title,
                status = EXCLUDED.status,
                rating = EXCLUDED.rating,
                genre = EXCLUDED.genre,
                creator = EXCLUDED.creator,
                release_year = EXCLUDED.release_year,
                image_url = EXCLUDED.image_url,
                updated_at = EXCLUDED.updated_at
            WHERE collection_items.updated_at <= EXCLUDED.updated_at
            "#,
        )
        .bind(user_id)
        .bind(item.id.as_str())
        .bind(item.domain.as_str())
        .bind(&item.title)
        .bind(item.status.as_str())
        .bind(item.rating.map(i16::from))
        .bind(&item.genre)
        .bind(&item.creator)
        .bind(item.release_year)
        .bind(&item.image_url)
        .bind(item.added_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!("Ignoring stale write");
        }
        Ok(())
    }

    #[instrument(skip(self), fields(item_id = %id))]
    async fn delete(&self, user_id: &str, id: &ItemId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM collection_items WHERE user_id = $1 AND item_id = $2")
            .bind(user_id)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
