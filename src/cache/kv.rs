//! Local durable key-value area
//!
//! Plain string keys and values. `SqliteKv` persists across restarts;
//! `MemoryKv` is process-local.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// String key-value storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove; a missing key is not an error
    async fn remove(&self, key: &str) -> Result<()>;

    /// Remove only while the stored value is still `expected`
    async fn remove_if(&self, key: &str, expected: &str) -> Result<bool>;
}

// ============================================================================
// SQLite
// ============================================================================

/// Key-value area in a SQLite database
#[derive(Debug, Clone)]
pub struct SqliteKv {
    pool: SqlitePool,
}

impl SqliteKv {
    /// Open (creating if needed) a database file
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| Error::local_store(format!("Failed to open {}: {}", path.display(), e)))?;

        let kv = Self { pool };
        kv.ensure_schema().await?;
        info!("Opened local store at {}", path.display());
        Ok(kv)
    }

    /// Database living only as long as this pool
    pub async fn in_memory() -> Result<Self> {
        // One connection that never recycles, or the in-memory database vanishes
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| Error::local_store(format!("Failed to open in-memory store: {}", e)))?;

        let kv = Self { pool };
        kv.ensure_schema().await?;
        Ok(kv)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key        TEXT PRIMARY KEY NOT NULL,
                value      TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::local_store(format!("Failed to create kv_store: {}", e)))?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl KeyValueStore for SqliteKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::local_store(format!("Read of '{}' failed: {}", key, e)))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::local_store(format!("Write of '{}' failed: {}", key, e)))?;

        debug!("Persisted {} ({} bytes)", key, value.len());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::local_store(format!("Delete of '{}' failed: {}", key, e)))?;
        Ok(())
    }

    async fn remove_if(&self, key: &str, expected: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv_store WHERE key = ? AND value = ?")
            .bind(key)
            .bind(expected)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::local_store(format!("Delete of '{}' failed: {}", key, e)))?;
        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// Memory
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn remove_if(&self, key: &str, expected: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        if entries.get(key).map(String::as_str) != Some(expected) {
            return Ok(false);
        }
        entries.remove(key);
        Ok(true)
    }
}
