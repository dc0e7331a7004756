//! Database connection pool and utilities
//!
//! Provides the PostgreSQL pool behind the durable collection store:
//! - Configurable pool sizes and timeouts
//! - Migrations
//! - Startup retry

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::ConnectOptions;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Database connection pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    #[instrument(skip(config))]
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        Ok(Self { pool })
    }

    /// Get reference to the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close all connections gracefully
    pub async fn close(&self) {
        info!("Closing database connection pool...");
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}

/// Create a connection pool with the given configuration
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    info!("Creating database connection pool...");
    debug!(
        "Pool config: max={}, min={}, connect_timeout={:?}",
        config.max_connections, config.min_connections, config.connect_timeout
    );

    let connect_options = PgConnectOptions::from_str(&config.url)
        .map_err(|e| Error::Config {
            message: format!("Invalid database URL: {}", e).into(),
            source: None,
        })?
        .statement_cache_capacity(config.statement_cache_size)
        .log_statements(log::LevelFilter::Debug)
        .log_slow_statements(log::LevelFilter::Warn, Duration::from_secs(1));

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout)
        .idle_timeout(Some(config.idle_timeout))
        .max_lifetime(Some(config.max_lifetime))
        .after_connect(|_conn, _meta| {
            Box::pin(async move {
                debug!("New database connection established");
                Ok(())
            })
        })
        .connect_with(connect_options)
        .await
        .map_err(|e| Error::Database {
            message: format!("Failed to create connection pool: {}", e).into(),
            source: Some(e),
        })?;

    // Verify we can connect
    sqlx::query("SELECT 1").fetch_one(&pool).await.map_err(|e| {
        Error::Database {
            message: format!("Failed to verify database connection: {}", e).into(),
            source: Some(e),
        }
    })?;

    info!(
        "Database connection pool created (size: {}, idle: {})",
        pool.size(),
        pool.num_idle()
    );

    Ok(pool)
}

/// Run database migrations
#[instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations...");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| Error::Migration(e.to_string()))?;

    info!("Database migrations completed successfully");
    Ok(())
}

/// Retry an operation with exponential backoff, capped at 30s per wait.
/// Non-retryable errors return immediately.
pub async fn with_retry<T, F, Fut>(
    mut operation: F,
    max_retries: u32,
    initial_delay: Duration,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = initial_delay;
    let mut last_error = None;

    for attempt in 0..max_retries {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_retryable() {
                    return Err(e);
                }

                warn!(
                    "Database operation failed (attempt {}/{}): {}",
                    attempt + 1,
                    max_retries,
                    e
                );

                last_error = Some(e);

                if attempt + 1 < max_retries {
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(30));
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::database("Max retries exceeded")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_stops_on_success() {
        let attempts = AtomicU32::new(0);
        let result = with_retry(
            || async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::PoolExhausted)
                } else {
                    Ok(7)
                }
            },
            5,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_on_permanent_error() {
        let attempts = AtomicU32::new(0);
        let result: Result<()> = with_retry(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(Error::bad_request("nope"))
            },
            5,
            Duration::from_millis(1),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pool_connects_and_migrates() {
        // Requires a running database
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return;
        };

        let config = DatabaseConfig {
            url,
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            max_lifetime: Duration::from_secs(300),
            statement_cache_size: 10,
            notify_channel: "collection_changes".to_string(),
        };

        let db = Database::new(&config).await.unwrap();
        run_migrations(db.pool()).await.unwrap();
        assert!(db.pool().size() > 0);
        db.close().await;
    }
}
