//! Configuration management for the Shelfsync engine
//!
//! Provides strongly-typed configuration with validation, environment variable parsing,
//! and sensible defaults. The sync, cache, provider and recommendation sections
//! implement `Default` for library users that skip the environment.
//!
//! # Example
//! ```no_run
//! use shelfsync::Config;
//! let config = Config::from_env().expect("failed to load config");
//! println!("Cache TTL: {:?}", config.cache.ttl);
//! ```

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// User whose collection this process serves
    pub user_id: String,
    /// Durable store configuration (`None` runs against the in-memory store)
    pub database: Option<DatabaseConfig>,
    /// Local key-value area backing the content cache
    pub local_store: LocalStoreConfig,
    /// API server configuration
    pub api: ApiConfig,
    /// Sync coordinator configuration
    pub sync: SyncConfig,
    /// Content cache configuration
    pub cache: CacheConfig,
    /// Content provider endpoints
    pub providers: ProviderConfig,
    /// Recommendation engine configuration
    pub recommendation: RecommendationConfig,
    /// Prometheus exporter address (only used with the `prometheus` feature)
    pub metrics_addr: Option<String>,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Minimum connections to keep open
    pub min_connections: u32,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Idle timeout for connections
    pub idle_timeout: Duration,
    /// Maximum lifetime for connections
    pub max_lifetime: Duration,
    /// Enable statement caching
    pub statement_cache_size: usize,
    /// Channel the collection trigger notifies on
    pub notify_channel: String,
}

/// Local key-value area configuration
#[derive(Debug, Clone)]
pub struct LocalStoreConfig {
    /// SQLite database file
    pub path: PathBuf,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Port to listen on
    pub port: u16,
    /// Host to bind to
    pub host: String,
    /// Request timeout
    pub request_timeout: Duration,
    /// Enable CORS
    pub cors_enabled: bool,
    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

/// Sync coordinator configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Upper bound on one collection fetch; `None` leaves it to the store
    pub fetch_timeout: Option<Duration>,
    /// Refresh once as soon as the coordinator starts
    pub refresh_on_start: bool,
    /// Capacity of the local event buses
    pub signal_buffer: usize,
}

/// Content cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a fetched payload is served
    pub ttl: Duration,
    /// Namespace prepended to every cache key in the key-value area
    pub key_prefix: String,
}

/// Content provider configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Primary catalog gateway base URL
    pub primary_url: Option<String>,
    /// Secondary catalog gateway base URL
    pub secondary_url: Option<String>,
    /// Per-request timeout for provider calls
    pub request_timeout: Duration,
    /// Size of the trending pools fetched for recommendations
    pub trending_limit: usize,
}

/// Recommendation engine configuration
#[derive(Debug, Clone)]
pub struct RecommendationConfig {
    /// Collection size below which no suggestions are made
    pub min_collection_size: usize,
    /// Maximum suggestions returned
    pub max_suggestions: usize,
    /// Genres kept in the preference profile
    pub top_genres: usize,
    /// Creators kept in the preference profile
    pub top_creators: usize,
    /// Highly rated items kept as exemplars
    pub max_exemplars: usize,
    /// Rating at or above which an item is an exemplar
    pub exemplar_min_rating: u8,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Some(Duration::from_millis(15_000)),
            refresh_on_start: true,
            signal_buffer: 64,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(4 * 60 * 60),
            key_prefix: "content_cache:".to_string(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            primary_url: None,
            secondary_url: None,
            request_timeout: Duration::from_millis(8_000),
            trending_limit: 20,
        }
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            min_collection_size: 10,
            max_suggestions: 6,
            top_genres: 3,
            top_creators: 2,
            max_exemplars: 3,
            exemplar_min_rating: 4,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Prefer loading env from a directory of files (FFOLDER) for platforms that mount secrets as files.
        // Each file name is the env var name and its contents is the value.
        if let Ok(folder) = std::env::var("FFOLDER") {
            load_env_folder(&folder);
        } else {
            // Try to load .env file (ignore if not found)
            dotenvy::dotenv().ok();
        }

        let config = Self {
            user_id: get_env_or("SHELFSYNC_USER_ID", "local"),
            database: DatabaseConfig::from_env()?,
            local_store: LocalStoreConfig::from_env(),
            api: ApiConfig::from_env(),
            sync: SyncConfig::from_env(),
            cache: CacheConfig::from_env(),
            providers: ProviderConfig::from_env(),
            recommendation: RecommendationConfig::from_env(),
            metrics_addr: get_env_opt("METRICS_ADDR"),
        };

        config.validate()?;
        config.log_summary();

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(Error::InvalidConfig {
                key: "SHELFSYNC_USER_ID",
                message: "user id cannot be empty".into(),
            });
        }

        if let Some(db) = &self.database {
            if db.max_connections < db.min_connections {
                return Err(Error::InvalidConfig {
                    key: "DB_MAX_CONNECTIONS",
                    message: "max_connections must be >= min_connections".into(),
                });
            }
            if !is_sql_identifier(&db.notify_channel) {
                return Err(Error::InvalidConfig {
                    key: "DB_NOTIFY_CHANNEL",
                    message: format!("'{}' is not a valid channel name", db.notify_channel).into(),
                });
            }
        }

        if self.cache.ttl.is_zero() {
            return Err(Error::InvalidConfig {
                key: "CACHE_TTL_SECS",
                message: "TTL must be greater than zero".into(),
            });
        }

        for (key, url) in [
            ("CONTENT_PRIMARY_URL", &self.providers.primary_url),
            ("CONTENT_SECONDARY_URL", &self.providers.secondary_url),
        ] {
            if let Some(url) = url {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(Error::InvalidConfig {
                        key,
                        message: format!("Expected an http(s) URL, got '{}'", url).into(),
                    });
                }
            }
        }

        if self.recommendation.max_suggestions == 0 {
            return Err(Error::InvalidConfig {
                key: "REC_MAX_SUGGESTIONS",
                message: "must be at least 1".into(),
            });
        }

        Ok(())
    }

    /// Log configuration summary (without sensitive data)
    fn log_summary(&self) {
        info!("Configuration loaded:");
        info!("  User: {}", self.user_id);
        info!("  Database:");
        match &self.database {
            Some(db) => {
                info!("    URL: {}", mask_url(&db.url));
                info!("    Pool Size: {}-{}", db.min_connections, db.max_connections);
                info!("    Notify Channel: {}", db.notify_channel);
            }
            None => info!("    In-memory store (DATABASE_URL not set)"),
        }
        info!("  Local Store: {}", self.local_store.path.display());
        info!("  API:");
        info!("    Listening on: {}:{}", self.api.host, self.api.port);
        info!("  Sync:");
        info!("    Fetch Timeout: {:?}", self.sync.fetch_timeout);
        info!("    Refresh On Start: {}", self.sync.refresh_on_start);
        info!("  Cache:");
        info!("    TTL: {:?}", self.cache.ttl);
        info!("  Providers:");
        info!(
            "    Primary: {}",
            self.providers.primary_url.as_deref().unwrap_or("(bundled only)")
        );
        if let Some(secondary) = &self.providers.secondary_url {
            info!("    Secondary: {}", secondary);
        }
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Option<Self>> {
        let Some(url) = get_env_opt("DATABASE_URL") else {
            return Ok(None);
        };

        Ok(Some(Self {
            url,
            max_connections: get_env_parsed_or("DB_MAX_CONNECTIONS", 10),
            min_connections: get_env_parsed_or("DB_MIN_CONNECTIONS", 1),
            connect_timeout: Duration::from_secs(get_env_parsed_or("DB_CONNECT_TIMEOUT_SECS", 30)),
            idle_timeout: Duration::from_secs(get_env_parsed_or("DB_IDLE_TIMEOUT_SECS", 600)),
            max_lifetime: Duration::from_secs(get_env_parsed_or("DB_MAX_LIFETIME_SECS", 3600)),
            statement_cache_size: get_env_parsed_or("DB_STATEMENT_CACHE_SIZE", 100),
            notify_channel: get_env_or("DB_NOTIFY_CHANNEL", "collection_changes"),
        }))
    }
}

impl LocalStoreConfig {
    fn from_env() -> Self {
        Self {
            path: PathBuf::from(get_env_or("SHELFSYNC_LOCAL_DB", "shelfsync-local.db")),
        }
    }
}

impl ApiConfig {
    fn from_env() -> Self {
        Self {
            port: get_env_parsed_or("API_PORT", 8080),
            host: get_env_or("API_HOST", "0.0.0.0"),
            request_timeout: Duration::from_secs(get_env_parsed_or("API_REQUEST_TIMEOUT_SECS", 30)),
            cors_enabled: get_env_parsed_or("API_CORS_ENABLED", true),
            cors_origins: get_env_or("API_CORS_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

impl SyncConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        // 0 disables the coordinator-side timeout
        let timeout_ms: u64 = get_env_parsed_or("SYNC_FETCH_TIMEOUT_MS", 15_000);
        Self {
            fetch_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
            refresh_on_start: get_env_parsed_or("SYNC_REFRESH_ON_START", defaults.refresh_on_start),
            signal_buffer: get_env_parsed_or("SYNC_SIGNAL_BUFFER", defaults.signal_buffer),
        }
    }
}

impl CacheConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ttl: Duration::from_secs(get_env_parsed_or("CACHE_TTL_SECS", defaults.ttl.as_secs())),
            key_prefix: get_env_or("CACHE_KEY_PREFIX", &defaults.key_prefix),
        }
    }
}

impl ProviderConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            primary_url: get_env_opt("CONTENT_PRIMARY_URL"),
            secondary_url: get_env_opt("CONTENT_SECONDARY_URL"),
            request_timeout: Duration::from_millis(get_env_parsed_or(
                "CONTENT_REQUEST_TIMEOUT_MS",
                defaults.request_timeout.as_millis() as u64,
            )),
            trending_limit: get_env_parsed_or("CONTENT_TRENDING_LIMIT", defaults.trending_limit),
        }
    }
}

impl RecommendationConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_collection_size: get_env_parsed_or(
                "REC_MIN_COLLECTION_SIZE",
                defaults.min_collection_size,
            ),
            max_suggestions: get_env_parsed_or("REC_MAX_SUGGESTIONS", defaults.max_suggestions),
            top_genres: get_env_parsed_or("REC_TOP_GENRES", defaults.top_genres),
            top_creators: get_env_parsed_or("REC_TOP_CREATORS", defaults.top_creators),
            max_exemplars: get_env_parsed_or("REC_MAX_EXEMPLARS", defaults.max_exemplars),
            exemplar_min_rating: get_env_parsed_or(
                "REC_EXEMPLAR_MIN_RATING",
                defaults.exemplar_min_rating,
            ),
        }
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Export every file in `folder` as an env var named after the file
fn load_env_folder(folder: &str) {
    let path = std::path::Path::new(folder);
    if !path.is_dir() {
        return;
    }
    match std::fs::read_dir(path) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let Ok(name) = entry.file_name().into_string() else {
                    continue;
                };
                let file = entry.path();
                if !file.is_file() {
                    continue;
                }
                if let Ok(contents) = std::fs::read_to_string(&file) {
                    // Only set env var if not already set in the environment
                    if std::env::var(&name).is_err() {
                        std::env::set_var(&name, contents.trim());
                    }
                }
            }
            log::info!("Loaded configuration from FFOLDER={}", folder);
        }
        Err(err) => {
            log::warn!("Failed to read FFOLDER {}: {}", folder, err);
        }
    }
}

/// Get environment variable with default
fn get_env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get optional, non-empty environment variable
fn get_env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse environment variable, falling back to `default` when unset or invalid
fn get_env_parsed_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Debug,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid value '{}' for {}, using default {:?}", raw, key, default);
            default
        }),
        Err(_) => default,
    }
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Mask sensitive parts of URL
pub fn mask_url(url: &str) -> String {
    // Mask password if present
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            // "scheme://" has its colon before the slashes, not a password
            if !url[colon_pos..].starts_with("://") {
                let (before, _) = url.split_at(colon_pos + 1);
                return format!("{}****{}", before, &url[at_pos..]);
            }
        }
    }
    url.to_string()
}
