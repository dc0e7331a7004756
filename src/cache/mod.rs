//! Content cache
//!
//! Provider payloads are kept in the local key-value area as JSON
//! `CacheEntry` records. An entry is served while `now - fetched_at < ttl`
//! and never after. Anything that cannot be read back (missing, expired,
//! corrupt, wrong key) is a miss, and expired or corrupt entries are removed
//! on the way out.

pub mod kv;

pub use kv::{KeyValueStore, MemoryKv, SqliteKv};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::models::{ContentItem, Domain, SearchFilters};

/// Persisted cache record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Vec<ContentItem>,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    fn decode(raw: &str, expected_key: &str) -> Result<Self> {
        let entry: CacheEntry = serde_json::from_str(raw)
            .map_err(|e| Error::deserialization(format!("Unparsable cache entry: {}", e)))?;
        if entry.key != expected_key {
            return Err(Error::deserialization(format!(
                "Entry stored under '{}' claims key '{}'",
                expected_key, entry.key
            )));
        }
        Ok(entry)
    }
}

/// Logical cache key, built in one place for every caller
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn trending(domain: Domain, limit: usize) -> Self {
        Self(format!("trending:{}:{}", domain, limit))
    }

    pub fn search(domain: Domain, query: &str, filters: &SearchFilters) -> Self {
        let mut key = format!("search:{}:{}", domain, query.trim().to_lowercase());
        if let Some(genre) = &filters.genre {
            key.push_str(&format!(":genre={}", genre.trim().to_lowercase()));
        }
        if let Some(year) = filters.year {
            key.push_str(&format!(":year={}", year));
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// TTL-bounded cache over a `KeyValueStore`
#[derive(Clone)]
pub struct ContentCache {
    kv: Arc<dyn KeyValueStore>,
    ttl: Duration,
    prefix: String,
    clock: Arc<dyn Clock>,
}

impl ContentCache {
    pub fn new(kv: Arc<dyn KeyValueStore>, config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            kv,
            ttl: config.ttl,
            prefix: config.key_prefix.clone(),
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Payload for `key`, or `None` on any kind of miss
    pub async fn get(&self, key: &CacheKey) -> Option<Vec<ContentItem>> {
        self.get_entry(key).await.map(|entry| entry.payload)
    }

    /// Full entry for `key`, or `None` on any kind of miss
    pub async fn get_entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        let storage_key = self.storage_key(key);

        let raw = match self.kv.get(&storage_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return self.miss(key, "absent"),
            Err(e) => {
                warn!("Cache read for {} failed, treating as miss: {}", key, e);
                return self.miss(key, "read_error");
            }
        };

        let entry = match CacheEntry::decode(&raw, key.as_str()) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Dropping corrupt cache entry {}: {}", key, e);
                self.discard(&storage_key, &raw).await;
                return self.miss(key, "corrupt");
            }
        };

        if !self.is_fresh(&entry) {
            debug!("Cache entry {} expired (fetched {})", key, entry.fetched_at);
            self.discard(&storage_key, &raw).await;
            return self.miss(key, "expired");
        }

        metrics::counter!("content_cache_hits_total").increment(1);
        debug!("Cache hit for {} ({} items)", key, entry.payload.len());
        Some(entry)
    }

    /// Store `payload` with `fetched_at = now`, replacing any previous entry
    pub async fn set(&self, key: &CacheKey, payload: &[ContentItem]) -> Result<()> {
        let entry = CacheEntry {
            key: key.as_str().to_string(),
            payload: payload.to_vec(),
            fetched_at: self.clock.now(),
        };
        self.kv.set(&self.storage_key(key), &entry.encode()?).await
    }

    /// Force the next `get` for `key` to miss
    pub async fn invalidate(&self, key: &CacheKey) -> Result<()> {
        self.kv.remove(&self.storage_key(key)).await
    }

    /// Whether `entry` is still inside its TTL window
    pub fn is_fresh(&self, entry: &CacheEntry) -> bool {
        let age = self.clock.now().signed_duration_since(entry.fetched_at);
        match age.to_std() {
            Ok(age) => age < self.ttl,
            // Fetched "in the future" (clock moved back)
            Err(_) => true,
        }
    }

    fn storage_key(&self, key: &CacheKey) -> String {
        format!("{}{}", self.prefix, key.as_str())
    }

    fn miss<T>(&self, key: &CacheKey, reason: &'static str) -> Option<T> {
        metrics::counter!("content_cache_misses_total", "reason" => reason).increment(1);
        debug!("Cache miss for {} ({})", key, reason);
        None
    }

    /// Remove the entry read as `raw`, leaving any newer write in place
    async fn discard(&self, storage_key: &str, raw: &str) {
        if let Err(e) = self.kv.remove_if(storage_key, raw).await {
            warn!("Failed to remove cache entry {}: {}", storage_key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::ItemId;
    use chrono::TimeZone;

    fn setup() -> (ContentCache, Arc<MemoryKv>, ManualClock) {
        let kv = Arc::new(MemoryKv::new());
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let cache = ContentCache::new(kv.clone(), &CacheConfig::default(), Arc::new(clock.clone()));
        (cache, kv, clock)
    }

    fn payload() -> Vec<ContentItem> {
        vec![ContentItem::new(ItemId::new(Domain::Games, "1"), "Hades").with_genre("Roguelike")]
    }

    #[tokio::test]
    async fn test_ttl_boundary() {
        let (cache, _kv, clock) = setup();
        let key = CacheKey::trending(Domain::Games, 20);
        cache.set(&key, &payload()).await.unwrap();

        clock.advance(chrono::Duration::hours(4) - chrono::Duration::milliseconds(1));
        assert_eq!(cache.get(&key).await, Some(payload()));

        // fetched_at + ttl == now is already expired
        clock.advance(chrono::Duration::milliseconds(1));
        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_removed() {
        let (cache, kv, clock) = setup();
        let key = CacheKey::from("k");
        cache.set(&key, &payload()).await.unwrap();

        clock.advance(chrono::Duration::hours(5));
        assert!(cache.get(&key).await.is_none());
        assert!(kv.get("content_cache:k").await.unwrap().is_none());

        // going back in time does not resurrect it
        clock.advance(chrono::Duration::hours(-5));
        assert!(cache.get(&key).await.is_none());
    }

    /// Serves a fixed snapshot on reads while writes go to `inner`
    struct SnapshotKv {
        inner: MemoryKv,
        snapshot: String,
    }

    #[async_trait::async_trait]
    impl KeyValueStore for SnapshotKv {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(Some(self.snapshot.clone()))
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }

        async fn remove_if(&self, key: &str, expected: &str) -> Result<bool> {
            self.inner.remove_if(key, expected).await
        }
    }

    #[tokio::test]
    async fn test_expiry_does_not_drop_a_newer_write() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let stale = CacheEntry {
            key: "k".to_string(),
            payload: payload(),
            fetched_at: clock.now() - chrono::Duration::hours(5),
        };
        let kv = Arc::new(SnapshotKv {
            inner: MemoryKv::new(),
            snapshot: stale.encode().unwrap(),
        });
        let cache = ContentCache::new(kv.clone(), &CacheConfig::default(), Arc::new(clock.clone()));
        let key = CacheKey::from("k");

        // fresh write lands after the stale read
        cache.set(&key, &payload()).await.unwrap();
        assert!(cache.get(&key).await.is_none());

        let kept = kv.inner.get("content_cache:k").await.unwrap().unwrap();
        assert_eq!(CacheEntry::decode(&kept, "k").unwrap().fetched_at, clock.now());
    }

    #[tokio::test]
    async fn test_corrupt_entries_are_misses() {
        let (cache, kv, _clock) = setup();
        kv.set("content_cache:broken", "{not json").await.unwrap();
        assert!(cache.get(&CacheKey::from("broken")).await.is_none());
        assert!(kv.get("content_cache:broken").await.unwrap().is_none());

        // well-formed entry filed under another key
        let foreign = CacheEntry {
            key: "a".to_string(),
            payload: payload(),
            fetched_at: Utc::now(),
        };
        kv.set("content_cache:b", &foreign.encode().unwrap()).await.unwrap();
        assert!(cache.get(&CacheKey::from("b")).await.is_none());
    }

    #[tokio::test]
    async fn test_set_overwrites_and_restarts_window() {
        let (cache, _kv, clock) = setup();
        let key = CacheKey::from("k");
        cache.set(&key, &payload()).await.unwrap();

        clock.advance(chrono::Duration::hours(3));
        cache.set(&key, &[]).await.unwrap();

        clock.advance(chrono::Duration::hours(3));
        let entry = cache.get_entry(&key).await.unwrap();
        assert!(entry.payload.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate() {
        let (cache, _kv, _clock) = setup();
        let key = CacheKey::from("k");
        cache.set(&key, &payload()).await.unwrap();
        cache.invalidate(&key).await.unwrap();
        assert!(cache.get(&key).await.is_none());
    }

    #[test]
    fn test_search_key_normalizes_query() {
        let filters = SearchFilters {
            genre: Some("RPG".to_string()),
            year: Some(2020),
        };
        assert_eq!(
            CacheKey::search(Domain::Games, "  Elden Ring ", &filters).as_str(),
            "search:games:elden ring:genre=rpg:year=2020"
        );
        assert_eq!(
            CacheKey::search(Domain::Books, "Dune", &SearchFilters::default()).as_str(),
            "search:books:dune"
        );
    }
}
