//! Shared helpers for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

use shelfsync::error::{Error, Result};
use shelfsync::events::ChangeFilter;
use shelfsync::models::{Collection, CollectionItem, Domain, ItemId};
use shelfsync::store::{ChangeStream, DurableStore, MemoryStore};

/// `MemoryStore` whose fetches can be counted, held back or failed
pub struct ScriptedStore {
    pub inner: MemoryStore,
    fetches: AtomicUsize,
    gated: AtomicBool,
    gate: Semaphore,
    failing: AtomicBool,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fetches: AtomicUsize::new(0),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Fetches block until `release` hands out permits
    pub fn gated() -> Self {
        let store = Self::new();
        store.gated.store(true, Ordering::SeqCst);
        store
    }

    pub fn release(&self, fetches: usize) {
        self.gate.add_permits(fetches);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `get_all` calls started so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DurableStore for ScriptedStore {
    fn backend(&self) -> &'static str {
        "scripted"
    }

    async fn subscribe(&self, filter: ChangeFilter) -> Result<ChangeStream> {
        self.inner.subscribe(filter).await
    }

    async fn get_all(&self, user_id: &str) -> Result<Collection> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.gated.load(Ordering::SeqCst) {
            self.gate
                .acquire()
                .await
                .map_err(|_| Error::database("gate closed"))?
                .forget();
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::database("scripted failure"));
        }
        self.inner.get_all(user_id).await
    }

    async fn upsert(&self, user_id: &str, item: &CollectionItem) -> Result<()> {
        self.inner.upsert(user_id, item).await
    }

    async fn delete(&self, user_id: &str, id: &ItemId) -> Result<bool> {
        self.inner.delete(user_id, id).await
    }
}

/// Poll `condition` until it holds, failing the test after two seconds
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for: {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn item(domain: Domain, ext: &str, title: &str) -> CollectionItem {
    let added = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    CollectionItem::new(ItemId::new(domain, ext), title, added)
}
