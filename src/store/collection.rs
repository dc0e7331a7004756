//! In-process collection snapshot
//!
//! The coordinator is the only writer. Each refresh swaps in a whole new
//! `Arc<Collection>`, so readers see either the previous collection or the
//! next one and never a mix.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::Collection;

/// Collection as of the last successful fetch
#[derive(Debug, Clone, Default)]
pub struct CollectionSnapshot {
    pub collection: Arc<Collection>,
    /// `None` until the first fetch lands
    pub synced_at: Option<DateTime<Utc>>,
}

/// Shared handle to the current collection
#[derive(Debug, Clone)]
pub struct CollectionStore {
    state: Arc<watch::Sender<CollectionSnapshot>>,
}

impl CollectionStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(CollectionSnapshot::default());
        Self {
            state: Arc::new(state),
        }
    }

    /// Current collection
    pub fn current(&self) -> Arc<Collection> {
        self.state.borrow().collection.clone()
    }

    pub fn snapshot(&self) -> CollectionSnapshot {
        self.state.borrow().clone()
    }

    /// Whether at least one fetch has been applied
    pub fn is_loaded(&self) -> bool {
        self.state.borrow().synced_at.is_some()
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.state.borrow().synced_at
    }

    /// Receiver that observes every replacement
    pub fn subscribe(&self) -> watch::Receiver<CollectionSnapshot> {
        self.state.subscribe()
    }

    /// Run `callback` with the new collection after every replacement.
    ///
    /// Must be called inside a tokio runtime. Dropping the handle unsubscribes.
    pub fn on_change<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(Arc<Collection>) + Send + 'static,
    {
        let mut rx = self.state.subscribe();
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let collection = rx.borrow_and_update().collection.clone();
                callback(collection);
            }
        });
        SubscriptionHandle { task }
    }

    /// Atomically swap in a freshly fetched collection
    pub(crate) fn replace(&self, collection: Collection, synced_at: DateTime<Utc>) {
        self.state.send_replace(CollectionSnapshot {
            collection: Arc::new(collection),
            synced_at: Some(synced_at),
        });
    }
}

impl Default for CollectionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps an `on_change` callback registered while alive
#[derive(Debug)]
pub struct SubscriptionHandle {
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn unsubscribe(self) {}
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
