//! Durable collection storage
//!
//! - `DurableStore` - the backing store interface (PostgreSQL or in-memory)
//! - `ChangeStream` - filtered change notifications pushed by a backend
//! - `CollectionStore` - the in-process snapshot everything else reads
//! - `CollectionWriter` - local mutations that announce themselves on completion
//!
//! Cross-device conflicts are resolved by the backend: an upsert replaces the
//! stored record only when its `updated_at` is not older than the stored one.

pub mod collection;
pub mod memory;
pub mod postgres;
pub mod writer;

pub use collection::{CollectionSnapshot, CollectionStore, SubscriptionHandle};
pub use memory::MemoryStore;
pub use postgres::PgCollectionStore;
pub use writer::CollectionWriter;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::events::{ChangeFilter, ChangeNotification};
use crate::models::{Collection, CollectionItem, ItemId};

/// Buffer between a backend's change source and one subscriber
pub const CHANGE_STREAM_BUFFER: usize = 64;

/// Durable, per-user collection storage
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Backend name for logs and health output
    fn backend(&self) -> &'static str;

    /// Subscribe to change notifications matching `filter`.
    ///
    /// Dropping the returned stream detaches the subscription.
    async fn subscribe(&self, filter: ChangeFilter) -> Result<ChangeStream>;

    /// Full snapshot of a user's collection, ordered by `added_at`
    async fn get_all(&self, user_id: &str) -> Result<Collection>;

    /// Insert or replace an item (last writer wins on `updated_at`).
    /// A replaced item keeps its stored `added_at`.
    async fn upsert(&self, user_id: &str, item: &CollectionItem) -> Result<()>;

    /// Delete an item, returning whether it existed
    async fn delete(&self, user_id: &str, id: &ItemId) -> Result<bool>;
}

/// Change notifications for one subscriber
#[derive(Debug)]
pub struct ChangeStream {
    receiver: mpsc::Receiver<ChangeNotification>,
    forwarder: JoinHandle<()>,
}

impl ChangeStream {
    /// Wrap a receiver fed by `forwarder`; the task is aborted when the stream drops
    pub fn new(receiver: mpsc::Receiver<ChangeNotification>, forwarder: JoinHandle<()>) -> Self {
        Self {
            receiver,
            forwarder,
        }
    }

    /// Forward matching notifications from a broadcast source.
    ///
    /// A lagged source yields a single `resync` notification.
    pub fn forward(
        mut source: broadcast::Receiver<ChangeNotification>,
        filter: ChangeFilter,
    ) -> Self {
        let (tx, rx) = mpsc::channel(CHANGE_STREAM_BUFFER);
        let forwarder = tokio::spawn(async move {
            loop {
                let notification = match source.recv().await {
                    Ok(n) if filter.matches(&n) => n,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, user_id = %filter.user_id, "Change stream lagged, requesting resync");
                        ChangeNotification::resync(filter.user_id.clone())
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(user_id = %filter.user_id, "Change source closed");
                        break;
                    }
                };
                if tx.send(notification).await.is_err() {
                    break;
                }
            }
        });
        Self::new(rx, forwarder)
    }

    /// Next notification, or `None` once the source is gone
    pub async fn recv(&mut self) -> Option<ChangeNotification> {
        self.receiver.recv().await
    }
}

impl Drop for ChangeStream {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}
