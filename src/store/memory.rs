//! In-memory durable store for local runs and tests

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use super::{ChangeStream, DurableStore};
use crate::error::Result;
use crate::events::{ChangeFilter, ChangeNotification, ChangeOp};
use crate::models::{Collection, CollectionItem, ItemId};

const CHANGE_CAPACITY: usize = 256;

/// Process-local store with the same conflict rules as the PostgreSQL backend
#[derive(Debug)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, HashMap<ItemId, CollectionItem>>>,
    changes: broadcast::Sender<ChangeNotification>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            users: RwLock::new(HashMap::new()),
            changes,
        }
    }

    /// Number of live change subscriptions
    pub fn change_subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }

    /// Push a notification as if another device had written
    pub fn notify(&self, notification: ChangeNotification) {
        let _ = self.changes.send(notification);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn subscribe(&self, filter: ChangeFilter) -> Result<ChangeStream> {
        Ok(ChangeStream::forward(self.changes.subscribe(), filter))
    }

    async fn get_all(&self, user_id: &str) -> Result<Collection> {
        let users = self.users.read().await;
        let mut items: Vec<CollectionItem> = users
            .get(user_id)
            .map(|items| items.values().cloned().collect())
            .unwrap_or_default();
        items.sort_by(|a, b| a.added_at.cmp(&b.added_at).then_with(|| a.id.cmp(&b.id)));
        Ok(Collection::new(items))
    }

    async fn upsert(&self, user_id: &str, item: &CollectionItem) -> Result<()> {
        let op = {
            let mut users = self.users.write().await;
            let items = users.entry(user_id.to_string()).or_default();
            let mut stored = item.clone();
            let op = match items.get(&item.id) {
                Some(existing) if existing.updated_at > item.updated_at => {
                    debug!(item_id = %item.id, "Ignoring stale write");
                    return Ok(());
                }
                Some(existing) => {
                    stored.added_at = existing.added_at;
                    ChangeOp::Update
                }
                None => ChangeOp::Insert,
            };
            items.insert(stored.id.clone(), stored);
            op
        };

        self.notify(ChangeNotification {
            user_id: user_id.to_string(),
            item_id: Some(item.id.to_string()),
            op,
        });
        Ok(())
    }

    async fn delete(&self, user_id: &str, id: &ItemId) -> Result<bool> {
        let removed = {
            let mut users = self.users.write().await;
            users
                .get_mut(user_id)
                .and_then(|items| items.remove(id))
                .is_some()
        };
        if removed {
            self.notify(ChangeNotification {
                user_id: user_id.to_string(),
                item_id: Some(id.to_string()),
                op: ChangeOp::Delete,
            });
        }
        Ok(removed)
    }
}
