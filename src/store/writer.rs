//! Local collection mutations
//!
//! Every write goes to the durable store first. Only after the store accepts
//! it is a `MutationEvent` published, which is what prompts the coordinator
//! to refresh.

use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::DurableStore;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::events::{EventBus, MutationEvent, MutationKind};
use crate::models::{CollectionItem, ItemId};

/// Add/update/remove helpers for one user
#[derive(Clone)]
pub struct CollectionWriter {
    store: Arc<dyn DurableStore>,
    user_id: String,
    mutations: EventBus<MutationEvent>,
    clock: Arc<dyn Clock>,
}

impl CollectionWriter {
    pub fn new(
        store: Arc<dyn DurableStore>,
        user_id: impl Into<String>,
        mutations: EventBus<MutationEvent>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            user_id: user_id.into(),
            mutations,
            clock,
        }
    }

    /// Add a new item, stamping `added_at` and `updated_at` with now
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn add(&self, mut item: CollectionItem) -> Result<CollectionItem> {
        item.validate()?;
        let now = self.clock.now();
        item.added_at = now;
        item.updated_at = now;

        self.store.upsert(&self.user_id, &item).await?;
        info!("➕ Added {} to collection", item.id);
        self.announce(&item.id, MutationKind::Upsert);
        Ok(item)
    }

    /// Overwrite an item; any status may replace any other
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn update(&self, mut item: CollectionItem) -> Result<CollectionItem> {
        item.validate()?;
        item.updated_at = self.clock.now();

        self.store.upsert(&self.user_id, &item).await?;
        debug!("Updated {}", item.id);
        self.announce(&item.id, MutationKind::Upsert);
        Ok(item)
    }

    /// Remove an item; `NotFound` if it was not in the collection
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &ItemId) -> Result<()> {
        if !self.store.delete(&self.user_id, id).await? {
            return Err(Error::not_found("collection item", id.as_str()));
        }
        info!("➖ Removed {} from collection", id);
        self.announce(id, MutationKind::Delete);
        Ok(())
    }

    fn announce(&self, id: &ItemId, kind: MutationKind) {
        let delivered = self.mutations.publish(MutationEvent {
            user_id: self.user_id.clone(),
            item_id: id.clone(),
            kind,
        });
        debug!(delivered, "Published mutation event");
    }
}
