//! One user's running session
//!
//! Owns the collection snapshot, the local event buses, the sync coordinator,
//! the content service and the recommendation engine. Everything a consumer
//! needs goes through a `CollectionSession`.

use std::sync::Arc;
use tracing::info;

use crate::cache::ContentCache;
use crate::clock::Clock;
use crate::config::Config;
use crate::content::{ContentService, ProviderRegistry};
use crate::events::{EventBus, FocusEvent, MutationEvent};
use crate::models::Collection;
use crate::recommendation::{RecommendationEngine, Suggestions};
use crate::store::{CollectionStore, CollectionWriter, DurableStore, SubscriptionHandle};
use crate::sync::{SyncCoordinator, SyncHandle, SyncMonitor, SyncStats};

/// Everything a session is built from
pub struct SessionParts {
    pub store: Arc<dyn DurableStore>,
    pub cache: ContentCache,
    pub registry: ProviderRegistry,
    pub clock: Arc<dyn Clock>,
}

/// A started session
pub struct CollectionSession {
    user_id: String,
    backend: &'static str,
    collection: CollectionStore,
    writer: CollectionWriter,
    focus: EventBus<FocusEvent>,
    content: ContentService,
    engine: RecommendationEngine,
    clock: Arc<dyn Clock>,
    sync: SyncHandle,
}

impl CollectionSession {
    /// Wire the parts together and start syncing
    pub async fn start(config: &Config, parts: SessionParts) -> Self {
        let SessionParts {
            store,
            cache,
            registry,
            clock,
        } = parts;

        let collection = CollectionStore::new();
        let mutations = EventBus::<MutationEvent>::new(config.sync.signal_buffer);
        let focus = EventBus::<FocusEvent>::new(config.sync.signal_buffer);

        let writer = CollectionWriter::new(
            store.clone(),
            config.user_id.clone(),
            mutations.clone(),
            clock.clone(),
        );

        let content = ContentService::new(registry, cache, config.providers.trending_limit);
        let engine = RecommendationEngine::new(
            Arc::new(content.clone()),
            config.recommendation.clone(),
        );

        let sync = SyncCoordinator::new(
            store.clone(),
            collection.clone(),
            config.user_id.clone(),
            config.sync.clone(),
            clock.clone(),
        )
        .start(&mutations, &focus)
        .await;

        info!(
            user_id = %config.user_id,
            backend = store.backend(),
            "Collection session started"
        );

        Self {
            user_id: config.user_id.clone(),
            backend: store.backend(),
            collection,
            writer,
            focus,
            content,
            engine,
            clock,
            sync,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Durable store backend name
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Last applied collection
    pub fn current(&self) -> Arc<Collection> {
        self.collection.current()
    }

    pub fn collection(&self) -> &CollectionStore {
        &self.collection
    }

    /// Call `callback` with every new collection until the handle is dropped
    pub fn on_change<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(Arc<Collection>) + Send + 'static,
    {
        self.collection.on_change(callback)
    }

    pub fn writer(&self) -> &CollectionWriter {
        &self.writer
    }

    /// Report that the app came back to the foreground
    pub fn focus_regained(&self) {
        self.focus.publish(FocusEvent {
            at: self.clock.now(),
        });
    }

    pub fn content(&self) -> &ContentService {
        &self.content
    }

    pub fn engine(&self) -> &RecommendationEngine {
        &self.engine
    }

    /// Suggestions for the current collection
    pub async fn suggestions(&self) -> Suggestions {
        let collection = self.current();
        self.engine.get_suggestions(&collection).await
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.sync.stats()
    }

    pub fn monitor(&self) -> SyncMonitor {
        self.sync.monitor()
    }

    /// Detach sync listeners; a fetch still running is discarded
    pub async fn teardown(self) -> SyncStats {
        let stats = self.sync.teardown().await;
        info!(user_id = %self.user_id, ?stats, "Collection session stopped");
        stats
    }
}
