//! Fallback chain over cache, providers and the bundled catalog
//!
//! Tier order: cache, primary provider, secondary provider, bundled catalog.
//! A provider tier is skipped when it errors or returns nothing. Provider
//! results are written back to the cache; bundled items never are.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::bundled::{bundled_items, bundled_search};
use super::{ContentProvider, ProviderRegistry};
use crate::cache::{CacheKey, ContentCache};
use crate::error::Result;
use crate::models::{ContentItem, Domain, SearchFilters};
use crate::recommendation::CandidateSource;

/// Tier a result was served from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    Cache,
    Primary,
    Secondary,
    Bundled,
}

impl ContentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentSource::Cache => "cache",
            ContentSource::Primary => "primary",
            ContentSource::Secondary => "secondary",
            ContentSource::Bundled => "bundled",
        }
    }
}

/// Items plus the tier that produced them
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentResult {
    pub items: Vec<ContentItem>,
    pub source: ContentSource,
}

enum ContentRequest<'a> {
    Trending {
        limit: usize,
    },
    Search {
        query: &'a str,
        filters: &'a SearchFilters,
    },
}

impl ContentRequest<'_> {
    fn cache_key(&self, domain: Domain) -> CacheKey {
        match self {
            ContentRequest::Trending { limit } => CacheKey::trending(domain, *limit),
            ContentRequest::Search { query, filters } => CacheKey::search(domain, query, filters),
        }
    }

    async fn call(&self, provider: &dyn ContentProvider) -> Result<Vec<ContentItem>> {
        match self {
            ContentRequest::Trending { limit } => provider.trending(*limit).await,
            ContentRequest::Search { query, filters } => provider.search(query, filters).await,
        }
    }

    fn bundled(&self, domain: Domain) -> Vec<ContentItem> {
        match self {
            ContentRequest::Trending { limit } => {
                let mut items = bundled_items(domain);
                items.truncate(*limit);
                items
            }
            ContentRequest::Search { query, filters } => bundled_search(domain, query, filters),
        }
    }
}

/// Serves content through the fallback chain
#[derive(Clone)]
pub struct ContentService {
    registry: Arc<ProviderRegistry>,
    cache: ContentCache,
    trending_limit: usize,
}

impl ContentService {
    pub fn new(registry: ProviderRegistry, cache: ContentCache, trending_limit: usize) -> Self {
        Self {
            registry: Arc::new(registry),
            cache,
            trending_limit,
        }
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn trending_limit(&self) -> usize {
        self.trending_limit
    }

    /// Trending items for `domain`
    #[instrument(skip(self))]
    pub async fn trending(&self, domain: Domain, limit: usize) -> ContentResult {
        self.resolve(domain, ContentRequest::Trending { limit }).await
    }

    /// Search `domain`
    #[instrument(skip(self, filters))]
    pub async fn search(&self, domain: Domain, query: &str, filters: &SearchFilters) -> ContentResult {
        self.resolve(domain, ContentRequest::Search { query, filters })
            .await
    }

    /// Drop the cached trending pool and fetch it again
    pub async fn refresh_trending(&self, domain: Domain, limit: usize) -> ContentResult {
        if let Err(e) = self.cache.invalidate(&CacheKey::trending(domain, limit)).await {
            warn!("Failed to invalidate trending {}: {}", domain, e);
        }
        self.trending(domain, limit).await
    }

    async fn resolve(&self, domain: Domain, request: ContentRequest<'_>) -> ContentResult {
        let key = request.cache_key(domain);

        if let Some(items) = self.cache.get(&key).await {
            return served(items, ContentSource::Cache);
        }

        for (provider, tier) in self.registry.chain(domain) {
            match request.call(provider.as_ref()).await {
                Ok(items) if !items.is_empty() => {
                    if let Err(e) = self.cache.set(&key, &items).await {
                        warn!("Failed to cache {}: {}", key, e);
                    }
                    return served(items, tier);
                }
                Ok(_) => {
                    debug!(provider = provider.id(), "Empty result for {}, trying next tier", key);
                }
                Err(e) => {
                    warn!(provider = provider.id(), "Fetch for {} failed, trying next tier: {}", key, e);
                }
            }
        }

        served(request.bundled(domain), ContentSource::Bundled)
    }
}

fn served(items: Vec<ContentItem>, source: ContentSource) -> ContentResult {
    metrics::counter!("content_fallback_total", "tier" => source.as_str()).increment(1);
    ContentResult { items, source }
}

#[async_trait]
impl CandidateSource for ContentService {
    /// Trending pool through the full chain; never fails
    async fn candidate_pool(&self, domain: Domain) -> Result<Vec<ContentItem>> {
        Ok(self.trending(domain, self.trending_limit).await.items)
    }
}
