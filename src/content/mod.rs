//! Content providers and the fallback chain
//!
//! Each domain has up to two providers. `ContentService` serves requests from
//! the cache first, then the primary provider, then the secondary, and
//! finally the bundled catalog compiled into the binary.

pub mod bundled;
pub mod http;
pub mod service;

pub use http::HttpCatalogProvider;
pub use service::{ContentResult, ContentService, ContentSource};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::models::{ContentItem, Domain, SearchFilters};

/// Fetches and normalizes items for one domain
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Unique identifier (e.g., "igdb", "openlibrary")
    fn id(&self) -> &str;

    /// Domain this provider serves
    fn domain(&self) -> Domain;

    async fn search(&self, query: &str, filters: &SearchFilters) -> Result<Vec<ContentItem>>;

    async fn trending(&self, limit: usize) -> Result<Vec<ContentItem>>;
}

/// Primary and secondary provider of one domain
#[derive(Clone, Default)]
pub struct ProviderChain {
    pub primary: Option<Arc<dyn ContentProvider>>,
    pub secondary: Option<Arc<dyn ContentProvider>>,
}

/// Providers by domain
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    chains: HashMap<Domain, ProviderChain>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_primary(&mut self, provider: Arc<dyn ContentProvider>) -> &mut Self {
        let domain = provider.domain();
        info!("Registering primary {} provider: {}", domain, provider.id());
        self.chains.entry(domain).or_default().primary = Some(provider);
        self
    }

    pub fn register_secondary(&mut self, provider: Arc<dyn ContentProvider>) -> &mut Self {
        let domain = provider.domain();
        info!("Registering secondary {} provider: {}", domain, provider.id());
        self.chains.entry(domain).or_default().secondary = Some(provider);
        self
    }

    /// Providers to try for `domain`, in order, with the tier each one serves
    pub fn chain(&self, domain: Domain) -> Vec<(Arc<dyn ContentProvider>, ContentSource)> {
        let Some(chain) = self.chains.get(&domain) else {
            return Vec::new();
        };
        chain
            .primary
            .iter()
            .map(|p| (p.clone(), ContentSource::Primary))
            .chain(
                chain
                    .secondary
                    .iter()
                    .map(|p| (p.clone(), ContentSource::Secondary)),
            )
            .collect()
    }

    /// `(domain, provider ids)` for every configured domain
    pub fn summary(&self) -> Vec<(Domain, Vec<String>)> {
        Domain::ALL
            .into_iter()
            .filter_map(|domain| {
                let ids: Vec<String> = self
                    .chain(domain)
                    .iter()
                    .map(|(p, _)| p.id().to_string())
                    .collect();
                (!ids.is_empty()).then_some((domain, ids))
            })
            .collect()
    }
}
