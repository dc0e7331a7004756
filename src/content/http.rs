//! Generic HTTP catalog provider
//!
//! Talks to a catalog gateway that already normalizes third-party APIs:
//!
//! - `GET {base}/{domain}/trending?limit=N`
//! - `GET {base}/{domain}/search?q=...&genre=...&year=...`
//!
//! Both answer `{"items": [ContentItem, ...]}`. Items that fail to parse or
//! belong to another domain are skipped.

use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::ContentProvider;
use crate::error::{Error, Result};
use crate::models::{ContentItem, Domain, SearchFilters};
use crate::recommendation::metrics::PerformanceTimer;

/// Retry-After used when a 429 carries none
const DEFAULT_RETRY_AFTER_MS: u64 = 1_000;

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

/// `ContentProvider` over a normalized JSON gateway
#[derive(Debug, Clone)]
pub struct HttpCatalogProvider {
    id: String,
    base_url: String,
    domain: Domain,
    client: Client,
}

impl HttpCatalogProvider {
    pub fn new(
        id: impl Into<String>,
        base_url: impl Into<String>,
        domain: Domain,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("shelfsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            id: id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            domain,
            client,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.domain, endpoint)
    }

    async fn read_items(&self, response: Response) -> Result<Vec<ContentItem>> {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1_000))
                .unwrap_or(DEFAULT_RETRY_AFTER_MS);
            warn!(provider = %self.id, retry_after_ms, "Provider rate limited");
            return Err(Error::RateLimited { retry_after_ms });
        }
        if !status.is_success() {
            return Err(Error::provider(
                self.id.clone(),
                format!("HTTP {}", status),
            ));
        }

        let body: CatalogResponse = response.json().await.map_err(|e| {
            Error::provider(self.id.clone(), format!("Malformed response: {}", e))
        })?;

        let total = body.items.len();
        let items: Vec<ContentItem> = body
            .items
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<ContentItem>(raw) {
                Ok(item) if item.domain == self.domain && item.id.domain() == self.domain => {
                    Some(item)
                }
                Ok(item) => {
                    debug!("Skipping {} item {} from {} provider", item.domain, item.id, self.domain);
                    None
                }
                Err(e) => {
                    debug!("Skipping malformed item: {}", e);
                    None
                }
            })
            .collect();

        if items.len() < total {
            warn!(
                provider = %self.id,
                "Dropped {} of {} items while normalizing",
                total - items.len(),
                total
            );
        }
        Ok(items)
    }
}

#[async_trait]
impl ContentProvider for HttpCatalogProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn domain(&self) -> Domain {
        self.domain
    }

    #[instrument(skip(self, filters), fields(provider = %self.id, domain = %self.domain))]
    async fn search(&self, query: &str, filters: &SearchFilters) -> Result<Vec<ContentItem>> {
        let _timer = PerformanceTimer::new("provider_search");
        let mut params: Vec<(&str, String)> = vec![("q", query.to_string())];
        if let Some(genre) = &filters.genre {
            params.push(("genre", genre.clone()));
        }
        if let Some(year) = filters.year {
            params.push(("year", year.to_string()));
        }

        let response = self
            .client
            .get(self.url("search"))
            .query(&params)
            .send()
            .await?;
        self.read_items(response).await
    }

    #[instrument(skip(self), fields(provider = %self.id, domain = %self.domain))]
    async fn trending(&self, limit: usize) -> Result<Vec<ContentItem>> {
        let _timer = PerformanceTimer::new("provider_trending");
        let response = self
            .client
            .get(self.url("trending"))
            .query(&[("limit", limit.to_string())])
            .send()
            .await?;
        let mut items = self.read_items(response).await?;
        items.truncate(limit);
        Ok(items)
    }
}
