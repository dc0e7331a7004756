//! Recommendation Engine
//!
//! Turns a collection plus candidate pools into a short suggestion list:
//!
//! 1. Below the minimum collection size, answer "insufficient data".
//! 2. Build a `PreferenceProfile` from the collection.
//! 3. Pull candidate pools, dominant domain first.
//! 4. Keep unowned candidates whose genre field contains the top genre, or
//!    whose creator is a top creator, in pool order, up to the limit.
//!
//! The engine never fails: a pool error yields an empty list with a generic
//! reasoning string.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::metrics::{PerformanceTimer, SuggestionMetrics};
use super::profile::PreferenceProfile;
use crate::config::RecommendationConfig;
use crate::error::Result;
use crate::models::{Collection, ContentItem, Domain};

const SLOW_SUGGESTIONS_MS: u64 = 500;

/// Reasoning used when nothing more specific applies
pub const GENERIC_REASONING: &str = "Popular picks you haven't added yet";

/// Where candidate pools come from (cache and providers, never the collection)
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn candidate_pool(&self, domain: Domain) -> Result<Vec<ContentItem>>;
}

/// Why these suggestions were made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionReason {
    /// A top creator exists in the collection
    Creator,
    /// A top genre exists but no creator
    Genre,
    /// No usable preference, or the pools could not be fetched
    Generic,
    /// Collection smaller than the minimum size
    InsufficientData,
}

/// Result of `get_suggestions`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestions {
    pub items: Vec<ContentItem>,
    pub reasoning: String,
    pub sufficient_data: bool,
    pub reason: SuggestionReason,
}

impl Suggestions {
    fn insufficient(missing: usize) -> Self {
        Self {
            items: Vec::new(),
            reasoning: format!(
                "Add {} more item{} to your collection to get suggestions",
                missing,
                if missing == 1 { "" } else { "s" }
            ),
            sufficient_data: false,
            reason: SuggestionReason::InsufficientData,
        }
    }

    fn generic(items: Vec<ContentItem>) -> Self {
        Self {
            items,
            reasoning: GENERIC_REASONING.to_string(),
            sufficient_data: true,
            reason: SuggestionReason::Generic,
        }
    }
}

/// Main recommendation engine
#[derive(Clone)]
pub struct RecommendationEngine {
    source: Arc<dyn CandidateSource>,
    config: RecommendationConfig,
}

impl RecommendationEngine {
    pub fn new(source: Arc<dyn CandidateSource>, config: RecommendationConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &RecommendationConfig {
        &self.config
    }

    /// Profile the engine would use for `collection`
    pub fn profile(&self, collection: &Collection) -> PreferenceProfile {
        PreferenceProfile::build(collection, &self.config)
    }

    /// Suggestions for `collection`; deterministic for a fixed collection and pools
    #[instrument(skip_all, fields(collection_size = collection.len()))]
    pub async fn get_suggestions(&self, collection: &Collection) -> Suggestions {
        let timer = PerformanceTimer::new("get_suggestions");
        let (suggestions, mut metrics) = self.run(collection).await;

        metrics.suggestions_returned = suggestions.items.len();
        metrics.total_duration_ms = timer.elapsed_ms();
        for issue in metrics.detect_issues() {
            warn!("Suggestion quality: {}", issue);
        }
        timer.log_if_slow(SLOW_SUGGESTIONS_MS);
        debug!(
            ?metrics,
            creator_share = metrics.creator_share(),
            "Suggestions ready"
        );

        suggestions
    }

    async fn run(&self, collection: &Collection) -> (Suggestions, SuggestionMetrics) {
        let mut metrics = SuggestionMetrics {
            collection_size: collection.len(),
            ..Default::default()
        };

        if collection.len() < self.config.min_collection_size {
            debug!("Collection below {} items", self.config.min_collection_size);
            let missing = self.config.min_collection_size - collection.len();
            return (Suggestions::insufficient(missing), metrics);
        }

        let profile = self.profile(collection);

        let mut pools: Vec<Vec<ContentItem>> = Vec::new();
        for domain in pool_order(&profile, collection) {
            metrics.pools_requested += 1;
            match self.source.candidate_pool(domain).await {
                Ok(pool) => pools.push(pool),
                Err(e) => {
                    metrics.pools_failed += 1;
                    warn!("Candidate pool for {} unavailable: {}", domain, e);
                    return (Suggestions::generic(Vec::new()), metrics);
                }
            }
        }

        let items = self.select(&profile, collection, pools, &mut metrics);

        let suggestions = match (profile.top_creator(), profile.top_genre()) {
            (Some(creator), _) => Suggestions {
                items,
                reasoning: format!("Because you loved {}", creator),
                sufficient_data: true,
                reason: SuggestionReason::Creator,
            },
            (None, Some(genre)) => Suggestions {
                items,
                reasoning: format!("Because you love {}", genre),
                sufficient_data: true,
                reason: SuggestionReason::Genre,
            },
            (None, None) => Suggestions::generic(items),
        };
        (suggestions, metrics)
    }

    /// Matching, unowned candidates in pool order
    fn select(
        &self,
        profile: &PreferenceProfile,
        collection: &Collection,
        pools: Vec<Vec<ContentItem>>,
        metrics: &mut SuggestionMetrics,
    ) -> Vec<ContentItem> {
        let owned = collection.ids();
        let top_genre = profile.top_genre().map(str::to_lowercase);
        let top_creators: Vec<String> = profile
            .top_creators
            .iter()
            .map(|c| c.value.to_lowercase())
            .collect();

        let mut seen = HashSet::new();
        let mut selected = Vec::new();

        for candidate in pools.into_iter().flatten() {
            if selected.len() >= self.config.max_suggestions {
                break;
            }
            if !seen.insert(candidate.id.clone()) {
                continue;
            }
            metrics.candidates_considered += 1;
            if owned.contains(&candidate.id) {
                metrics.owned_skipped += 1;
                continue;
            }

            let genre_match = match (&top_genre, &candidate.genre) {
                (Some(top), Some(genre)) => genre.to_lowercase().contains(top.as_str()),
                _ => false,
            };
            let creator_match = candidate
                .creator
                .as_deref()
                .map(|c| top_creators.contains(&c.trim().to_lowercase()))
                .unwrap_or(false);

            if genre_match {
                metrics.genre_matches += 1;
            }
            if creator_match {
                metrics.creator_matches += 1;
            }
            if genre_match || creator_match {
                selected.push(candidate);
            }
        }

        selected
    }
}

/// Dominant domain first, then every other domain present, in domain order
fn pool_order(profile: &PreferenceProfile, collection: &Collection) -> Vec<Domain> {
    let mut order: Vec<Domain> = profile.dominant_domain.into_iter().collect();
    order.extend(
        collection
            .domains()
            .into_iter()
            .filter(|d| Some(*d) != profile.dominant_domain),
    );
    order
}
