mod support;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use shelfsync::config::RecommendationConfig;
use shelfsync::error::{Error, Result};
use shelfsync::models::{Collection, CollectionItem, ContentItem, Domain, ItemId};
use shelfsync::recommendation::engine::GENERIC_REASONING;
use shelfsync::recommendation::{CandidateSource, RecommendationEngine, SuggestionReason};

use support::item;

/// Fixed candidate pools per domain
#[derive(Default)]
struct StaticPools {
    pools: HashMap<Domain, Vec<ContentItem>>,
    failing: bool,
}

impl StaticPools {
    fn with(mut self, domain: Domain, items: Vec<ContentItem>) -> Self {
        self.pools.insert(domain, items);
        self
    }
}

#[async_trait]
impl CandidateSource for StaticPools {
    async fn candidate_pool(&self, domain: Domain) -> Result<Vec<ContentItem>> {
        if self.failing {
            return Err(Error::provider("static", "upstream unavailable"));
        }
        Ok(self.pools.get(&domain).cloned().unwrap_or_default())
    }
}

fn engine(source: StaticPools) -> RecommendationEngine {
    RecommendationEngine::new(Arc::new(source), RecommendationConfig::default())
}

fn candidate(ext: &str, genre: &str) -> ContentItem {
    ContentItem::new(ItemId::new(Domain::Games, ext), ext).with_genre(genre)
}

/// `n` games, all RPGs
fn rpg_collection(n: usize) -> Collection {
    (0..n)
        .map(|i| item(Domain::Games, &format!("owned-{}", i), "Owned").with_genre("RPG"))
        .collect()
}

#[tokio::test]
async fn test_nine_items_is_insufficient() {
    let source = StaticPools::default().with(Domain::Games, vec![candidate("new", "RPG")]);
    let suggestions = engine(source).get_suggestions(&rpg_collection(9)).await;

    assert!(!suggestions.sufficient_data);
    assert!(suggestions.items.is_empty());
    assert_eq!(suggestions.reason, SuggestionReason::InsufficientData);
    assert!(suggestions.reasoning.contains("1 more item"));
}

#[tokio::test]
async fn test_ten_items_is_sufficient() {
    let source = StaticPools::default().with(Domain::Games, vec![candidate("new", "RPG")]);
    let suggestions = engine(source).get_suggestions(&rpg_collection(10)).await;

    assert!(suggestions.sufficient_data);
    assert_eq!(suggestions.items.len(), 1);
    assert_eq!(suggestions.reason, SuggestionReason::Genre);
    assert_eq!(suggestions.reasoning, "Because you love RPG");
}

#[tokio::test]
async fn test_owned_items_never_suggested() {
    let source = StaticPools::default().with(
        Domain::Games,
        vec![
            candidate("owned-3", "RPG"),
            candidate("fresh", "RPG"),
            candidate("owned-7", "RPG"),
        ],
    );
    let suggestions = engine(source).get_suggestions(&rpg_collection(10)).await;

    let ids: Vec<&str> = suggestions.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["game:fresh"]);
}

#[tokio::test]
async fn test_creator_scenario_mentions_creator_and_includes_item() {
    let mut items: Vec<CollectionItem> = Vec::new();
    for i in 0..5 {
        items.push(item(Domain::Games, &format!("rpg-{}", i), "Quest").with_genre("RPG"));
    }
    for i in 0..2 {
        items.push(
            item(Domain::Games, &format!("sx-{}", i), "Studio X classic")
                .with_genre("Puzzle")
                .with_creator("Studio X")
                .with_rating(5),
        );
    }
    for i in 0..5 {
        items.push(
            item(Domain::Games, &format!("misc-{}", i), "Misc")
                .with_creator(format!("Indie {}", i)),
        );
    }
    let collection: Collection = items.into_iter().collect();
    assert_eq!(collection.len(), 12);

    let studio_x_item = ContentItem::new(ItemId::new(Domain::Games, "sx-new"), "Studio X sequel")
        .with_genre("Puzzle")
        .with_creator("Studio X");
    let source = StaticPools::default().with(
        Domain::Games,
        vec![
            candidate("rpg-a", "RPG"),
            candidate("rpg-b", "Action RPG"),
            candidate("rpg-c", "rpg"),
            studio_x_item.clone(),
        ],
    );

    let suggestions = engine(source).get_suggestions(&collection).await;

    assert!(suggestions.sufficient_data);
    assert_eq!(suggestions.reason, SuggestionReason::Creator);
    assert!(suggestions.reasoning.contains("Studio X"));
    assert!(suggestions.items.contains(&studio_x_item));
    assert_eq!(suggestions.items.len(), 4);
}

#[tokio::test]
async fn test_matches_keep_pool_order_and_are_capped() {
    let pool: Vec<ContentItem> = (0..10)
        .map(|i| candidate(&format!("c{}", i), "Tactical RPG"))
        .collect();
    let source = StaticPools::default().with(Domain::Games, pool);
    let suggestions = engine(source).get_suggestions(&rpg_collection(10)).await;

    let ids: Vec<&str> = suggestions.items.iter().map(|i| i.id.external_id()).collect();
    assert_eq!(ids, vec!["c0", "c1", "c2", "c3", "c4", "c5"]);
}

#[tokio::test]
async fn test_non_matching_candidates_are_left_out() {
    let source = StaticPools::default().with(
        Domain::Games,
        vec![candidate("shooter", "FPS"), candidate("jrpg", "JRPG")],
    );
    let suggestions = engine(source).get_suggestions(&rpg_collection(10)).await;

    // substring policy: "JRPG" contains "rpg"
    let ids: Vec<&str> = suggestions.items.iter().map(|i| i.id.external_id()).collect();
    assert_eq!(ids, vec!["jrpg"]);
}

#[tokio::test]
async fn test_pool_failure_yields_empty_generic_result() {
    let source = StaticPools {
        failing: true,
        ..Default::default()
    };
    let suggestions = engine(source).get_suggestions(&rpg_collection(12)).await;

    assert!(suggestions.items.is_empty());
    assert!(suggestions.sufficient_data);
    assert_eq!(suggestions.reason, SuggestionReason::Generic);
    assert_eq!(suggestions.reasoning, GENERIC_REASONING);
}

#[tokio::test]
async fn test_same_inputs_same_output() {
    let source = StaticPools::default().with(
        Domain::Games,
        vec![candidate("a", "RPG"), candidate("b", "RPG")],
    );
    let engine = engine(source);
    let collection = rpg_collection(11);

    let first = engine.get_suggestions(&collection).await;
    let second = engine.get_suggestions(&collection).await;
    assert_eq!(first, second);
}
