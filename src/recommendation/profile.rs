//! Preference profile
//!
//! Derived from the collection on every request and never stored. Counting
//! is case-insensitive; each value keeps the spelling it was first seen with.

use serde::Serialize;
use std::collections::HashMap;

use crate::config::RecommendationConfig;
use crate::models::{Collection, CollectionItem, Domain};

/// Separators accepted inside a free-text genre field
const GENRE_SEPARATORS: &[char] = &[',', '/'];

/// A value and how many items carry it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedValue {
    pub value: String,
    pub count: usize,
}

/// What the collection says about the user's taste
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferenceProfile {
    pub top_genres: Vec<RankedValue>,
    pub top_creators: Vec<RankedValue>,
    pub dominant_domain: Option<Domain>,
    pub average_release_year: Option<i32>,
    /// Highly rated exemplars, best first
    pub favorites: Vec<CollectionItem>,
    pub item_count: usize,
}

impl PreferenceProfile {
    pub fn build(collection: &Collection, config: &RecommendationConfig) -> Self {
        let mut genres = Tally::default();
        let mut creators = Tally::default();

        for item in collection.iter() {
            if let Some(genre) = &item.genre {
                let mut seen_in_item: Vec<String> = Vec::new();
                for token in genre_tokens(genre) {
                    let key = token.to_lowercase();
                    if !seen_in_item.contains(&key) {
                        genres.add(token);
                        seen_in_item.push(key);
                    }
                }
            }
            if let Some(creator) = item.creator.as_deref().map(str::trim) {
                if !creator.is_empty() {
                    creators.add(creator);
                }
            }
        }

        Self {
            top_genres: genres.top(config.top_genres),
            top_creators: creators.top(config.top_creators),
            dominant_domain: dominant_domain(collection),
            average_release_year: average_release_year(collection),
            favorites: favorites(collection, config),
            item_count: collection.len(),
        }
    }

    pub fn top_genre(&self) -> Option<&str> {
        self.top_genres.first().map(|g| g.value.as_str())
    }

    pub fn top_creator(&self) -> Option<&str> {
        self.top_creators.first().map(|c| c.value.as_str())
    }
}

/// Individual genres in a free-text genre field
pub(crate) fn genre_tokens(genre: &str) -> impl Iterator<Item = &str> {
    genre
        .split(GENRE_SEPARATORS)
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Case-insensitive frequency count
#[derive(Default)]
struct Tally {
    index: HashMap<String, usize>,
    entries: Vec<RankedValue>,
}

impl Tally {
    fn add(&mut self, value: &str) {
        let key = value.to_lowercase();
        match self.index.get(&key) {
            Some(&i) => self.entries[i].count += 1,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(RankedValue {
                    value: value.to_string(),
                    count: 1,
                });
            }
        }
    }

    /// Most frequent first; ties by name
    fn top(mut self, limit: usize) -> Vec<RankedValue> {
        self.entries.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.value.to_lowercase().cmp(&b.value.to_lowercase()))
        });
        self.entries.truncate(limit);
        self.entries
    }
}

fn dominant_domain(collection: &Collection) -> Option<Domain> {
    let mut best: Option<(Domain, usize)> = None;
    for domain in Domain::ALL {
        let count = collection.iter().filter(|item| item.domain == domain).count();
        if count > 0 && best.map_or(true, |(_, top)| count > top) {
            best = Some((domain, count));
        }
    }
    best.map(|(domain, _)| domain)
}

fn average_release_year(collection: &Collection) -> Option<i32> {
    let years: Vec<i32> = collection.iter().filter_map(|item| item.release_year).collect();
    if years.is_empty() {
        return None;
    }
    let sum: i64 = years.iter().map(|&y| i64::from(y)).sum();
    Some((sum as f64 / years.len() as f64).round() as i32)
}

fn favorites(collection: &Collection, config: &RecommendationConfig) -> Vec<CollectionItem> {
    let mut rated: Vec<&CollectionItem> = collection
        .iter()
        .filter(|item| item.rating.is_some_and(|r| r >= config.exemplar_min_rating))
        .collect();
    // stable: equal ratings keep collection order
    rated.sort_by(|a, b| b.rating.cmp(&a.rating));
    rated
        .into_iter()
        .take(config.max_exemplars)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemId;
    use chrono::Utc;

    fn item(domain: Domain, ext: &str) -> CollectionItem {
        CollectionItem::new(ItemId::new(domain, ext), ext, Utc::now())
    }

    #[test]
    fn test_genres_split_and_counted_case_insensitively() {
        let collection: Collection = vec![
            item(Domain::Games, "1").with_genre("RPG, Action"),
            item(Domain::Games, "2").with_genre("rpg/Strategy"),
            item(Domain::Games, "3").with_genre("Action"),
            item(Domain::Games, "4").with_genre("RPG, rpg"),
        ]
        .into_iter()
        .collect();

        let profile = PreferenceProfile::build(&collection, &RecommendationConfig::default());
        assert_eq!(
            profile.top_genres,
            vec![
                RankedValue { value: "RPG".to_string(), count: 3 },
                RankedValue { value: "Action".to_string(), count: 2 },
                RankedValue { value: "Strategy".to_string(), count: 1 },
            ]
        );
    }

    #[test]
    fn test_creator_ties_rank_by_name() {
        let collection: Collection = vec![
            item(Domain::Books, "1").with_creator("Ursula K. Le Guin"),
            item(Domain::Books, "2").with_creator("Frank Herbert"),
            item(Domain::Books, "3").with_creator("Iain M. Banks"),
        ]
        .into_iter()
        .collect();

        let profile = PreferenceProfile::build(&collection, &RecommendationConfig::default());
        let names: Vec<&str> = profile.top_creators.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(names, vec!["Frank Herbert", "Iain M. Banks"]);
    }

    #[test]
    fn test_dominant_domain_and_average_year() {
        let collection: Collection = vec![
            item(Domain::Movies, "1").with_release_year(1999),
            item(Domain::Games, "2").with_release_year(2020),
            item(Domain::Movies, "3"),
            item(Domain::Games, "4").with_release_year(2002),
        ]
        .into_iter()
        .collect();

        let profile = PreferenceProfile::build(&collection, &RecommendationConfig::default());
        // tie between games and movies resolves to the earlier domain
        assert_eq!(profile.dominant_domain, Some(Domain::Games));
        assert_eq!(profile.average_release_year, Some(2007));
    }

    #[test]
    fn test_favorites_prefer_higher_ratings() {
        let collection: Collection = vec![
            item(Domain::Music, "a").with_rating(4),
            item(Domain::Music, "b").with_rating(5),
            item(Domain::Music, "c").with_rating(3),
            item(Domain::Music, "d").with_rating(4),
            item(Domain::Music, "e").with_rating(4),
        ]
        .into_iter()
        .collect();

        let profile = PreferenceProfile::build(&collection, &RecommendationConfig::default());
        let ids: Vec<&str> = profile.favorites.iter().map(|i| i.id.external_id()).collect();
        assert_eq!(ids, vec!["b", "a", "d"]);
    }

    #[test]
    fn test_empty_collection() {
        let profile = PreferenceProfile::build(&Collection::empty(), &RecommendationConfig::default());
        assert!(profile.top_genre().is_none());
        assert!(profile.dominant_domain.is_none());
        assert!(profile.average_release_year.is_none());
    }
}
