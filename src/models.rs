//! Collection and content data model
//!
//! Items are identified by domain-prefixed ids (`game:1942`, `book:OL123W`).
//! The prefix is validated on construction so an id always knows its domain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// ============================================================================
// Domain
// ============================================================================

/// Content domain an item belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Games,
    Movies,
    Books,
    Music,
    Boardgames,
}

impl Domain {
    /// All domains in their canonical order
    pub const ALL: [Domain; 5] = [
        Domain::Games,
        Domain::Movies,
        Domain::Books,
        Domain::Music,
        Domain::Boardgames,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Games => "games",
            Domain::Movies => "movies",
            Domain::Books => "books",
            Domain::Music => "music",
            Domain::Boardgames => "boardgames",
        }
    }

    /// Prefix used in item ids for this domain
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Domain::Games => "game",
            Domain::Movies => "movie",
            Domain::Books => "book",
            Domain::Music => "music",
            Domain::Boardgames => "boardgame",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Domain::ALL.into_iter().find(|d| d.id_prefix() == prefix)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_lowercase();
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str() == lowered || d.id_prefix() == lowered)
            .ok_or_else(|| {
                Error::invalid_format(format!(
                    "Invalid domain: '{}'. Valid: games, movies, books, music, boardgames",
                    s
                ))
            })
    }
}

// ============================================================================
// Item identifiers
// ============================================================================

/// Opaque, domain-prefixed item id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId {
    raw: String,
    domain: Domain,
}

impl ItemId {
    /// Build an id from a domain and the provider's own identifier
    pub fn new(domain: Domain, external_id: &str) -> Self {
        Self {
            raw: format!("{}:{}", domain.id_prefix(), external_id),
            domain,
        }
    }

    /// Parse a `<prefix>:<external id>` string
    pub fn parse(raw: &str) -> Result<Self> {
        let (prefix, external) = raw
            .split_once(':')
            .ok_or_else(|| Error::invalid_format(format!("Item id '{}' has no domain prefix", raw)))?;
        let domain = Domain::from_prefix(prefix).ok_or_else(|| {
            Error::invalid_format(format!("Item id '{}' has unknown prefix '{}'", raw, prefix))
        })?;
        if external.trim().is_empty() {
            return Err(Error::invalid_format(format!(
                "Item id '{}' has an empty external id",
                raw
            )));
        }
        Ok(Self {
            raw: raw.to_string(),
            domain,
        })
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The provider-side part of the id (after the prefix)
    pub fn external_id(&self) -> &str {
        self.raw
            .split_once(':')
            .map(|(_, external)| external)
            .unwrap_or_default()
    }
}

impl TryFrom<String> for ItemId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        ItemId::parse(&value)
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.raw
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// ============================================================================
// Status
// ============================================================================

/// Tracking status of an item.
///
/// There is no transition graph: any status may overwrite any other.
/// Unknown strings are kept verbatim so clients can use their own vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemStatus {
    Wishlist,
    Backlog,
    InProgress,
    Completed,
    Paused,
    Dropped,
    Custom(String),
}

impl ItemStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ItemStatus::Wishlist => "wishlist",
            ItemStatus::Backlog => "backlog",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Completed => "completed",
            ItemStatus::Paused => "paused",
            ItemStatus::Dropped => "dropped",
            ItemStatus::Custom(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "wishlist" => ItemStatus::Wishlist,
            "backlog" => ItemStatus::Backlog,
            "in_progress" => ItemStatus::InProgress,
            "completed" => ItemStatus::Completed,
            "paused" => ItemStatus::Paused,
            "dropped" => ItemStatus::Dropped,
            _ => ItemStatus::Custom(s.trim().to_string()),
        }
    }
}

impl From<String> for ItemStatus {
    fn from(value: String) -> Self {
        ItemStatus::parse(&value)
    }
}

impl From<ItemStatus> for String {
    fn from(status: ItemStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Collection items
// ============================================================================

/// Lowest and highest accepted rating
pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// One tracked item in a user's collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionItem {
    pub id: ItemId,
    pub domain: Domain,
    pub title: String,
    pub status: ItemStatus,
    #[serde(default)]
    pub rating: Option<u8>,
    /// Free-text genre field, may hold several genres ("Action, RPG")
    #[serde(default)]
    pub genre: Option<String>,
    /// Author, artist, director or studio
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub release_year: Option<i32>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub added_at: DateTime<Utc>,
    /// Last-writer-wins timestamp
    pub updated_at: DateTime<Utc>,
}

impl CollectionItem {
    /// New backlog item added at `now`
    pub fn new(id: ItemId, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            domain: id.domain(),
            id,
            title: title.into(),
            status: ItemStatus::Backlog,
            rating: None,
            genre: None,
            creator: None,
            release_year: None,
            image_url: None,
            added_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    pub fn with_release_year(mut self, year: i32) -> Self {
        self.release_year = Some(year);
        self
    }

    /// Check the invariants the durable store relies on
    pub fn validate(&self) -> Result<()> {
        if self.id.domain() != self.domain {
            return Err(Error::bad_request(format!(
                "Item {} is tagged {} but its id belongs to {}",
                self.id,
                self.domain,
                self.id.domain()
            )));
        }
        if self.title.trim().is_empty() {
            return Err(Error::bad_request(format!("Item {} has an empty title", self.id)));
        }
        if let Some(rating) = self.rating {
            if !(MIN_RATING..=MAX_RATING).contains(&rating) {
                return Err(Error::bad_request(format!(
                    "Rating {} for {} is outside {}-{}",
                    rating, self.id, MIN_RATING, MAX_RATING
                )));
            }
        }
        Ok(())
    }
}

/// A user's full set of tracked items
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    items: Vec<CollectionItem>,
}

impl Collection {
    pub fn new(items: Vec<CollectionItem>) -> Self {
        Self { items }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[CollectionItem] {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollectionItem> {
        self.items.iter()
    }

    pub fn get(&self, id: &ItemId) -> Option<&CollectionItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.get(id).is_some()
    }

    /// Set of ids for repeated membership checks
    pub fn ids(&self) -> HashSet<&ItemId> {
        self.items.iter().map(|item| &item.id).collect()
    }

    /// Domains present in the collection, in canonical order
    pub fn domains(&self) -> Vec<Domain> {
        Domain::ALL
            .into_iter()
            .filter(|d| self.items.iter().any(|item| item.domain == *d))
            .collect()
    }
}

impl FromIterator<CollectionItem> for Collection {
    fn from_iter<I: IntoIterator<Item = CollectionItem>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// ============================================================================
// Provider content
// ============================================================================

/// Normalized item returned by a content provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ItemId,
    pub domain: Domain,
    pub title: String,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub release_year: Option<i32>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl ContentItem {
    pub fn new(id: ItemId, title: impl Into<String>) -> Self {
        Self {
            domain: id.domain(),
            id,
            title: title.into(),
            genre: None,
            creator: None,
            release_year: None,
            image_url: None,
        }
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    pub fn with_release_year(mut self, year: i32) -> Self {
        self.release_year = Some(year);
        self
    }
}

/// Optional narrowing for provider searches
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.genre.is_none() && self.year.is_none()
    }
}
