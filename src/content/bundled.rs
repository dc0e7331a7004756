//! Static catalog compiled into the binary, the last fallback tier

use once_cell::sync::Lazy;
use tracing::error;

use crate::models::{ContentItem, Domain, SearchFilters};

static BUNDLED: Lazy<Vec<ContentItem>> = Lazy::new(|| {
    serde_json::from_str(include_str!("bundled.json")).unwrap_or_else(|e| {
        error!("Bundled catalog is unreadable: {}", e);
        Vec::new()
    })
});

/// Bundled items of one domain, in catalog order
pub fn bundled_items(domain: Domain) -> Vec<ContentItem> {
    BUNDLED
        .iter()
        .filter(|item| item.domain == domain)
        .cloned()
        .collect()
}

/// Bundled items whose title or creator contains `query`, narrowed by `filters`
pub fn bundled_search(domain: Domain, query: &str, filters: &SearchFilters) -> Vec<ContentItem> {
    let query = query.trim().to_lowercase();
    let genre = filters.genre.as_ref().map(|g| g.to_lowercase());

    bundled_items(domain)
        .into_iter()
        .filter(|item| {
            query.is_empty()
                || item.title.to_lowercase().contains(&query)
                || item
                    .creator
                    .as_ref()
                    .is_some_and(|c| c.to_lowercase().contains(&query))
        })
        .filter(|item| match &genre {
            Some(genre) => item
                .genre
                .as_ref()
                .is_some_and(|g| g.to_lowercase().contains(genre)),
            None => true,
        })
        .filter(|item| filters.year.map_or(true, |year| item.release_year == Some(year)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_domain_has_bundled_items() {
        for domain in Domain::ALL {
            let items = bundled_items(domain);
            assert!(!items.is_empty(), "no bundled {}", domain);
            assert!(items.iter().all(|i| i.id.domain() == domain));
        }
    }

    #[test]
    fn test_bundled_search() {
        let hits = bundled_search(Domain::Books, "dune", &SearchFilters::default());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].creator.as_deref(), Some("Frank Herbert"));

        let filters = SearchFilters {
            genre: Some("fantasy".to_string()),
            year: Some(2007),
        };
        let hits = bundled_search(Domain::Books, "", &filters);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "The Name of the Wind");
    }
}
