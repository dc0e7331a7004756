use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shelfsync::content::{ContentProvider, HttpCatalogProvider};
use shelfsync::error::Error;
use shelfsync::models::{Domain, SearchFilters};

fn provider(server: &MockServer, domain: Domain) -> HttpCatalogProvider {
    HttpCatalogProvider::new("mock", server.uri(), domain, Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_trending_normalizes_and_truncates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/books/trending"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "book:1", "domain": "books", "title": "Dune", "creator": "Frank Herbert"},
                {"id": "movie:2", "domain": "movies", "title": "Wrong domain"},
                {"title": "No id"},
                {"id": "book:3", "domain": "books", "title": "Hyperion", "genre": "Science Fiction"},
                {"id": "book:4", "domain": "books", "title": "Over the limit"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items = provider(&server, Domain::Books).trending(2).await.unwrap();

    let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["Dune", "Hyperion"]);
    assert_eq!(items[0].creator.as_deref(), Some("Frank Herbert"));
}

#[tokio::test]
async fn test_search_sends_filters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/games/search"))
        .and(query_param("q", "zelda"))
        .and(query_param("genre", "Adventure"))
        .and(query_param("year", "2017"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "game:botw", "domain": "games", "title": "Breath of the Wild"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let filters = SearchFilters {
        genre: Some("Adventure".to_string()),
        year: Some(2017),
    };
    let items = provider(&server, Domain::Games)
        .search("zelda", &filters)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn test_rate_limit_maps_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/music/trending"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let err = provider(&server, Domain::Music).trending(5).await.unwrap_err();
    match err {
        Error::RateLimited { retry_after_ms } => assert_eq!(retry_after_ms, 7_000),
        other => panic!("expected rate limit, got {:?}", other),
    }
    assert!(!Error::RateLimited { retry_after_ms: 1 }.is_retryable());
}

#[tokio::test]
async fn test_rate_limit_without_header_uses_default() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = provider(&server, Domain::Movies).trending(5).await.unwrap_err();
    assert!(matches!(err, Error::RateLimited { retry_after_ms: 1_000 }));
}

#[tokio::test]
async fn test_oversized_retry_after_saturates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "18446744073709552"))
        .mount(&server)
        .await;

    let err = provider(&server, Domain::Games).trending(5).await.unwrap_err();
    assert!(matches!(err, Error::RateLimited { retry_after_ms: u64::MAX }));
}

#[tokio::test]
async fn test_server_error_is_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = provider(&server, Domain::Boardgames)
        .search("catan", &SearchFilters::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Provider { .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_malformed_body_is_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = provider(&server, Domain::Games).trending(5).await.unwrap_err();
    assert!(matches!(err, Error::Provider { .. }));
}
