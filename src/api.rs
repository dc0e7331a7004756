//! HTTP API Server
//!
//! REST endpoints over one `CollectionSession`: collection reads and writes,
//! the focus signal, suggestions and content lookups.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::content::ContentResult;
use crate::error::{Error, Result};
use crate::models::{CollectionItem, Domain, ItemId, ItemStatus, SearchFilters};
use crate::recommendation::Suggestions;
use crate::session::CollectionSession;

/// Upper bound on `?limit=` for trending
pub const MAX_TRENDING_LIMIT: usize = 100;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<CollectionSession>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub backend: String,
    pub collection_loaded: bool,
}

/// Current collection
#[derive(Debug, Serialize)]
pub struct CollectionResponse {
    pub items: Vec<CollectionItem>,
    pub count: usize,
    pub loaded: bool,
    pub syncing: bool,
    pub synced_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Body for adding or overwriting an item
#[derive(Debug, Deserialize)]
pub struct ItemRequest {
    /// Required on POST; on PUT it must match the path when present
    pub id: Option<String>,
    pub title: String,
    pub status: Option<ItemStatus>,
    pub rating: Option<u8>,
    pub genre: Option<String>,
    pub creator: Option<String>,
    pub release_year: Option<i32>,
    pub image_url: Option<String>,
}

impl ItemRequest {
    fn into_item(self, id: ItemId, added_at: chrono::DateTime<chrono::Utc>) -> CollectionItem {
        let mut item = CollectionItem::new(id, self.title, added_at);
        if let Some(status) = self.status {
            item.status = status;
        }
        item.rating = self.rating;
        item.genre = self.genre;
        item.creator = self.creator;
        item.release_year = self.release_year;
        item.image_url = self.image_url;
        item
    }
}

/// Query params for trending
#[derive(Debug, Deserialize)]
pub struct TrendingQuery {
    pub limit: Option<usize>,
    /// Skip the cache and refetch
    #[serde(default)]
    pub refresh: bool,
}

/// Query params for search
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub genre: Option<String>,
    pub year: Option<i32>,
}

/// Build the router for `state`
pub fn router(state: AppState, config: &ApiConfig) -> Router {
    let app = Router::new()
        // Health check
        .route("/health", get(health_check))
        // Collection
        .route("/api/v1/collection", get(get_collection))
        .route("/api/v1/collection/items", post(add_item))
        .route(
            "/api/v1/collection/items/:id",
            put(update_item).delete(remove_item),
        )
        // Sync signals
        .route("/api/v1/session/focus", post(focus_regained))
        // Recommendations and content
        .route("/api/v1/suggestions", get(get_suggestions))
        .route("/api/v1/content/:domain/trending", get(get_trending))
        .route("/api/v1/content/:domain/search", get(search_content))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(config.request_timeout))
        .with_state(state);

    if config.cors_enabled {
        app.layer(cors_layer(&config.cors_origins))
    } else {
        app
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin: {}", o);
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Start the API server and serve until `shutdown` resolves
pub async fn start_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = router(state, config);

    let addr = format!("{}:{}", config.host, config.port);
    info!("🚀 Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.session.backend().to_string(),
        collection_loaded: state.session.collection().is_loaded(),
    })
}

async fn get_collection(State(state): State<AppState>) -> Json<CollectionResponse> {
    let snapshot = state.session.collection().snapshot();
    Json(CollectionResponse {
        items: snapshot.collection.items().to_vec(),
        count: snapshot.collection.len(),
        loaded: snapshot.synced_at.is_some(),
        syncing: state.session.monitor().is_syncing(),
        synced_at: snapshot.synced_at,
    })
}

async fn add_item(
    State(state): State<AppState>,
    Json(mut req): Json<ItemRequest>,
) -> Result<(StatusCode, Json<CollectionItem>)> {
    let raw = req
        .id
        .take()
        .ok_or_else(|| Error::bad_request("Missing item id"))?;
    let id = ItemId::parse(&raw)?;
    let item = req.into_item(id, chrono::Utc::now());

    let added = state.session.writer().add(item).await?;
    Ok((StatusCode::CREATED, Json(added)))
}

async fn update_item(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Json(mut req): Json<ItemRequest>,
) -> Result<Json<CollectionItem>> {
    let id = ItemId::parse(&raw_id)?;
    if let Some(body_id) = req.id.take() {
        if body_id != id.as_str() {
            return Err(Error::bad_request(format!(
                "Body id {} does not match path id {}",
                body_id, id
            )));
        }
    }

    // Overwrites keep the original added_at when the item is known
    let added_at = state
        .session
        .current()
        .get(&id)
        .map(|existing| existing.added_at)
        .unwrap_or_else(chrono::Utc::now);
    let item = req.into_item(id, added_at);

    let updated = state.session.writer().update(item).await?;
    Ok(Json(updated))
}

async fn remove_item(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode> {
    let id = ItemId::parse(&raw_id)?;
    state.session.writer().remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn focus_regained(State(state): State<AppState>) -> StatusCode {
    state.session.focus_regained();
    StatusCode::ACCEPTED
}

async fn get_suggestions(State(state): State<AppState>) -> Json<Suggestions> {
    Json(state.session.suggestions().await)
}

async fn get_trending(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Query(query): Query<TrendingQuery>,
) -> Result<Json<ContentResult>> {
    let domain: Domain = domain.parse()?;
    let content = state.session.content();
    let limit = query
        .limit
        .unwrap_or(content.trending_limit())
        .clamp(1, MAX_TRENDING_LIMIT);

    let result = if query.refresh {
        content.refresh_trending(domain, limit).await
    } else {
        content.trending(domain, limit).await
    };
    Ok(Json(result))
}

async fn search_content(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ContentResult>> {
    let domain: Domain = domain.parse()?;
    if query.q.trim().is_empty() {
        return Err(Error::bad_request("Missing search query"));
    }
    let filters = SearchFilters {
        genre: query.genre,
        year: query.year,
    };

    Ok(Json(
        state.session.content().search(domain, &query.q, &filters).await,
    ))
}
