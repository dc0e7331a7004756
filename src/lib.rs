//! Shelfsync library crate
//!
//! Collection sync, content caching and recommendations for one user session.
//! Re-exports the core types for the binary and integration tests.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod content;
pub mod database;
pub mod error;
pub mod events;
pub mod models;
pub mod recommendation;
pub mod session;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use cache::ContentCache;
pub use config::Config;
pub use error::{Error, Result};
pub use models::{Collection, CollectionItem, ContentItem, Domain, ItemId, ItemStatus};
pub use recommendation::{RecommendationEngine, Suggestions};
pub use session::{CollectionSession, SessionParts};
pub use store::{CollectionStore, DurableStore};
pub use sync::{SyncCoordinator, SyncHandle, SyncState};
