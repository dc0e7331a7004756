//! Recommendation Module
//!
//! Suggests items the user has not tracked yet, reasoned from their own collection.
//!
//! ## Architecture
//!
//! 1. **Profile** - frequency-ranked genres and creators, dominant domain, favorites
//! 2. **Engine** - pulls candidate pools and keeps the ones matching the profile
//! 3. **Metrics** - per-request counters and a slow-operation timer
//!
//! ## Matching
//!
//! A candidate matches when its genre field contains the top genre
//! (case-insensitive substring, not tag equality) or its creator is one of
//! the top creators. Owned items never match. Results keep pool order.

pub mod engine;
pub mod metrics;
pub mod profile;

pub use engine::{CandidateSource, RecommendationEngine, SuggestionReason, Suggestions};
pub use metrics::PerformanceTimer;
pub use profile::{PreferenceProfile, RankedValue};
