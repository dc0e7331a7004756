//! Suggestion metrics and performance monitoring
//!
//! Per-request counters for suggestion quality plus a timer shared by the
//! slower I/O paths (store fetches, provider calls).

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Metrics for a single suggestion request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestionMetrics {
    pub collection_size: usize,
    pub pools_requested: usize,
    pub pools_failed: usize,
    pub candidates_considered: usize,
    pub owned_skipped: usize,
    pub genre_matches: usize,
    pub creator_matches: usize,
    pub suggestions_returned: usize,
    pub total_duration_ms: u64,
}

impl SuggestionMetrics {
    /// Share of returned suggestions backed by a creator match
    pub fn creator_share(&self) -> f32 {
        if self.suggestions_returned == 0 {
            return 0.0;
        }
        self.creator_matches.min(self.suggestions_returned) as f32
            / self.suggestions_returned as f32
    }

    /// Detect potential issues with a suggestion run
    pub fn detect_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.pools_failed > 0 {
            issues.push(format!(
                "Candidate pool failed ({} of {} requested)",
                self.pools_failed, self.pools_requested
            ));
        }

        if self.candidates_considered > 0 && self.owned_skipped == self.candidates_considered {
            issues.push("Every candidate is already owned".to_string());
        }

        if self.total_duration_ms > 2_000 {
            issues.push(format!("Slow response: {}ms", self.total_duration_ms));
        }

        issues
    }
}

/// Performance timer for tracking operation duration
pub struct PerformanceTimer {
    start: Instant,
    label: String,
}

impl PerformanceTimer {
    pub fn new(label: &str) -> Self {
        Self {
            start: Instant::now(),
            label: label.to_string(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn log_if_slow(&self, threshold_ms: u64) {
        let elapsed = self.elapsed_ms();
        if elapsed > threshold_ms {
            tracing::warn!(
                "⚠️ Slow operation: {} took {}ms (threshold: {}ms)",
                self.label,
                elapsed,
                threshold_ms
            );
        }
    }
}

impl Drop for PerformanceTimer {
    fn drop(&mut self) {
        let elapsed = self.elapsed_ms();
        tracing::debug!("⏱️ {} completed in {}ms", self.label, elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creator_share() {
        let metrics = SuggestionMetrics {
            creator_matches: 1,
            suggestions_returned: 4,
            ..Default::default()
        };
        assert!((metrics.creator_share() - 0.25).abs() < f32::EPSILON);
        assert_eq!(SuggestionMetrics::default().creator_share(), 0.0);
    }

    #[test]
    fn test_detect_issues() {
        let metrics = SuggestionMetrics {
            pools_requested: 2,
            pools_failed: 2,
            candidates_considered: 3,
            owned_skipped: 3,
            total_duration_ms: 2_500,
            ..Default::default()
        };

        let issues = metrics.detect_issues();
        assert!(issues.iter().any(|i| i.contains("pool failed")));
        assert!(issues.iter().any(|i| i.contains("already owned")));
        assert!(issues.iter().any(|i| i.contains("Slow response")));
        assert!(SuggestionMetrics::default().detect_issues().is_empty());
    }
}
