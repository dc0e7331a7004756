//! Error types for the Shelfsync engine
//!
//! One error hierarchy for the whole crate:
//! - `thiserror` for ergonomic error definitions
//! - Transient fetch failures are classified so callers can fall back a tier
//!   or keep their last good state instead of surfacing them
//! - Corrupt persisted data has its own variant and is treated as a miss
//! - HTTP status code mapping for API responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::borrow::Cow;
use thiserror::Error;

/// Result type alias for Shelfsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Shelfsync engine
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    #[error("Configuration error: {message}")]
    Config {
        message: Cow<'static, str>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidConfig {
        key: &'static str,
        message: Cow<'static, str>,
    },

    // ========================================================================
    // Storage Errors
    // ========================================================================
    #[error("Database error: {message}")]
    Database {
        message: Cow<'static, str>,
        #[source]
        source: Option<sqlx::Error>,
    },

    #[error("Database connection pool exhausted")]
    PoolExhausted,

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    #[error("Constraint violation: {message}")]
    ConstraintViolation { message: Cow<'static, str> },

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Local store error: {message}")]
    LocalStore { message: Cow<'static, str> },

    // ========================================================================
    // Content Provider Errors
    // ========================================================================
    #[error("Provider {provider} failed: {message}")]
    Provider {
        provider: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("Provider rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    // ========================================================================
    // API Errors
    // ========================================================================
    #[error("Bad request: {message}")]
    BadRequest { message: Cow<'static, str> },

    #[error("Internal server error")]
    Internal {
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // ========================================================================
    // Serialization Errors
    // ========================================================================
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stored entry could not be decoded: {message}")]
    Deserialization { message: Cow<'static, str> },

    #[error("Invalid data format: {message}")]
    InvalidFormat { message: Cow<'static, str> },

    // ========================================================================
    // Generic Errors
    // ========================================================================
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    // ========================================================================
    // Constructors for common error patterns
    // ========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a database error
    pub fn database(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Database {
            message: message.into(),
            source: None,
        }
    }

    /// Create a provider (transient fetch) error
    pub fn provider(
        provider: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a local key-value store error
    pub fn local_store(message: impl Into<Cow<'static, str>>) -> Self {
        Self::LocalStore {
            message: message.into(),
        }
    }

    /// Create a deserialization error for corrupt persisted data
    pub fn deserialization(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Deserialization {
            message: message.into(),
        }
    }

    /// Create an invalid format error
    pub fn invalid_format(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Create a bad request error
    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Create an internal error
    pub fn internal(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal {
            source: Some(Box::new(source)),
        }
    }

    // ========================================================================
    // Error Classification
    // ========================================================================

    /// Returns true for transient fetch failures.
    ///
    /// These are absorbed by falling back a tier or by keeping the last
    /// successfully fetched state; they never reach a consumer as a failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Database { .. }
                | Error::PoolExhausted
                | Error::Provider { .. }
                | Error::RateLimited { .. }
                | Error::Timeout { .. }
        )
    }

    /// Returns true if this error is worth retrying as-is
    pub fn is_retryable(&self) -> bool {
        self.is_transient() && !matches!(self, Error::RateLimited { .. })
    }

    /// Returns true if this error should be logged at error level
    pub fn is_error_level(&self) -> bool {
        matches!(
            self,
            Error::Database { .. } | Error::Internal { .. } | Error::Migration(_)
        )
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } | Error::InvalidFormat { .. } | Error::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::ConstraintViolation { .. } => StatusCode::CONFLICT,
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::PoolExhausted => StatusCode::SERVICE_UNAVAILABLE,
            Error::Provider { .. } => StatusCode::BAD_GATEWAY,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } | Error::InvalidConfig { .. } => "CONFIG_ERROR",
            Error::Database { .. }
            | Error::PoolExhausted
            | Error::ConstraintViolation { .. }
            | Error::Migration(_) => "DATABASE_ERROR",
            Error::LocalStore { .. } => "LOCAL_STORE_ERROR",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Provider { .. } => "PROVIDER_ERROR",
            Error::RateLimited { .. } => "RATE_LIMITED",
            Error::BadRequest { .. } => "BAD_REQUEST",
            Error::Json(_) | Error::InvalidFormat { .. } | Error::Deserialization { .. } => {
                "SERIALIZATION_ERROR"
            }
            Error::Timeout { .. } => "TIMEOUT",
            Error::Internal { .. } | Error::Other(_) => "INTERNAL_ERROR",
        }
    }
}

// ============================================================================
// Error Response for API
// ============================================================================

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        // Don't expose internal error details
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let retry_after = match &self {
            Error::RateLimited { retry_after_ms } => Some(retry_after_ms.div_ceil(1000)),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code,
                message,
                retry_after,
            },
        };

        (status, Json(body)).into_response()
    }
}

// ============================================================================
// From implementations for external error types
// ============================================================================

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Error::NotFound {
                entity_type: "record",
                id: "unknown".to_string(),
            },
            sqlx::Error::PoolTimedOut => Error::PoolExhausted,
            sqlx::Error::Database(db_err) => {
                if let Some(constraint) = db_err.constraint() {
                    return Error::ConstraintViolation {
                        message: format!("Constraint '{}' violated", constraint).into(),
                    };
                }
                Error::Database {
                    message: db_err.message().to_string().into(),
                    source: Some(err),
                }
            }
            _ => Error::Database {
                message: err.to_string().into(),
                source: Some(err),
            },
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Error::Timeout { timeout_ms: 0 };
        }
        let provider = err
            .url()
            .and_then(|u| u.host_str())
            .map(|h| Cow::Owned(h.to_string()))
            .unwrap_or(Cow::Borrowed("http"));
        Error::Provider {
            provider,
            message: err.to_string().into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_transient() {
        assert!(Error::provider("igdb", "connection reset").is_transient());
        assert!(Error::Timeout { timeout_ms: 500 }.is_transient());
        assert!(Error::RateLimited {
            retry_after_ms: 1000
        }
        .is_transient());
        assert!(!Error::deserialization("truncated json").is_transient());
        assert!(!Error::not_found("item", "game:1").is_transient());
    }

    #[test]
    fn test_rate_limited_is_not_retried_blindly() {
        assert!(!Error::RateLimited {
            retry_after_ms: 1000
        }
        .is_retryable());
        assert!(Error::PoolExhausted.is_retryable());
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            Error::not_found("item", "movie:42").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::bad_request("rating out of range").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::provider("tmdb", "502").status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            Error::Internal { source: None }.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::PoolExhausted.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::deserialization("bad").error_code(),
            "SERIALIZATION_ERROR"
        );
        assert_eq!(Error::local_store("locked").error_code(), "LOCAL_STORE_ERROR");
        assert_eq!(
            Error::RateLimited { retry_after_ms: 1 }.error_code(),
            "RATE_LIMITED"
        );
        assert_eq!(Error::config("bad port").error_code(), "CONFIG_ERROR");
    }
}
