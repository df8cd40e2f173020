//! Error types for Errand.
//!
//! [`ErrandError`] is the single error taxonomy used by every pipeline stage
//! and handler. Each variant maps to exactly one HTTP status and renders as
//! the minimal body `{"error": "<message>"}`.
//!
//! | Variant | Status |
//! |---|---|
//! | `Validation` | 400 |
//! | `Unauthorized` | 401 |
//! | `NotFound` | 404 |
//! | `PreconditionFailed` | 412 |
//! | `RateLimitExceeded` | 429 |
//! | `Internal` | 500 |
//! | `StoreUnavailable` | 503 |

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`ErrandError`].
pub type ErrandResult<T> = Result<T, ErrandError>;

/// Message sent to clients in place of store failure details.
const STORE_UNAVAILABLE_MESSAGE: &str = "service temporarily unavailable";

/// Message sent to clients in place of internal failure details.
const INTERNAL_MESSAGE: &str = "internal server error";

/// Categories of errors for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Missing or malformed request fields.
    Validation,
    /// Failed credential or token check.
    Unauthorized,
    /// Missing resource.
    NotFound,
    /// Failed `If-Match` precondition.
    PreconditionFailed,
    /// Rate limit exhausted for the current window.
    RateLimited,
    /// Server-side failure unrelated to any store.
    Internal,
    /// Counter store or persistence I/O failure.
    StoreUnavailable,
}

impl ErrorCategory {
    /// Returns the HTTP status code for this error category.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Standard error type for Errand.
///
/// # Example
///
/// ```
/// use errand_core::ErrandError;
///
/// fn require_name(name: Option<&str>) -> Result<&str, ErrandError> {
///     name.ok_or_else(|| ErrandError::validation("Invalid todo: missing name"))
/// }
///
/// let err = require_name(None).unwrap_err();
/// assert_eq!(err.status_code().as_u16(), 400);
/// ```
#[derive(Error, Debug)]
pub enum ErrandError {
    /// Request validation failed.
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable error message.
        message: String,
    },

    /// Credentials missing or rejected.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Human-readable error message.
        message: String,
    },

    /// Resource not found.
    #[error("Not found: {message}")]
    NotFound {
        /// Human-readable error message.
        message: String,
    },

    /// `If-Match` did not match the current validator.
    #[error("Precondition failed: {message}")]
    PreconditionFailed {
        /// Human-readable error message.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limited: {message}")]
    RateLimitExceeded {
        /// Human-readable error message.
        message: String,
        /// Seconds until the current window resets.
        retry_after_seconds: Option<u64>,
    },

    /// The server failed in a way the caller cannot fix, such as a token
    /// signing failure.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message (logged, not sent to clients).
        message: String,
        /// The underlying error.
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A backing store could not be reached.
    ///
    /// The caller may retry the whole request; the pipeline never retries.
    #[error("Store unavailable: {message}")]
    StoreUnavailable {
        /// Human-readable error message (logged, not sent to clients).
        message: String,
        /// The underlying error.
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl ErrandError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a precondition failed error.
    #[must_use]
    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            message: message.into(),
        }
    }

    /// Creates a rate limited error.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>, retry_after_seconds: Option<u64>) -> Self {
        Self::RateLimitExceeded {
            message: message.into(),
            retry_after_seconds,
        }
    }

    /// Creates an internal error wrapping `source`.
    pub fn internal(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a store unavailable error.
    #[must_use]
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a store unavailable error with a source error.
    pub fn store_unavailable_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::Unauthorized { .. } => ErrorCategory::Unauthorized,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::PreconditionFailed { .. } => ErrorCategory::PreconditionFailed,
            Self::RateLimitExceeded { .. } => ErrorCategory::RateLimited,
            Self::Internal { .. } => ErrorCategory::Internal,
            Self::StoreUnavailable { .. } => ErrorCategory::StoreUnavailable,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category().status_code()
    }

    /// Returns `true` if the failure is transient and the request may be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    /// Returns the message exposed to clients.
    ///
    /// Store and internal failures are replaced by a generic message.
    #[must_use]
    pub fn public_message(&self) -> &str {
        match self {
            Self::Validation { message }
            | Self::Unauthorized { message }
            | Self::NotFound { message }
            | Self::PreconditionFailed { message }
            | Self::RateLimitExceeded { message, .. } => message,
            Self::Internal { .. } => INTERNAL_MESSAGE,
            Self::StoreUnavailable { .. } => STORE_UNAVAILABLE_MESSAGE,
        }
    }

    /// Converts this error to its serializable response body.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.public_message().to_string(),
        }
    }
}

/// Serializable error body: `{"error": "<message>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable error message.
    pub error: String,
}
