//! Middleware stages.
//!
//! Stages are composed per route with [`crate::Pipeline::builder`]. A
//! typical authenticated read route looks like:
//!
//! ```text
//! RequestId → ErrorNormalization → Authentication → RateLimit → Conditional → Handler
//! ```
//!
//! - [`request_id`] - Generate/propagate `X-Request-Id`
//! - [`error_normalization`] - Fill empty error bodies with `{"error": ...}`
//! - [`authentication`] - Resolve credentials into a principal
//! - [`rate_limit`] - Fixed-window quotas with `X-RateLimit-*` headers
//! - [`conditional`] - ETags, `If-None-Match` and `If-Match`
//! - [`pagination`] - Parse `page`/`per_page` for collection routes
//! - [`no_cache`] - Mark responses uncacheable

pub mod authentication;
pub mod conditional;
pub mod error_normalization;
pub mod no_cache;
pub mod pagination;
pub mod rate_limit;
pub mod request_id;

// Re-export main types
pub use authentication::AuthenticationMiddleware;
pub use conditional::{ConditionalMiddleware, RepresentationResolver, ValidatorSource};
pub use error_normalization::ErrorNormalizationMiddleware;
pub use no_cache::NoCacheMiddleware;
pub use pagination::PaginationMiddleware;
pub use rate_limit::RateLimitMiddleware;
pub use request_id::{RequestIdMiddleware, REQUEST_ID_HEADER};
