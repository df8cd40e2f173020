//! Forbids caching of the response.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use http::{header, HeaderValue};

/// `Cache-Control` value set on every response.
pub const NO_CACHE: &str = "no-cache, no-store, max-age=0";

/// Middleware that marks responses uncacheable. Used for token issuance.
#[derive(Debug, Clone, Default)]
pub struct NoCacheMiddleware;

impl NoCacheMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for NoCacheMiddleware {
    fn name(&self) -> &'static str {
        "no_cache"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let mut response = next.run(ctx, request).await;
            response
                .headers_mut()
                .insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
            response
        })
    }
}
