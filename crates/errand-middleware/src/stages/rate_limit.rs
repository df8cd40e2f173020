//! Rate limiting middleware.
//!
//! Each stage instance owns one fixed-window quota, checked through a shared
//! [`RateLimiter`]. Several stages can wrap the same handler (a global
//! per-principal quota and a per-route quota, say); each increments its own
//! counter and makes its own 429 decision.
//!
//! ## Keys
//!
//! ```text
//! rate-limit/<scope>/<name>/<reset>
//! ```
//!
//! `scope` is the principal id when authenticated, otherwise the first
//! `X-Forwarded-For` address, then `X-Real-IP`, then `anonymous`.
//!
//! ## Headers
//!
//! Every response that passes through carries `X-RateLimit-Limit`,
//! `X-RateLimit-Remaining` and `X-RateLimit-Reset`. When an inner stage has
//! already set them, the values with the lowest remaining count are kept.
//! A 429 additionally carries `Retry-After`.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, ResponseExt};
use errand_core::ErrandError;
use errand_ratelimit::{unix_now, RateLimit, RateLimiter};
use http::{HeaderMap, HeaderValue};
use std::sync::Arc;
use tracing::{debug, warn};

/// Rate limit header names.
pub mod headers {
    /// Maximum requests allowed in the window.
    pub const LIMIT: &str = "x-ratelimit-limit";
    /// Remaining requests in current window.
    pub const REMAINING: &str = "x-ratelimit-remaining";
    /// Unix timestamp when the window resets.
    pub const RESET: &str = "x-ratelimit-reset";
}

/// Scope used when neither a principal nor a client address is known.
pub const ANONYMOUS_SCOPE: &str = "anonymous";

const RATE_LIMITED_MESSAGE: &str = "too many requests";

/// Fixed-window rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitMiddleware {
    limiter: RateLimiter,
    name: String,
    limit: u64,
    per_seconds: u64,
    enabled: bool,
    clock: Arc<dyn Fn() -> u64 + Send + Sync>,
}

impl RateLimitMiddleware {
    /// Creates a stage with a quota of `limit` per `per_seconds` window,
    /// counted under `name`. The request that uses up the quota is rejected.
    pub fn new(limiter: RateLimiter, name: impl Into<String>, limit: u64, per_seconds: u64) -> Self {
        Self {
            limiter,
            name: name.into(),
            limit,
            per_seconds,
            enabled: true,
            clock: Arc::new(unix_now),
        }
    }

    /// Turns the stage into a pass-through when `enabled` is false.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Replaces the clock (Unix seconds).
    #[must_use]
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Returns the counter name.
    pub fn counter_name(&self) -> &str {
        &self.name
    }

    /// Computes the key prefix for this request.
    pub fn key_prefix(&self, ctx: &MiddlewareContext, request: &Request) -> String {
        format!("rate-limit/{}/{}/", scope(ctx, request), self.name)
    }

    fn rejection(status: &RateLimit, now: u64) -> Response {
        let error = ErrandError::rate_limited(RATE_LIMITED_MESSAGE, Some(status.retry_after(now)));
        let mut response = Response::error(&error);
        set_headers(response.headers_mut(), status);
        response
    }
}

impl std::fmt::Debug for RateLimitMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitMiddleware")
            .field("name", &self.name)
            .field("limit", &self.limit)
            .field("per_seconds", &self.per_seconds)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Returns the principal id, client address, or `anonymous`.
fn scope(ctx: &MiddlewareContext, request: &Request) -> String {
    if let Some(principal) = ctx.principal() {
        return principal.id.clone();
    }
    let headers = request.headers();
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map_or_else(|| ANONYMOUS_SCOPE.to_string(), str::to_string)
}

fn current_remaining(map: &HeaderMap) -> Option<u64> {
    map.get(headers::REMAINING)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn set_headers(map: &mut HeaderMap, status: &RateLimit) {
    map.insert(headers::LIMIT, HeaderValue::from(status.limit));
    map.insert(headers::REMAINING, HeaderValue::from(status.remaining));
    map.insert(headers::RESET, HeaderValue::from(status.reset));
}

/// Sets the quota headers unless a more restrictive quota is already shown.
fn merge_headers(map: &mut HeaderMap, status: &RateLimit) {
    match current_remaining(map) {
        Some(existing) if existing <= status.remaining => {}
        _ => set_headers(map, status),
    }
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if !self.enabled {
                return next.run(ctx, request).await;
            }

            let now = (self.clock)();
            let prefix = self.key_prefix(ctx, &request);
            let status = match self
                .limiter
                .check(&prefix, self.limit, self.per_seconds, now)
                .await
            {
                Ok(status) => status,
                Err(error) => {
                    warn!(request_id = %ctx.request_id(), counter = %self.name, error = %error, "rate limit check failed");
                    return Response::error(&error);
                }
            };

            if status.over_limit {
                warn!(
                    request_id = %ctx.request_id(),
                    counter = %self.name,
                    key_prefix = %prefix,
                    limit = status.limit,
                    reset = status.reset,
                    "rate limit exceeded"
                );
                return Self::rejection(&status, now);
            }

            debug!(counter = %self.name, remaining = status.remaining, "within rate limit");
            let mut response = next.run(ctx, request).await;
            merge_headers(response.headers_mut(), &status);
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use errand_core::{ErrandResult, Principal};
    use errand_ratelimit::{CounterStore, InMemoryCounterStore};
    use http::{header, Request as HttpRequest, StatusCode};
    use http_body_util::Full;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const NOW: u64 = 1_000;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(InMemoryCounterStore::with_clock(|| NOW)))
    }

    fn stage(limiter: &RateLimiter, name: &str, limit: u64) -> RateLimitMiddleware {
        RateLimitMiddleware::new(limiter.clone(), name, limit, 60).with_clock(|| NOW)
    }

    fn request(forwarded_for: Option<&str>) -> Request {
        let mut builder = HttpRequest::builder().uri("/api/v1.0/todos/");
        if let Some(ip) = forwarded_for {
            builder = builder.header("x-forwarded-for", ip);
        }
        builder.body(Full::new(Bytes::new())).unwrap()
    }

    fn counting_handler(calls: Arc<AtomicUsize>) -> Next<'static> {
        Next::handler(move |_ctx, _req| {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Response::empty(StatusCode::OK) })
        })
    }

    fn header_value(response: &Response, name: &str) -> String {
        response.headers().get(name).unwrap().to_str().unwrap().to_string()
    }

    struct FailingStore;

    #[async_trait::async_trait]
    impl CounterStore for FailingStore {
        async fn increment_and_expire_at(&self, _: &str, _: u64) -> ErrandResult<u64> {
            Err(ErrandError::store_unavailable("connection refused"))
        }
    }

    #[tokio::test]
    async fn test_within_limit_sets_headers() {
        let limiter = limiter();
        let middleware = stage(&limiter, "todos", 5);
        let mut ctx = MiddlewareContext::new();

        let response = middleware
            .process(&mut ctx, request(None), counting_handler(Arc::default()))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_value(&response, headers::LIMIT), "5");
        assert_eq!(header_value(&response, headers::REMAINING), "4");
        assert_eq!(header_value(&response, headers::RESET), "1020");
    }

    #[tokio::test]
    async fn test_over_limit_short_circuits() {
        let limiter = limiter();
        let middleware = stage(&limiter, "todos", 3);
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let mut ctx = MiddlewareContext::new();
            let response = middleware
                .process(&mut ctx, request(None), counting_handler(calls.clone()))
                .await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        let mut ctx = MiddlewareContext::new();
        let response = middleware
            .process(&mut ctx, request(None), counting_handler(calls.clone()))
            .await;

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(header_value(&response, headers::REMAINING), "0");
        assert_eq!(header_value(&response, headers::LIMIT), "3");
        assert_eq!(header_value(&response, header::RETRY_AFTER.as_str()), "20");
    }

    #[tokio::test]
    async fn test_single_slot_quota_rejects_immediately() {
        let limiter = limiter();
        let middleware = stage(&limiter, "todos", 1);
        let calls = Arc::new(AtomicUsize::new(0));
        let mut ctx = MiddlewareContext::new();

        let response = middleware
            .process(&mut ctx, request(None), counting_handler(calls.clone()))
            .await;

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(header_value(&response, headers::REMAINING), "0");
    }

    #[tokio::test]
    async fn test_scope_separates_principals_and_addresses() {
        let limiter = limiter();
        let middleware = stage(&limiter, "todos", 2);

        let mut ctx = MiddlewareContext::new();
        ctx.set_principal(Principal::new("1", "a"));
        let first = middleware
            .process(&mut ctx, request(None), counting_handler(Arc::default()))
            .await;

        let mut ctx = MiddlewareContext::new();
        ctx.set_principal(Principal::new("2", "b"));
        let second = middleware
            .process(&mut ctx, request(None), counting_handler(Arc::default()))
            .await;

        let mut ctx = MiddlewareContext::new();
        let third = middleware
            .process(
                &mut ctx,
                request(Some("10.0.0.1, 10.0.0.2")),
                counting_handler(Arc::default()),
            )
            .await;

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(third.status(), StatusCode::OK);
    }

    #[test]
    fn test_key_prefix() {
        let middleware = stage(&limiter(), "get_todos", 1);
        let mut ctx = MiddlewareContext::new();
        assert_eq!(
            middleware.key_prefix(&ctx, &request(None)),
            "rate-limit/anonymous/get_todos/"
        );
        assert_eq!(
            middleware.key_prefix(&ctx, &request(Some(" 10.0.0.9 , 1.1.1.1"))),
            "rate-limit/10.0.0.9/get_todos/"
        );

        ctx.set_principal(Principal::new("42", "miguel"));
        assert_eq!(
            middleware.key_prefix(&ctx, &request(Some("10.0.0.9"))),
            "rate-limit/42/get_todos/"
        );
    }

    #[tokio::test]
    async fn test_disabled_is_noop() {
        let store = Arc::new(InMemoryCounterStore::with_clock(|| NOW));
        let limiter = RateLimiter::new(store.clone());
        let middleware = stage(&limiter, "todos", 0).enabled(false);
        let mut ctx = MiddlewareContext::new();

        let response = middleware
            .process(&mut ctx, request(None), counting_handler(Arc::default()))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(headers::LIMIT));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_most_restrictive_headers_win() {
        let limiter = limiter();
        let global = stage(&limiter, "global", 100);
        let route = stage(&limiter, "todos", 3);

        let pipeline = crate::Pipeline::builder().stage(global).stage(route).build();
        let response = pipeline
            .process(MiddlewareContext::new(), request(None), |_ctx, _req| {
                Box::pin(async { Response::empty(StatusCode::OK) })
            })
            .await;

        assert_eq!(header_value(&response, headers::LIMIT), "3");
        assert_eq!(header_value(&response, headers::REMAINING), "2");

        let pipeline = crate::Pipeline::builder()
            .stage(stage(&limiter, "todos", 3))
            .stage(stage(&limiter, "global", 100))
            .build();
        let response = pipeline
            .process(MiddlewareContext::new(), request(None), |_ctx, _req| {
                Box::pin(async { Response::empty(StatusCode::OK) })
            })
            .await;

        assert_eq!(header_value(&response, headers::LIMIT), "3");
        assert_eq!(header_value(&response, headers::REMAINING), "1");
    }

    #[tokio::test]
    async fn test_store_failure_is_service_unavailable() {
        let limiter = RateLimiter::new(Arc::new(FailingStore));
        let middleware = stage(&limiter, "todos", 5);
        let mut ctx = MiddlewareContext::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let response = middleware
            .process(&mut ctx, request(None), counting_handler(calls.clone()))
            .await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
