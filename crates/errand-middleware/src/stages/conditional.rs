//! Conditional request middleware.
//!
//! Attaches an `ETag` to successful reads and answers `If-None-Match` /
//! `If-Match` preconditions. The current validator comes from one of two
//! sources:
//!
//! - [`ValidatorSource::Resolver`] loads the current representation before
//!   the handler runs. A 304 or 412 then skips the handler entirely, which
//!   is what guards `PUT`/`DELETE` against lost updates. When the resolver
//!   finds nothing the request passes through so the handler can 404.
//! - [`ValidatorSource::ResponseBody`] lets the handler run and hashes the
//!   body it produced. Only reads are evaluated this way.
//!
//! Successful reads carrying an ETag also get `Cache-Control: max-age=..`
//! unless the response already has a `Cache-Control`.

use crate::conditional::{evaluate, ETag, Precondition};
use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{into_parts_bytes, Request, Response, ResponseExt};
use bytes::Bytes;
use errand_core::{ErrandError, ErrandResult};
use http::{header, HeaderValue, Method, StatusCode};
use http_body_util::Full;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Default `max-age` for validated reads, in seconds.
pub const DEFAULT_MAX_AGE: u64 = 86_400;

const PRECONDITION_FAILED_MESSAGE: &str = "precondition failed";

/// Loads the current representation of the addressed resource.
pub type RepresentationResolver = Arc<
    dyn Fn(&MiddlewareContext, &Request) -> BoxFuture<'static, ErrandResult<Option<Value>>>
        + Send
        + Sync,
>;

/// Where the current validator comes from.
#[derive(Clone)]
pub enum ValidatorSource {
    /// Resolve the representation before the handler runs.
    Resolver(RepresentationResolver),
    /// Hash the handler's response body.
    ResponseBody,
}

impl std::fmt::Debug for ValidatorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolver(_) => f.write_str("Resolver(<fn>)"),
            Self::ResponseBody => f.write_str("ResponseBody"),
        }
    }
}

/// Middleware evaluating conditional requests.
#[derive(Debug, Clone)]
pub struct ConditionalMiddleware {
    source: ValidatorSource,
    max_age: u64,
}

impl ConditionalMiddleware {
    /// Creates a stage that resolves the representation up front.
    pub fn with_resolver<F>(resolver: F) -> Self
    where
        F: Fn(&MiddlewareContext, &Request) -> BoxFuture<'static, ErrandResult<Option<Value>>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            source: ValidatorSource::Resolver(Arc::new(resolver)),
            max_age: DEFAULT_MAX_AGE,
        }
    }

    /// Creates a stage that fingerprints the response body.
    #[must_use]
    pub fn from_response() -> Self {
        Self {
            source: ValidatorSource::ResponseBody,
            max_age: DEFAULT_MAX_AGE,
        }
    }

    /// Sets the `max-age` advertised on validated reads.
    #[must_use]
    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = seconds;
        self
    }

    /// Returns the validator source.
    pub fn source(&self) -> &ValidatorSource {
        &self.source
    }

    fn decorate(&self, response: &mut Response, etag: &ETag) {
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(etag.as_str()) {
            headers.insert(header::ETAG, value);
        }
        if !headers.contains_key(header::CACHE_CONTROL) {
            if let Ok(value) = HeaderValue::from_str(&format!("max-age={}", self.max_age)) {
                headers.insert(header::CACHE_CONTROL, value);
            }
        }
    }

    fn not_modified(&self, etag: &ETag) -> Response {
        let mut response = Response::empty(StatusCode::NOT_MODIFIED);
        self.decorate(&mut response, etag);
        response
    }

    async fn resolve_first<'a>(
        &'a self,
        resolver: &'a RepresentationResolver,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> Response {
        let current = match resolver(ctx, &request).await {
            Ok(current) => current,
            Err(error) => return Response::error(&error),
        };
        let Some(representation) = current else {
            return next.run(ctx, request).await;
        };

        let etag = ETag::for_value(&representation);
        let read = is_read(request.method());
        match evaluate(request.method(), request.headers(), &etag) {
            Precondition::NotModified => {
                debug!(request_id = %ctx.request_id(), etag = %etag, "not modified");
                return self.not_modified(&etag);
            }
            Precondition::Failed => {
                debug!(request_id = %ctx.request_id(), etag = %etag, "precondition failed");
                return Response::error(&ErrandError::precondition_failed(
                    PRECONDITION_FAILED_MESSAGE,
                ));
            }
            Precondition::Proceed => {}
        }

        let mut response = next.run(ctx, request).await;
        if read && response.status() == StatusCode::OK {
            self.decorate(&mut response, &etag);
        }
        response
    }

    async fn hash_response<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> Response {
        if !is_read(request.method()) {
            return next.run(ctx, request).await;
        }
        let method = request.method().clone();
        let conditions = request.headers().clone();

        let response = next.run(ctx, request).await;
        if response.status() != StatusCode::OK {
            return response;
        }

        let (parts, bytes) = into_parts_bytes(response).await;
        let etag = ETag::for_bytes(&bytes);
        match evaluate(&method, &conditions, &etag) {
            Precondition::NotModified => {
                debug!(request_id = %ctx.request_id(), etag = %etag, "not modified");
                let mut response = Response::from_parts(parts, Full::new(Bytes::new()));
                *response.status_mut() = StatusCode::NOT_MODIFIED;
                response.headers_mut().remove(header::CONTENT_TYPE);
                response.headers_mut().remove(header::CONTENT_LENGTH);
                self.decorate(&mut response, &etag);
                response
            }
            Precondition::Failed => {
                debug!(request_id = %ctx.request_id(), etag = %etag, "precondition failed");
                Response::error(&ErrandError::precondition_failed(PRECONDITION_FAILED_MESSAGE))
            }
            Precondition::Proceed => {
                let mut response = Response::from_parts(parts, Full::new(bytes));
                self.decorate(&mut response, &etag);
                response
            }
        }
    }
}

fn is_read(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

impl Middleware for ConditionalMiddleware {
    fn name(&self) -> &'static str {
        "conditional"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            match &self.source {
                ValidatorSource::Resolver(resolver) => {
                    self.resolve_first(resolver, ctx, request, next).await
                }
                ValidatorSource::ResponseBody => self.hash_response(ctx, request, next).await,
            }
        })
    }
}
