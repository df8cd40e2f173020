//! Error normalization middleware.
//!
//! Any 4xx or 5xx response that reaches this stage without a body (a
//! router 405, a bare status from a handler) is given the standard
//! `{"error": "<reason>"}` body. Responses that already carry a body pass
//! through untouched, as do 304 and success responses.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{into_parts_bytes, Request, Response, ResponseExt};
use http::StatusCode;
use http_body_util::Full;
use tracing::{debug, warn};

/// Error normalization middleware.
#[derive(Debug, Clone, Default)]
pub struct ErrorNormalizationMiddleware;

impl ErrorNormalizationMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn default_message(status: StatusCode) -> String {
        status
            .canonical_reason()
            .map_or_else(|| format!("HTTP {}", status.as_u16()), str::to_lowercase)
    }
}

impl Middleware for ErrorNormalizationMiddleware {
    fn name(&self) -> &'static str {
        "error_normalization"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let response = next.run(ctx, request).await;
            let status = response.status();
            if !(status.is_client_error() || status.is_server_error()) {
                return response;
            }

            if status.is_server_error() {
                warn!(request_id = %ctx.request_id(), status = status.as_u16(), "request failed");
            }

            let (parts, bytes) = into_parts_bytes(response).await;
            if !bytes.is_empty() {
                return Response::from_parts(parts, Full::new(bytes));
            }

            debug!(status = status.as_u16(), "filling empty error body");
            let filled = Response::json_error(status, &Self::default_message(status));
            let (_, body) = filled.into_parts();
            let mut response = Response::from_parts(parts, body);
            response.headers_mut().insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/json"),
            );
            response.headers_mut().remove(http::header::CONTENT_LENGTH);
            response
        })
    }
}
