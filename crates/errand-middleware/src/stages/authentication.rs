//! Authentication middleware.
//!
//! Reads the `Authorization` header, resolves it through an
//! [`AuthResolver`] and attaches the resulting principal to the context.
//!
//! - No principal: 401 with a Basic challenge, handler not run
//! - Directory failure: the store error is rendered (503), handler not run

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, ResponseExt};
use errand_auth::{AuthResolver, Credentials};
use errand_core::ErrandError;
use http::header;
use tracing::{debug, warn};

/// Message sent with every 401.
const UNAUTHORIZED_MESSAGE: &str = "unauthorized";

/// Middleware that authenticates the caller.
#[derive(Debug, Clone)]
pub struct AuthenticationMiddleware {
    resolver: AuthResolver,
}

impl AuthenticationMiddleware {
    /// Creates a middleware that rejects unauthenticated requests.
    #[must_use]
    pub fn new(resolver: AuthResolver) -> Self {
        Self { resolver }
    }

    fn credentials(request: &Request) -> Option<Credentials> {
        request
            .headers()
            .get(header::AUTHORIZATION)?
            .to_str()
            .ok()
            .and_then(Credentials::from_authorization)
    }

    fn reject() -> Response {
        Response::error(&ErrandError::unauthorized(UNAUTHORIZED_MESSAGE))
    }
}

impl Middleware for AuthenticationMiddleware {
    fn name(&self) -> &'static str {
        "authentication"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let Some(credentials) = Self::credentials(&request) else {
                debug!(request_id = %ctx.request_id(), "no credentials supplied");
                return Self::reject();
            };

            match self.resolver.authenticate(&credentials).await {
                Ok(Some(principal)) => {
                    debug!(
                        request_id = %ctx.request_id(),
                        principal = %principal.log_id(),
                        "authenticated"
                    );
                    ctx.set_principal(principal);
                }
                Ok(None) => {
                    warn!(request_id = %ctx.request_id(), "credentials rejected");
                    return Self::reject();
                }
                Err(error) => {
                    warn!(request_id = %ctx.request_id(), error = %error, "authentication unavailable");
                    return Response::error(&error);
                }
            }

            next.run(ctx, request).await
        })
    }
}
