//! Resolves `page`/`per_page` for collection routes.
//!
//! The resolved [`PageRequest`] is stored as a context extension; the
//! collection handler picks it up and calls [`Paginator::paginate`].

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::pagination::{PageRequest, Paginator};
use crate::types::{Request, Response};
use tracing::trace;

/// Middleware that parses pagination parameters.
#[derive(Debug, Clone)]
pub struct PaginationMiddleware {
    paginator: Paginator,
    public_url: String,
}

impl PaginationMiddleware {
    /// Creates the stage. `public_url` is the externally visible origin
    /// (e.g. `http://localhost:5000`) that links are built on.
    #[must_use]
    pub fn new(paginator: Paginator, public_url: impl Into<String>) -> Self {
        let mut public_url = public_url.into();
        while public_url.ends_with('/') {
            public_url.pop();
        }
        Self {
            paginator,
            public_url,
        }
    }

    /// Returns the page-size policy.
    pub fn paginator(&self) -> &Paginator {
        &self.paginator
    }

    /// Builds the page request for `request`.
    #[must_use]
    pub fn page_request(&self, request: &Request) -> PageRequest {
        let base_url = format!("{}{}", self.public_url, request.uri().path());
        self.paginator.request(request.uri().query(), base_url)
    }
}

impl Middleware for PaginationMiddleware {
    fn name(&self) -> &'static str {
        "pagination"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let page = self.page_request(&request);
            trace!(page = page.page, per_page = page.per_page, "page requested");
            ctx.set_extension(page);
            next.run(ctx, request).await
        })
    }
}
