//! Application assembly.
//!
//! An [`App`] owns the router, one [`Pipeline`] per route and the shared
//! [`AppState`]. Every resource route runs
//!
//! ```text
//! RequestId → ErrorNormalization → Authentication → RateLimit(global)
//!           → RateLimit(route) → Conditional → [Pagination] → handler
//! ```
//!
//! The token route swaps `Conditional` for `NoCache` and accepts passwords
//! only. Unrouted requests answer with a bare 404 or 405 through a
//! `RequestId → ErrorNormalization` pipeline, which supplies the request id
//! and the JSON error body.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use errand_auth::{AuthResolver, CredentialKind, InMemoryUserDirectory, TokenSigner, UserDirectory};
use errand_config::{CounterBackend, ErrandConfig, RateLimitRule};
use errand_middleware::stages::{
    AuthenticationMiddleware, ConditionalMiddleware, ErrorNormalizationMiddleware,
    NoCacheMiddleware, PaginationMiddleware, RateLimitMiddleware, RequestIdMiddleware,
    REQUEST_ID_HEADER,
};
use errand_middleware::{
    body_bytes, MiddlewareContext, PageRequest, Paginator, Pipeline, PipelineBuilder, Request,
    Response, ResponseExt,
};
use errand_ratelimit::{unix_now, CounterStore, InMemoryCounterStore, RateLimiter, RedisCounterStore};
use http::{header, HeaderValue, Method, StatusCode};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::handlers::{self, AppState, HandlerCall};
use crate::repository::{InMemoryTodoRepository, TodoRepository};
use crate::router::{Operation, RouteMatch, RouteOutcome, Router};
use crate::todo::{ResourceUrls, TodoId};

/// Counter name of the per-principal quota shared by every route.
pub const GLOBAL_LIMIT_NAME: &str = "global";

/// Path of the token issuance route. It sits outside the API prefix.
pub const TOKEN_PATH: &str = "/auth/request-token";

type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// The assembled todo service.
pub struct App {
    router: Router,
    pipelines: HashMap<Operation, Pipeline>,
    fallback: Pipeline,
    state: Arc<AppState>,
}

impl App {
    /// Starts a builder over `config`.
    pub fn builder(config: ErrandConfig) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// Builds an app with in-process defaults for everything not in `config`.
    ///
    /// # Errors
    ///
    /// See [`AppBuilder::build`].
    pub fn from_config(config: ErrandConfig) -> AppResult<Self> {
        AppBuilder::new(config).build()
    }

    /// Returns the pipeline serving `operation`.
    pub fn pipeline(&self, operation: Operation) -> Option<&Pipeline> {
        self.pipelines.get(&operation)
    }

    /// Returns the shared handler state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Routes `request` and runs it through its pipeline.
    pub async fn handle(&self, request: Request) -> Response {
        let started = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let response = match self.router.match_route(&method, &path) {
            RouteOutcome::Matched(route) => self.dispatch(route, request).await,
            RouteOutcome::MethodNotAllowed(allowed) => {
                debug!(method = %method, path = %path, "method not allowed");
                self.reject(request, StatusCode::METHOD_NOT_ALLOWED, allowed)
                    .await
            }
            RouteOutcome::NotFound => {
                debug!(method = %method, path = %path, "no route");
                self.reject(request, StatusCode::NOT_FOUND, Vec::new()).await
            }
        };

        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();
        errand_telemetry::log_request_complete!(
            request_id,
            method,
            path,
            response.status().as_u16(),
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
        );
        response
    }

    async fn dispatch(&self, route: RouteMatch, request: Request) -> Response {
        let Some(pipeline) = self.pipelines.get(&route.operation()) else {
            return Response::json_error(StatusCode::NOT_FOUND, "not found");
        };

        let mut ctx = MiddlewareContext::new();
        ctx.set_extension(route.clone());
        let state = Arc::clone(&self.state);

        pipeline
            .process(ctx, request, move |ctx, request| {
                let principal = ctx.principal().cloned();
                let page = ctx.get_extension::<PageRequest>().cloned();
                Box::pin(async move {
                    let body = body_bytes(request.into_body()).await;
                    let call = HandlerCall {
                        route,
                        principal,
                        page,
                        body,
                    };
                    handlers::dispatch(&state, call).await
                })
            })
            .await
    }

    async fn reject(&self, request: Request, status: StatusCode, allowed: Vec<Method>) -> Response {
        self.fallback
            .process(MiddlewareContext::new(), request, move |_ctx, _request| {
                Box::pin(async move {
                    let mut response = Response::empty(status);
                    let allow = allowed
                        .iter()
                        .map(Method::as_str)
                        .collect::<Vec<_>>()
                        .join(", ");
                    if !allow.is_empty() {
                        if let Ok(value) = HeaderValue::from_str(&allow) {
                            response.headers_mut().insert(header::ALLOW, value);
                        }
                    }
                    response
                })
            })
            .await
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("router", &self.router)
            .field("pipelines", &self.pipelines)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Builder for [`App`]. Unset collaborators fall back to in-memory ones.
pub struct AppBuilder {
    config: ErrandConfig,
    counter_store: Option<Arc<dyn CounterStore>>,
    user_directory: Option<Arc<dyn UserDirectory>>,
    repository: Option<Arc<dyn TodoRepository>>,
    rate_limit_clock: Option<Clock>,
}

impl AppBuilder {
    /// Creates a builder.
    pub fn new(config: ErrandConfig) -> Self {
        Self {
            config,
            counter_store: None,
            user_directory: None,
            repository: None,
            rate_limit_clock: None,
        }
    }

    /// Uses `store` for rate limit counters instead of the configured backend.
    pub fn counter_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.counter_store = Some(store);
        self
    }

    /// Uses `directory` to look up users.
    pub fn user_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.user_directory = Some(directory);
        self
    }

    /// Uses `repository` for todo storage.
    pub fn repository(mut self, repository: Arc<dyn TodoRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Replaces the clock rate limit stages read (Unix seconds).
    pub fn rate_limit_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        self.rate_limit_clock = Some(Arc::new(clock));
        self
    }

    /// Validates the configuration and assembles every route.
    ///
    /// # Errors
    ///
    /// [`AppError::Config`] if the configuration is invalid and
    /// [`AppError::CounterStore`] if the Redis client cannot be created.
    pub fn build(self) -> AppResult<App> {
        self.config.validate()?;
        let config = self.config;

        let store = match self.counter_store {
            Some(store) => store,
            None => open_counter_store(&config)?,
        };
        let limiter =
            RateLimiter::new(store).with_expiration_window(config.rate_limit.expiration_window_secs);
        let directory = self
            .user_directory
            .unwrap_or_else(|| Arc::new(InMemoryUserDirectory::new()));
        let todos = self
            .repository
            .unwrap_or_else(|| Arc::new(InMemoryTodoRepository::new()));
        let clock = self.rate_limit_clock.unwrap_or_else(|| Arc::new(unix_now));

        let signer =
            TokenSigner::new(config.auth.secret_key.as_bytes()).with_expiry(config.auth.token_expiry_secs);
        let resolver = AuthResolver::new(Arc::clone(&directory), signer.clone())
            .with_methods(config.auth.methods.iter().copied());
        let password_resolver =
            AuthResolver::new(directory, signer).with_methods([CredentialKind::Password]);

        let paginator = Paginator::new(
            config.pagination.default_per_page,
            config.pagination.max_per_page,
        );
        let urls = ResourceUrls::new(&config.server.public_url, &config.server.api_prefix);

        let assembly = Assembly {
            config: &config,
            limiter,
            clock,
            resolver: resolver.clone(),
            password_resolver,
            paginator: paginator.clone(),
            todos: Arc::clone(&todos),
            urls: urls.clone(),
        };

        let mut router = Router::new();
        let mut pipelines = HashMap::new();
        let todos_path = urls.todos_path();
        let todo_pattern = urls.todo_pattern();
        let routes = [
            (Method::GET, todos_path.as_str(), Operation::ListTodos),
            (Method::POST, todos_path.as_str(), Operation::CreateTodo),
            (Method::GET, todo_pattern.as_str(), Operation::GetTodo),
            (Method::PUT, todo_pattern.as_str(), Operation::UpdateTodo),
            (Method::DELETE, todo_pattern.as_str(), Operation::DeleteTodo),
            (Method::GET, TOKEN_PATH, Operation::RequestToken),
        ];
        for (method, pattern, operation) in routes {
            router.add_route(method, pattern, operation);
            let pipeline = assembly.pipeline(operation);
            debug!(route = %operation, stages = ?pipeline.stage_names(), "route assembled");
            pipelines.insert(operation, pipeline);
        }

        info!(
            routes = router.route_count(),
            rate_limits = config.rate_limit.enabled,
            methods = ?config.auth.methods,
            "application assembled"
        );

        Ok(App {
            router,
            pipelines,
            fallback: Pipeline::builder()
                .stage(RequestIdMiddleware::new())
                .stage(ErrorNormalizationMiddleware::new())
                .build(),
            state: Arc::new(AppState {
                todos,
                resolver,
                paginator,
                urls,
            }),
        })
    }
}

impl std::fmt::Debug for AppBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn open_counter_store(config: &ErrandConfig) -> AppResult<Arc<dyn CounterStore>> {
    match config.redis.backend {
        CounterBackend::Memory => Ok(Arc::new(InMemoryCounterStore::new())),
        CounterBackend::Redis => {
            let redis = &config.redis;
            let store = RedisCounterStore::from_parts(&redis.host, redis.port, redis.db)
                .map_err(AppError::CounterStore)?
                .with_timeout(Duration::from_millis(redis.timeout_ms));
            info!(host = %redis.host, port = redis.port, db = redis.db, "using redis counter store");
            Ok(Arc::new(store))
        }
    }
}

/// Everything needed to build one route's pipeline.
struct Assembly<'c> {
    config: &'c ErrandConfig,
    limiter: RateLimiter,
    clock: Clock,
    resolver: AuthResolver,
    password_resolver: AuthResolver,
    paginator: Paginator,
    todos: Arc<dyn TodoRepository>,
    urls: ResourceUrls,
}

impl Assembly<'_> {
    fn pipeline(&self, operation: Operation) -> Pipeline {
        let resolver = match operation {
            Operation::RequestToken => self.password_resolver.clone(),
            _ => self.resolver.clone(),
        };
        let mut builder = Pipeline::builder()
            .stage(RequestIdMiddleware::new())
            .stage(ErrorNormalizationMiddleware::new())
            .stage(AuthenticationMiddleware::new(resolver));

        if let Some(rule) = self.config.rate_limit.global {
            builder = builder.stage(self.rate_limit(GLOBAL_LIMIT_NAME, rule));
        }
        if let Some(rule) = self.config.rate_limit.route(operation.name()) {
            builder = builder.stage(self.rate_limit(operation.name(), rule));
        }

        match operation {
            Operation::RequestToken => builder.stage(NoCacheMiddleware::new()).build(),
            Operation::ListTodos => builder
                .stage(ConditionalMiddleware::from_response())
                .stage(PaginationMiddleware::new(
                    self.paginator.clone(),
                    self.urls.public_url(),
                ))
                .build(),
            Operation::CreateTodo => builder.build(),
            Operation::GetTodo | Operation::UpdateTodo | Operation::DeleteTodo => {
                self.with_item_validator(builder).build()
            }
        }
    }

    fn rate_limit(&self, name: &str, rule: RateLimitRule) -> RateLimitMiddleware {
        let clock = Arc::clone(&self.clock);
        RateLimitMiddleware::new(self.limiter.clone(), name, rule.limit, rule.per_seconds)
            .enabled(self.config.rate_limit.enabled)
            .with_clock(move || clock())
    }

    fn with_item_validator(&self, builder: PipelineBuilder) -> PipelineBuilder {
        let todos = Arc::clone(&self.todos);
        let urls = self.urls.clone();
        builder.stage(ConditionalMiddleware::with_resolver(
            move |ctx: &MiddlewareContext, _request: &Request| {
                let id = ctx
                    .get_extension::<RouteMatch>()
                    .and_then(|route| route.param("id"))
                    .and_then(|id| id.parse::<TodoId>().ok());
                let todos = Arc::clone(&todos);
                let urls = urls.clone();
                Box::pin(async move {
                    match id {
                        Some(id) => todos
                            .get(id)
                            .await
                            .map(|todo| todo.map(|todo| todo.to_json(&urls))),
                        None => Ok(None),
                    }
                })
            },
        ))
    }
}
