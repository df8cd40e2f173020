//! Request routing and path matching.
//!
//! Maps a method and path to an [`Operation`], extracting `{param}`
//! segments on the way. Empty segments are ignored, so `/todos` and
//! `/todos/` match the same route.
//!
//! # Example
//!
//! ```rust
//! use errand_api::router::{Operation, RouteOutcome, Router};
//! use http::Method;
//!
//! let mut router = Router::new();
//! router.add_route(Method::GET, "/api/v1.0/todos/{id}", Operation::GetTodo);
//!
//! let RouteOutcome::Matched(m) = router.match_route(&Method::GET, "/api/v1.0/todos/7") else {
//!     panic!("route expected");
//! };
//! assert_eq!(m.operation(), Operation::GetTodo);
//! assert_eq!(m.param("id"), Some("7"));
//! ```

use std::collections::HashMap;

use http::Method;

/// Every operation the service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    /// `GET /todos/`
    ListTodos,
    /// `GET /todos/{id}`
    GetTodo,
    /// `POST /todos/`
    CreateTodo,
    /// `PUT /todos/{id}`
    UpdateTodo,
    /// `DELETE /todos/{id}`
    DeleteTodo,
    /// `GET /auth/request-token`
    RequestToken,
}

impl Operation {
    /// All operations.
    pub const ALL: [Self; 6] = [
        Self::ListTodos,
        Self::GetTodo,
        Self::CreateTodo,
        Self::UpdateTodo,
        Self::DeleteTodo,
        Self::RequestToken,
    ];

    /// Route name used in rate limit keys and configuration.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ListTodos => "get_todos",
            Self::GetTodo => "get_todo",
            Self::CreateTodo => "new_todo",
            Self::UpdateTodo => "edit_todo",
            Self::DeleteTodo => "delete_todo",
            Self::RequestToken => "request_token",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A matched route with extracted path parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    operation: Operation,
    params: HashMap<String, String>,
}

impl RouteMatch {
    /// Creates a new route match.
    #[must_use]
    pub fn new(operation: Operation, params: HashMap<String, String>) -> Self {
        Self { operation, params }
    }

    /// Returns the matched operation.
    #[must_use]
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Returns a specific path parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Result of routing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A route matched path and method.
    Matched(RouteMatch),
    /// The path exists but not for this method.
    MethodNotAllowed(Vec<Method>),
    /// No route has this path.
    NotFound,
}

/// A segment of a path template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone)]
struct Route {
    method: Method,
    segments: Vec<PathSegment>,
    operation: Operation,
}

impl Route {
    fn new(method: Method, pattern: &str, operation: Operation) -> Self {
        Self {
            method,
            segments: Self::parse_segments(pattern),
            operation,
        }
    }

    fn parse_segments(pattern: &str) -> Vec<PathSegment> {
        pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => PathSegment::Param(name.to_string()),
                None => PathSegment::Literal(s.to_string()),
            })
            .collect()
    }

    fn match_path(&self, segments: &[&str]) -> Option<HashMap<String, String>> {
        if segments.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (pattern, actual) in self.segments.iter().zip(segments) {
            match pattern {
                PathSegment::Literal(expected) => {
                    if expected != actual {
                        return None;
                    }
                }
                PathSegment::Param(name) => {
                    params.insert(name.clone(), (*actual).to_string());
                }
            }
        }
        Some(params)
    }
}

/// HTTP request router. Routes are checked in registration order; the
/// first match wins.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Creates a new empty router.
    #[must_use]
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Adds a route. `pattern` uses `{name}` for parameters.
    pub fn add_route(&mut self, method: Method, pattern: impl AsRef<str>, operation: Operation) {
        self.routes
            .push(Route::new(method, pattern.as_ref(), operation));
    }

    /// Returns the number of registered routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Matches an incoming request.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> RouteOutcome {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut allowed = Vec::new();

        for route in &self.routes {
            let Some(params) = route.match_path(&segments) else {
                continue;
            };
            if route.method == *method {
                return RouteOutcome::Matched(RouteMatch::new(route.operation, params));
            }
            if !allowed.contains(&route.method) {
                allowed.push(route.method.clone());
            }
        }

        if allowed.is_empty() {
            RouteOutcome::NotFound
        } else {
            RouteOutcome::MethodNotAllowed(allowed)
        }
    }

    /// Returns all registered operations.
    pub fn operations(&self) -> impl Iterator<Item = Operation> + '_ {
        self.routes.iter().map(|r| r.operation)
    }
}
