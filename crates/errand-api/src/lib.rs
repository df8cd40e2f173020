//! # Errand API
//!
//! The todo resource, served through per-route middleware pipelines.
//!
//! This crate wires the pieces from the rest of the workspace into a
//! request-in, response-out service:
//!
//! - [`router`] maps method and path to an [`Operation`]
//! - [`app`] builds one [`Pipeline`](errand_middleware::Pipeline) per route
//!   from an [`ErrandConfig`](errand_config::ErrandConfig)
//! - [`handlers`] implement the CRUD operations and token issuance
//! - [`repository`] stores todos
//!
//! No listener is bound here. [`App::handle`] takes an `http::Request` and
//! returns an `http::Response`; any HTTP server can carry them.
//!
//! ## Example
//!
//! ```rust
//! use errand_api::App;
//! use errand_config::ErrandConfig;
//!
//! # tokio_test::block_on(async {
//! let app = App::from_config(ErrandConfig::development()).unwrap();
//!
//! let request = http::Request::get("/api/v1.0/todos/")
//!     .body(http_body_util::Full::new(bytes::Bytes::new()))
//!     .unwrap();
//! let response = app.handle(request).await;
//! assert_eq!(response.status(), http::StatusCode::UNAUTHORIZED);
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/errand-api/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod app;
mod error;
pub mod handlers;
pub mod repository;
pub mod router;
pub mod todo;

pub use app::{App, AppBuilder, GLOBAL_LIMIT_NAME, TOKEN_PATH};
pub use error::{AppError, AppResult};
pub use handlers::AppState;
pub use repository::{InMemoryTodoRepository, TodoRepository};
pub use router::{Operation, RouteMatch, RouteOutcome, Router};
pub use todo::{ResourceUrls, Todo, TodoId, TodoInput};
