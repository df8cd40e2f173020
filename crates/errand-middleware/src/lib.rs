//! # Errand Middleware
//!
//! Composable request pipeline for the Errand todo service.
//!
//! Every route owns a [`Pipeline`]: an ordered list of [`Middleware`] stages
//! wrapped around the route handler. The first stage added is the outermost;
//! each stage may inspect the request, short-circuit with its own response,
//! or call [`Next::run`] and post-process what comes back.
//!
//! ```text
//! Request → RequestId → ErrorNorm → Auth → RateLimit → Conditional → Handler
//!                                                                      ↓
//! Response ←─────────────── (same stages, reverse order) ←─────────────┘
//! ```
//!
//! Besides the stages themselves this crate holds the pure building blocks
//! they use: [`conditional`] (ETags and precondition evaluation) and
//! [`pagination`] (page slicing and navigation links).
//!
//! ## Example
//!
//! ```
//! use errand_middleware::stages::{ErrorNormalizationMiddleware, RequestIdMiddleware};
//! use errand_middleware::Pipeline;
//!
//! let pipeline = Pipeline::builder()
//!     .stage(RequestIdMiddleware::new())
//!     .stage(ErrorNormalizationMiddleware::new())
//!     .build();
//!
//! assert_eq!(pipeline.stage_names(), vec!["request_id", "error_normalization"]);
//! ```

#![doc(html_root_url = "https://docs.rs/errand-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod conditional;
pub mod context;
pub mod middleware;
pub mod pagination;
pub mod pipeline;
pub mod stages;
pub mod types;

// Re-export main types at crate root
pub use conditional::{evaluate, ETag, Precondition, ValidatorList};
pub use context::MiddlewareContext;
pub use middleware::{BoxFuture, FnMiddleware, Middleware, Next};
pub use pagination::{paginate, Page, PageMeta, PageRequest, Paginator};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use types::{body_bytes, into_parts_bytes, Request, Response, ResponseExt, BASIC_CHALLENGE};
