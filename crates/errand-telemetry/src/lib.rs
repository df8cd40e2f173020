//! Structured logging for Errand.
//!
//! Every crate in the workspace logs through `tracing` macros with
//! structured fields; this crate installs the subscriber that renders
//! them. Output is JSON lines by default and a human-readable layout for
//! development.
//!
//! ```text
//! {"timestamp":"..","level":"WARN","fields":{"message":"rate limit exceeded",
//!  "request_id":"0190..","limit":"5"},"target":"errand_middleware::stages::rate_limit"}
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use errand_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(request_id = %id, "request started");
//! ```
//!
//! `RUST_LOG`, when set, takes precedence over [`LogConfig::level`].

#![warn(missing_docs)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, fields, init_logging, LogConfig, LogFormat};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
