//! Typed configuration for the Errand service.
//!
//! - TOML and JSON configuration files
//! - `.env` files and environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Overview
//!
//! [`ErrandConfig`] holds every section:
//!
//! - [`ServerConfig`] - API prefix and public URL
//! - [`AuthConfig`] - token signing key, lifetime and credential kinds
//! - [`RateLimitConfig`] - global and per-route quotas
//! - [`PaginationConfig`] - page sizes
//! - [`RedisConfig`] - counter store backend
//! - `logging` - an [`errand_telemetry::LogConfig`]
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! api_prefix = "/api/v1.0"
//! public_url = "http://localhost:5000"
//!
//! [auth]
//! secret_key = "change me"
//! token_expiry_secs = 3600
//! methods = ["token", "password"]
//!
//! [rate_limit]
//! enabled = true
//!
//! [rate_limit.global]
//! limit = 5
//! per_seconds = 15
//!
//! [redis]
//! backend = "redis"
//! host = "localhost"
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! With [`ConfigLoader::with_env_prefix`], variables of the form
//! `PREFIX__SECTION__KEY` override file values:
//!
//! - `ERRAND__AUTH__SECRET_KEY=...`
//! - `ERRAND__RATE_LIMIT__ENABLED=true`
//! - `ERRAND__RATE_LIMIT__ROUTES__NEW_TODO__LIMIT=2`
//!
//! [`ConfigLoader::with_legacy_env`] additionally maps `SECRET_KEY`,
//! `USE_TOKEN_AUTH`, `USE_RATE_LIMITS` and `REDIS_HOST`/`PORT`/`DB`.

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::ErrandConfig;
pub use error::ConfigError;
pub use errand_telemetry::{LogConfig, LogFormat};
pub use loader::{ConfigLoader, LEGACY_VARS};
pub use schema::*;
