//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use std::collections::BTreeMap;

use errand_auth::CredentialKind;
use serde::{Deserialize, Serialize};

/// Server configuration section.
///
/// # Example
///
/// ```
/// use errand_config::ServerConfig;
///
/// let config = ServerConfig::default();
/// assert_eq!(config.api_prefix, "/api/v1.0");
/// assert_eq!(config.public_url, "http://localhost");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Path prefix of every API route, without a trailing slash.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Externally visible origin used to build `Location` and page links.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_prefix: default_api_prefix(),
            public_url: default_public_url(),
        }
    }
}

fn default_api_prefix() -> String {
    "/api/v1.0".to_string()
}

fn default_public_url() -> String {
    "http://localhost".to_string()
}

/// Authentication configuration section.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// HMAC key for signing tokens. Required.
    #[serde(default)]
    pub secret_key: String,

    /// Token lifetime in seconds.
    #[serde(default = "default_token_expiry")]
    pub token_expiry_secs: u64,

    /// Enabled credential kinds. Tried token first, then password.
    #[serde(default = "default_methods")]
    pub methods: Vec<CredentialKind>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            token_expiry_secs: default_token_expiry(),
            methods: default_methods(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret_key", &"<redacted>")
            .field("token_expiry_secs", &self.token_expiry_secs)
            .field("methods", &self.methods)
            .finish()
    }
}

fn default_token_expiry() -> u64 {
    errand_auth::DEFAULT_TOKEN_EXPIRY_SECS
}

fn default_methods() -> Vec<CredentialKind> {
    vec![CredentialKind::Token, CredentialKind::Password]
}

/// One fixed-window quota: `limit` requests per `per_seconds`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RateLimitRule {
    /// Requests admitted per window.
    pub limit: u64,
    /// Window length in seconds.
    pub per_seconds: u64,
}

impl RateLimitRule {
    /// Creates a rule.
    #[must_use]
    pub const fn new(limit: u64, per_seconds: u64) -> Self {
        Self { limit, per_seconds }
    }
}

/// Rate limiting configuration section.
///
/// Route rules are keyed by route name (`get_todos`, `get_todo`,
/// `new_todo`, `edit_todo`, `delete_todo`, `request_token`).
///
/// ```toml
/// [rate_limit]
/// enabled = true
///
/// [rate_limit.global]
/// limit = 5
/// per_seconds = 15
///
/// [rate_limit.routes.new_todo]
/// limit = 2
/// per_seconds = 60
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Whether rate limit stages are active at all.
    #[serde(default)]
    pub enabled: bool,

    /// Per-principal quota applied to every authenticated route.
    #[serde(default = "default_global_rule")]
    pub global: Option<RateLimitRule>,

    /// Additional per-route quotas.
    #[serde(default)]
    pub routes: BTreeMap<String, RateLimitRule>,

    /// Seconds a counter outlives its window.
    #[serde(default = "default_expiration_window")]
    pub expiration_window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            global: default_global_rule(),
            routes: BTreeMap::new(),
            expiration_window_secs: default_expiration_window(),
        }
    }
}

impl RateLimitConfig {
    /// Returns the rule configured for `route`, if any.
    #[must_use]
    pub fn route(&self, route: &str) -> Option<RateLimitRule> {
        self.routes.get(route).copied()
    }
}

#[allow(clippy::unnecessary_wraps)]
fn default_global_rule() -> Option<RateLimitRule> {
    Some(RateLimitRule::new(5, 15))
}

fn default_expiration_window() -> u64 {
    10
}

/// Pagination configuration section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PaginationConfig {
    /// Page size when the client does not ask for one.
    #[serde(default = "default_per_page")]
    pub default_per_page: u64,

    /// Upper bound on client-requested page sizes.
    #[serde(default = "default_max_per_page")]
    pub max_per_page: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_per_page: default_per_page(),
            max_per_page: default_max_per_page(),
        }
    }
}

fn default_per_page() -> u64 {
    10
}

fn default_max_per_page() -> u64 {
    100
}

/// Counter store backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CounterBackend {
    /// Process-local counters.
    #[default]
    Memory,
    /// Counters shared through Redis.
    Redis,
}

/// Redis connection settings for the shared counter store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RedisConfig {
    /// Which counter store to use.
    #[serde(default)]
    pub backend: CounterBackend,

    /// Redis host.
    #[serde(default = "default_redis_host")]
    pub host: String,

    /// Redis port.
    #[serde(default = "default_redis_port")]
    pub port: u16,

    /// Redis logical database.
    #[serde(default)]
    pub db: i64,

    /// Upper bound on one increment round trip, in milliseconds.
    #[serde(default = "default_redis_timeout")]
    pub timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            backend: CounterBackend::Memory,
            host: default_redis_host(),
            port: default_redis_port(),
            db: 0,
            timeout_ms: default_redis_timeout(),
        }
    }
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_redis_timeout() -> u64 {
    500
}
