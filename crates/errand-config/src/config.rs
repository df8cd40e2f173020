//! Main configuration types.
//!
//! This module provides the top-level [`ErrandConfig`] struct.

use errand_auth::CredentialKind;
use errand_telemetry::{create_env_filter, LogConfig};
use serde::{Deserialize, Serialize};

use crate::{AuthConfig, ConfigError, PaginationConfig, RateLimitConfig, RedisConfig, ServerConfig};

/// Complete Errand service configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use errand_config::ErrandConfig;
///
/// let config = ErrandConfig::default();
/// assert_eq!(config.server.api_prefix, "/api/v1.0");
/// assert!(!config.rate_limit.enabled);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct ErrandConfig {
    /// Route layout and public URL.
    #[serde(default)]
    pub server: ServerConfig,

    /// Token signing and credential kinds.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Rate limit quotas.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Page sizes.
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Counter store connection.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LogConfig,
}

impl ErrandConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first problem found:
    /// - `auth.secret_key` is empty
    /// - `auth.methods` is empty or `auth.token_expiry_secs` is zero
    /// - `server.api_prefix` does not start with `/` or ends with `/`
    /// - `server.public_url` is not an `http(s)://` origin
    /// - a rate limit rule has a zero limit or window
    /// - page sizes are zero or `default_per_page > max_per_page`
    /// - `logging.level` is not a valid filter directive
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.secret_key.is_empty() {
            return Err(ConfigError::missing_field("auth.secret_key"));
        }
        if self.auth.methods.is_empty() {
            return Err(ConfigError::invalid_value(
                "auth.methods",
                "at least one credential kind must be enabled",
            ));
        }
        if self.auth.token_expiry_secs == 0 {
            return Err(ConfigError::invalid_value(
                "auth.token_expiry_secs",
                "must be greater than zero",
            ));
        }

        let prefix = &self.server.api_prefix;
        if !prefix.starts_with('/') || (prefix.len() > 1 && prefix.ends_with('/')) {
            return Err(ConfigError::invalid_value(
                "server.api_prefix",
                format!("must start with '/' and not end with '/': {prefix}"),
            ));
        }

        let url = &self.server.public_url;
        let origin = url
            .strip_prefix("http://")
            .or_else(|| url.strip_prefix("https://"));
        if origin.map_or(true, |host| host.is_empty() || host.contains('/')) {
            return Err(ConfigError::invalid_value(
                "server.public_url",
                format!("expected an origin like http://host:port, got {url}"),
            ));
        }

        let rules = self
            .rate_limit
            .global
            .iter()
            .map(|rule| ("rate_limit.global".to_string(), rule))
            .chain(
                self.rate_limit
                    .routes
                    .iter()
                    .map(|(name, rule)| (format!("rate_limit.routes.{name}"), rule)),
            );
        for (field, rule) in rules {
            if rule.limit == 0 || rule.per_seconds == 0 {
                return Err(ConfigError::invalid_value(
                    field,
                    "limit and per_seconds must be greater than zero",
                ));
            }
        }

        let pagination = &self.pagination;
        if pagination.default_per_page == 0 || pagination.max_per_page == 0 {
            return Err(ConfigError::invalid_value(
                "pagination",
                "page sizes must be greater than zero",
            ));
        }
        if pagination.default_per_page > pagination.max_per_page {
            return Err(ConfigError::invalid_value(
                "pagination.default_per_page",
                "must not exceed pagination.max_per_page",
            ));
        }

        if let Err(e) = create_env_filter(&self.logging.level) {
            return Err(ConfigError::invalid_value("logging.level", e.to_string()));
        }

        Ok(())
    }

    /// Create a development configuration preset.
    ///
    /// - Fixed development signing key
    /// - Pretty, debug-level logs
    /// - Rate limits enabled with in-memory counters
    ///
    /// # Example
    ///
    /// ```
    /// use errand_config::ErrandConfig;
    ///
    /// let config = ErrandConfig::development();
    /// assert!(config.validate().is_ok());
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.server.public_url = "http://localhost:5000".to_string();
        config.auth.secret_key = "development secret".to_string();
        config.rate_limit.enabled = true;
        config.logging = LogConfig::development();
        config
    }

    /// Returns `true` if token credentials are accepted.
    #[must_use]
    pub fn token_auth_enabled(&self) -> bool {
        self.auth.methods.contains(&CredentialKind::Token)
    }
}
