//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, `.env` and environment variables.

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use errand_auth::CredentialKind;
use errand_telemetry::LogFormat;

use crate::{ConfigError, CounterBackend, ErrandConfig, RateLimitRule};

/// Unprefixed variables understood by [`ConfigLoader::with_legacy_env`].
pub const LEGACY_VARS: &[&str] = &[
    "SECRET_KEY",
    "USE_TOKEN_AUTH",
    "USE_RATE_LIMITS",
    "REDIS_HOST",
    "REDIS_PORT",
    "REDIS_DB",
];

/// Configuration loader with layered approach.
///
/// Later layers override earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. `.env` file, loaded into the process environment
/// 4. Legacy flat variables (`SECRET_KEY`, `USE_RATE_LIMITS`, ...), if enabled
/// 5. Prefixed variables (`ERRAND__SECTION__KEY`)
///
/// # Example
///
/// ```no_run
/// use errand_config::ConfigLoader;
///
/// # fn main() -> Result<(), errand_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("errand.toml")?
///     .with_dotenv()?
///     .with_legacy_env()
///     .with_env_prefix("ERRAND")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: ErrandConfig,
    env_prefix: Option<String>,
    legacy_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ErrandConfig::default(),
            env_prefix: None,
            legacy_env: false,
        }
    }

    /// Start with the development preset instead of the defaults.
    ///
    /// # Example
    ///
    /// ```
    /// use errand_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_development()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = ErrandConfig::development();
        self
    }

    /// Load configuration from a file.
    ///
    /// The format is chosen by extension: `.toml` or `.json`. Sections
    /// missing from the file keep their defaults; unknown fields are errors.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        Ok(self)
    }

    /// Load configuration from a file if it exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string.
    ///
    /// # Example
    ///
    /// ```
    /// use errand_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [auth]
    ///     secret_key = "s3cr3t"
    ///
    ///     [pagination]
    ///     default_per_page = 25
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.pagination.default_per_page, 25);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        Ok(self)
    }

    /// Load `.env` from the working directory into the process environment.
    ///
    /// A missing `.env` is not an error.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(e.into()),
        }
    }

    /// Load a specific env file into the process environment.
    pub fn with_dotenv_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        dotenvy::from_path(path.as_ref())?;
        Ok(self)
    }

    /// Also honour the unprefixed [`LEGACY_VARS`].
    #[must_use]
    pub fn with_legacy_env(mut self) -> Self {
        self.legacy_env = true;
        self
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Variables use the format `PREFIX__SECTION__KEY`, e.g.
    /// `ERRAND__RATE_LIMIT__ENABLED=true` or
    /// `ERRAND__RATE_LIMIT__ROUTES__NEW_TODO__LIMIT=2`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Apply environment overrides, validate and return the configuration.
    pub fn load(mut self) -> Result<ErrandConfig, ConfigError> {
        if self.legacy_env || self.env_prefix.is_some() {
            let mut vars: Vec<(String, String)> = env::vars().collect();
            vars.sort();
            self.apply_vars(&vars)?;
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Return the configuration without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> ErrandConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<ErrandConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    fn apply_vars(&mut self, vars: &[(String, String)]) -> Result<(), ConfigError> {
        if self.legacy_env {
            for (key, value) in vars {
                self.apply_legacy_var(key, value)?;
            }
        }
        if let Some(prefix) = self.env_prefix.clone() {
            let marker = format!("{prefix}__");
            for (key, value) in vars.iter().filter(|(k, _)| k.starts_with(&marker)) {
                self.apply_env_var(key, value, &prefix)?;
            }
        }
        Ok(())
    }

    fn apply_legacy_var(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "SECRET_KEY" => self.config.auth.secret_key = value.to_string(),
            "USE_TOKEN_AUTH" => {
                let methods = &mut self.config.auth.methods;
                methods.retain(|kind| *kind != CredentialKind::Token);
                if parse_bool_var(key, value)? {
                    methods.insert(0, CredentialKind::Token);
                }
                if !methods.contains(&CredentialKind::Password) {
                    methods.push(CredentialKind::Password);
                }
            }
            "USE_RATE_LIMITS" => self.config.rate_limit.enabled = parse_bool_var(key, value)?,
            "REDIS_HOST" => {
                self.config.redis.host = value.to_string();
                self.config.redis.backend = CounterBackend::Redis;
            }
            "REDIS_PORT" => self.config.redis.port = parse_var(key, value)?,
            "REDIS_DB" => self.config.redis.db = parse_var(key, value)?,
            _ => {}
        }
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            // Server section
            ["SERVER", "API_PREFIX"] => config.server.api_prefix = value.to_string(),
            ["SERVER", "PUBLIC_URL"] => config.server.public_url = value.to_string(),

            // Auth section
            ["AUTH", "SECRET_KEY"] => config.auth.secret_key = value.to_string(),
            ["AUTH", "TOKEN_EXPIRY_SECS"] => config.auth.token_expiry_secs = parse_var(key, value)?,
            ["AUTH", "METHODS"] => config.auth.methods = parse_methods(key, value)?,

            // Rate limit section
            ["RATE_LIMIT", "ENABLED"] => config.rate_limit.enabled = parse_bool_var(key, value)?,
            ["RATE_LIMIT", "EXPIRATION_WINDOW_SECS"] => {
                config.rate_limit.expiration_window_secs = parse_var(key, value)?;
            }
            ["RATE_LIMIT", "GLOBAL"] if value.eq_ignore_ascii_case("none") => {
                config.rate_limit.global = None;
            }
            ["RATE_LIMIT", "GLOBAL", field] => {
                let rule = config
                    .rate_limit
                    .global
                    .get_or_insert(RateLimitRule::new(5, 15));
                set_rule_field(rule, field, key, value)?;
            }
            ["RATE_LIMIT", "ROUTES", route, field] => {
                let template = config.rate_limit.global.unwrap_or(RateLimitRule::new(5, 15));
                let rule = config
                    .rate_limit
                    .routes
                    .entry(route.to_lowercase())
                    .or_insert(template);
                set_rule_field(rule, field, key, value)?;
            }

            // Pagination section
            ["PAGINATION", "DEFAULT_PER_PAGE"] => {
                config.pagination.default_per_page = parse_var(key, value)?;
            }
            ["PAGINATION", "MAX_PER_PAGE"] => config.pagination.max_per_page = parse_var(key, value)?,

            // Redis section
            ["REDIS", "BACKEND"] => {
                config.redis.backend = match value.to_lowercase().as_str() {
                    "memory" => CounterBackend::Memory,
                    "redis" => CounterBackend::Redis,
                    _ => return Err(ConfigError::env_parse_error(key, "expected 'memory' or 'redis'")),
                };
            }
            ["REDIS", "HOST"] => config.redis.host = value.to_string(),
            ["REDIS", "PORT"] => config.redis.port = parse_var(key, value)?,
            ["REDIS", "DB"] => config.redis.db = parse_var(key, value)?,
            ["REDIS", "TIMEOUT_MS"] => config.redis.timeout_ms = parse_var(key, value)?,

            // Logging section
            ["LOGGING", "ENABLED"] => config.logging.enabled = parse_bool_var(key, value)?,
            ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                config.logging.format = value
                    .parse::<LogFormat>()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected 'json' or 'pretty'"))?;
            }

            // Unknown key - ignore
            _ => {}
        }

        Ok(())
    }
}

fn set_rule_field(
    rule: &mut RateLimitRule,
    field: &str,
    key: &str,
    value: &str,
) -> Result<(), ConfigError> {
    match field {
        "LIMIT" => rule.limit = parse_var(key, value)?,
        "PER_SECONDS" => rule.per_seconds = parse_var(key, value)?,
        _ => return Err(ConfigError::env_parse_error(key, "expected LIMIT or PER_SECONDS")),
    }
    Ok(())
}

fn parse_methods(key: &str, value: &str) -> Result<Vec<CredentialKind>, ConfigError> {
    let mut methods = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.to_lowercase().as_str() {
            "token" => Ok(CredentialKind::Token),
            "password" => Ok(CredentialKind::Password),
            _ => Err(ConfigError::env_parse_error(
                key,
                format!("unknown credential kind '{s}'"),
            )),
        })
        .collect::<Result<Vec<_>, _>>()?;
    methods.sort();
    methods.dedup();
    Ok(methods)
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn parse_bool_var(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_loader_defaults_need_secret() {
        assert!(matches!(
            ConfigLoader::new().load(),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_loader_with_development() {
        let config = ConfigLoader::new().with_development().load().unwrap();
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.rate_limit.enabled);
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"auth": {"secret_key": "k"}, "server": {"public_url": "http://api.test"}}"#;

        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.server.public_url, "http://api.test");
        assert_eq!(config.server.api_prefix, "/api/v1.0");
    }

    #[test]
    fn test_loader_unknown_field() {
        let result = ConfigLoader::new().with_string("[server]\nhttp_addr = \"x\"", "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_loader_unsupported_format() {
        let result = ConfigLoader::new().with_string("a: b", "yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_loader_with_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [auth]
            secret_key = "from-file"
            methods = ["password"]

            [rate_limit]
            enabled = true

            [rate_limit.routes.get_todos]
            limit = 3
            per_seconds = 30
            "#
        )
        .unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(config.auth.secret_key, "from-file");
        assert_eq!(config.auth.methods, vec![CredentialKind::Password]);
        assert_eq!(config.rate_limit.route("get_todos"), Some(RateLimitRule::new(3, 30)));
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/errand.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/errand.toml")
            .unwrap()
            .load_unvalidated();
        assert_eq!(config, ErrandConfig::default());
    }

    #[test]
    fn test_dotenv_file_missing() {
        let result = ConfigLoader::new().with_dotenv_file("/nonexistent/.env");
        assert!(matches!(result, Err(ConfigError::DotenvError(_))));
    }

    #[test]
    fn test_parse_bool() {
        for value in ["true", "True", "1", "yes", "on"] {
            assert_eq!(parse_bool(value), Some(true));
        }
        for value in ["false", "FALSE", "0", "no", "off"] {
            assert_eq!(parse_bool(value), Some(false));
        }
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    // Variables are injected through apply_vars rather than set_var so
    // tests stay independent of the process environment.

    #[test]
    fn test_prefixed_overrides() {
        let mut loader = ConfigLoader::new().with_env_prefix("errand");
        loader
            .apply_vars(&vars(&[
                ("ERRAND__AUTH__SECRET_KEY", "env-secret"),
                ("ERRAND__AUTH__METHODS", "password, token"),
                ("ERRAND__RATE_LIMIT__ENABLED", "yes"),
                ("ERRAND__RATE_LIMIT__GLOBAL__LIMIT", "50"),
                ("ERRAND__RATE_LIMIT__ROUTES__NEW_TODO__LIMIT", "2"),
                ("ERRAND__PAGINATION__MAX_PER_PAGE", "20"),
                ("ERRAND__REDIS__BACKEND", "redis"),
                ("ERRAND__LOGGING__FORMAT", "pretty"),
                ("OTHER__AUTH__SECRET_KEY", "ignored"),
            ]))
            .unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.auth.secret_key, "env-secret");
        assert_eq!(
            config.auth.methods,
            vec![CredentialKind::Token, CredentialKind::Password]
        );
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.global, Some(RateLimitRule::new(50, 15)));
        assert_eq!(config.rate_limit.route("new_todo"), Some(RateLimitRule::new(2, 15)));
        assert_eq!(config.pagination.max_per_page, 20);
        assert_eq!(config.redis.backend, CounterBackend::Redis);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_global_limit_can_be_removed() {
        let mut loader = ConfigLoader::new().with_env_prefix("ERRAND");
        loader
            .apply_vars(&vars(&[("ERRAND__RATE_LIMIT__GLOBAL", "none")]))
            .unwrap();
        assert_eq!(loader.load_unvalidated().rate_limit.global, None);
    }

    #[test]
    fn test_invalid_override() {
        let mut loader = ConfigLoader::new().with_env_prefix("ERRAND");
        let result = loader.apply_vars(&vars(&[("ERRAND__REDIS__PORT", "not-a-number")]));
        assert!(matches!(result, Err(ConfigError::EnvParseError { .. })));

        let result = loader.apply_vars(&vars(&[("ERRAND__AUTH__METHODS", "oauth")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_legacy_flags() {
        let mut loader = ConfigLoader::new().with_legacy_env();
        loader
            .apply_vars(&vars(&[
                ("SECRET_KEY", "legacy"),
                ("USE_TOKEN_AUTH", "false"),
                ("USE_RATE_LIMITS", "true"),
                ("REDIS_HOST", "cache"),
                ("REDIS_PORT", "6380"),
                ("REDIS_DB", "2"),
            ]))
            .unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.auth.secret_key, "legacy");
        assert_eq!(config.auth.methods, vec![CredentialKind::Password]);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.redis.backend, CounterBackend::Redis);
        assert_eq!((config.redis.host.as_str(), config.redis.port, config.redis.db), ("cache", 6380, 2));
    }

    #[test]
    fn test_prefixed_wins_over_legacy() {
        let mut loader = ConfigLoader::new().with_legacy_env().with_env_prefix("ERRAND");
        loader
            .apply_vars(&vars(&[
                ("ERRAND__AUTH__SECRET_KEY", "prefixed"),
                ("SECRET_KEY", "legacy"),
            ]))
            .unwrap();
        assert_eq!(loader.load_unvalidated().auth.secret_key, "prefixed");
    }

    #[test]
    fn test_complete_toml_config() {
        let toml = r#"
            [server]
            api_prefix = "/api/v2"
            public_url = "https://todo.example.com"

            [auth]
            secret_key = "k"
            token_expiry_secs = 600
            methods = ["token", "password"]

            [rate_limit]
            enabled = true
            expiration_window_secs = 5

            [rate_limit.global]
            limit = 100
            per_seconds = 60

            [pagination]
            default_per_page = 5
            max_per_page = 50

            [redis]
            backend = "redis"
            host = "redis.internal"
            port = 6379
            db = 1
            timeout_ms = 250

            [logging]
            level = "errand_middleware=debug,info"
            format = "json"
        "#;

        let config = ConfigLoader::new()
            .with_string(toml, "toml")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.server.api_prefix, "/api/v2");
        assert_eq!(config.auth.token_expiry_secs, 600);
        assert_eq!(config.rate_limit.expiration_window_secs, 5);
        assert_eq!(config.rate_limit.global, Some(RateLimitRule::new(100, 60)));
        assert_eq!(config.pagination.default_per_page, 5);
        assert_eq!(config.redis.host, "redis.internal");
        assert_eq!(config.redis.timeout_ms, 250);
    }
}
