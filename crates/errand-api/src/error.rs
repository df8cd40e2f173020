//! Application assembly errors.

use errand_config::ConfigError;
use errand_core::ErrandError;
use thiserror::Error;

/// Errors raised while building an [`App`](crate::App).
///
/// Request-time failures never surface here; they are rendered as
/// responses by the pipeline.
#[derive(Debug, Error)]
pub enum AppError {
    /// The configuration failed to load or validate.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The configured counter store could not be opened.
    #[error("counter store unavailable: {0}")]
    CounterStore(#[source] ErrandError),
}

/// Result alias for application assembly.
pub type AppResult<T> = Result<T, AppError>;
