//! Fixed-window rate limiter.

use errand_core::ErrandResult;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::store::CounterStore;

/// Seconds a window's counter outlives its reset, to absorb clock drift.
pub const DEFAULT_EXPIRATION_WINDOW: u64 = 10;

/// Returns the current Unix time in seconds.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// One fixed window, derived from the current time.
///
/// All requests inside the same `per_seconds` bucket share the same `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateWindow {
    /// Maximum admitted requests per window.
    pub limit: u64,
    /// Window length in seconds.
    pub per_seconds: u64,
    /// Smallest multiple of `per_seconds` strictly greater than now.
    pub reset: u64,
    /// Counter key: `key_prefix + reset`.
    pub key: String,
}

impl RateWindow {
    /// Computes the window containing `now`.
    ///
    /// A zero `per_seconds` is treated as one second.
    #[must_use]
    pub fn new(key_prefix: &str, limit: u64, per_seconds: u64, now: u64) -> Self {
        let per_seconds = per_seconds.max(1);
        let reset = (now / per_seconds) * per_seconds + per_seconds;
        Self {
            limit,
            per_seconds,
            reset,
            key: format!("{key_prefix}{reset}"),
        }
    }
}

/// Outcome of one rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Configured limit.
    pub limit: u64,
    /// Requests counted in this window, capped at `limit`.
    pub current: u64,
    /// `limit - current`.
    pub remaining: u64,
    /// Unix time at which the window resets.
    pub reset: u64,
    /// Whether this request exceeds the quota.
    pub over_limit: bool,
}

impl RateLimit {
    /// Seconds until the window resets, never less than one.
    #[must_use]
    pub fn retry_after(&self, now: u64) -> u64 {
        self.reset.saturating_sub(now).max(1)
    }
}

/// Fixed-window rate limiter over an injected [`CounterStore`].
///
/// The limiter itself is stateless; every window lives in the store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    expiration_window: u64,
}

impl RateLimiter {
    /// Creates a limiter with the default expiration window.
    #[must_use]
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            expiration_window: DEFAULT_EXPIRATION_WINDOW,
        }
    }

    /// Sets how long counters outlive their window, in seconds.
    #[must_use]
    pub fn with_expiration_window(mut self, seconds: u64) -> Self {
        self.expiration_window = seconds;
        self
    }

    /// Returns the configured expiration window.
    #[must_use]
    pub fn expiration_window(&self) -> u64 {
        self.expiration_window
    }

    /// Counts one request against `key_prefix` and reports the window state.
    ///
    /// Performs exactly one store increment, so call it at most once per
    /// request and limit. A request is `over_limit` once the capped count
    /// reaches `limit`, so the request that leaves `remaining` at zero is
    /// already rejected.
    pub async fn check(
        &self,
        key_prefix: &str,
        limit: u64,
        per_seconds: u64,
        now: u64,
    ) -> ErrandResult<RateLimit> {
        let window = RateWindow::new(key_prefix, limit, per_seconds, now);
        let raw = self
            .store
            .increment_and_expire_at(&window.key, window.reset + self.expiration_window)
            .await?;

        let current = raw.min(limit);
        let status = RateLimit {
            limit,
            current,
            remaining: limit - current,
            reset: window.reset,
            over_limit: current >= limit,
        };

        debug!(
            key = %window.key,
            count = raw,
            limit,
            remaining = status.remaining,
            over_limit = status.over_limit,
            "rate limit checked"
        );

        Ok(status)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("expiration_window", &self.expiration_window)
            .finish_non_exhaustive()
    }
}
