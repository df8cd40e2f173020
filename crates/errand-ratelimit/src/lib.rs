//! # Errand Rate Limit
//!
//! Fixed-window rate limiting built on an atomic increment-with-expiry
//! primitive.
//!
//! ## Algorithm
//!
//! Time is cut into windows of `per_seconds`. Every request inside a window
//! increments the same counter, keyed by the window's reset timestamp:
//!
//! ```text
//! reset = floor(now / per) * per + per
//! key   = key_prefix + reset
//! ```
//!
//! A new window means a new key, so counters never need an explicit reset.
//! Each key expires `expiration_window` seconds after its reset so that
//! stragglers with skewed clocks still read the previous count.
//!
//! ## Stores
//!
//! - [`InMemoryCounterStore`] - mutex-guarded map, used in tests and
//!   single-process deployments
//! - `RedisCounterStore` - `MULTI`/`EXEC` pipeline of `INCR` + `EXPIREAT`
//!   shared by every serving process (feature `redis`)
//!
//! ## Example
//!
//! ```
//! use errand_ratelimit::{InMemoryCounterStore, RateLimiter};
//! use std::sync::Arc;
//!
//! # tokio_test_block(async {
//! let limiter = RateLimiter::new(Arc::new(InMemoryCounterStore::new()));
//! let status = limiter.check("rate-limit/42/", 2, 60, 1_000).await.unwrap();
//! assert_eq!(status.current, 1);
//! assert_eq!(status.remaining, 1);
//! assert!(!status.over_limit);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/errand-ratelimit/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod limiter;
#[cfg(feature = "redis")]
mod redis_store;
mod store;

pub use limiter::{unix_now, RateLimit, RateLimiter, RateWindow, DEFAULT_EXPIRATION_WINDOW};
#[cfg(feature = "redis")]
pub use redis_store::RedisCounterStore;
pub use store::{CounterStore, InMemoryCounterStore};
