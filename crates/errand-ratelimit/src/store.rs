//! Atomic counter stores.

use async_trait::async_trait;
use errand_core::ErrandResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::limiter::unix_now;

/// Atomic increment-with-expiry primitive backing the rate limiter.
///
/// # Invariants
///
/// - The increment and the expiry update are applied as one unit; a
///   concurrent caller never observes one without the other
/// - Every call is counted exactly once
/// - The store never rejects an increment, it only reports the new count
#[async_trait]
pub trait CounterStore: Send + Sync + 'static {
    /// Increments `key` and schedules it to expire at `expire_at`
    /// (Unix seconds). Returns the count after the increment.
    async fn increment_and_expire_at(&self, key: &str, expire_at: u64) -> ErrandResult<u64>;
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    count: u64,
    expire_at: u64,
}

/// In-process counter store.
///
/// All counters live behind one mutex; increment, expiry update and the
/// purge of expired keys happen in a single critical section. Expired keys
/// are treated as absent and removed lazily.
pub struct InMemoryCounterStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Fn() -> u64 + Send + Sync>,
}

impl InMemoryCounterStore {
    /// Creates an empty store that reads the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(unix_now)
    }

    /// Creates an empty store with a custom clock (Unix seconds).
    #[must_use]
    pub fn with_clock<F>(clock: F) -> Self
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock: Arc::new(clock),
        }
    }

    /// Returns the live count for `key`, or `None` if absent or expired.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<u64> {
        let now = (self.clock)();
        self.entries
            .lock()
            .get(key)
            .filter(|entry| entry.expire_at > now)
            .map(|entry| entry.count)
    }

    /// Returns the number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = (self.clock)();
        self.entries
            .lock()
            .values()
            .filter(|entry| entry.expire_at > now)
            .count()
    }

    /// Returns `true` if no live keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn increment_locked(&self, key: &str, expire_at: u64) -> u64 {
        let now = (self.clock)();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| entry.expire_at > now);

        let entry = entries.entry(key.to_string()).or_insert(Entry {
            count: 0,
            expire_at,
        });
        entry.count += 1;
        entry.expire_at = expire_at;
        entry.count
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCounterStore")
            .field("keys", &self.entries.lock().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment_and_expire_at(&self, key: &str, expire_at: u64) -> ErrandResult<u64> {
        Ok(self.increment_locked(key, expire_at))
    }
}
