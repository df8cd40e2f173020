//! Redis-backed counter store.
//!
//! Every serving process shares the same counters. `INCR` and `EXPIREAT` are
//! sent as one `MULTI`/`EXEC` transaction, so the pair is indivisible for
//! other clients and an aborted request never leaves a counter without its
//! expiry.

use async_trait::async_trait;
use errand_core::{ErrandError, ErrandResult};
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::warn;

use crate::store::CounterStore;

/// Default bound on a single counter round trip.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Counter store backed by a Redis server.
///
/// The multiplexed connection is opened lazily on first use and shared by
/// all callers afterwards.
pub struct RedisCounterStore {
    client: redis::Client,
    connection: OnceCell<MultiplexedConnection>,
    timeout: Duration,
}

impl RedisCounterStore {
    /// Creates a store for the given `redis://` URL.
    ///
    /// No connection is made until the first increment.
    pub fn open(url: &str) -> ErrandResult<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            ErrandError::store_unavailable_with_source(format!("invalid redis url: {url}"), e)
        })?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Creates a store from host, port and database index.
    pub fn from_parts(host: &str, port: u16, db: i64) -> ErrandResult<Self> {
        Self::open(&format!("redis://{host}:{port}/{db}"))
    }

    /// Sets the I/O timeout for each counter operation.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn connection(&self) -> ErrandResult<MultiplexedConnection> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                self.client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(|e| {
                        ErrandError::store_unavailable_with_source("redis connection failed", e)
                    })
            })
            .await?;
        Ok(connection.clone())
    }

    async fn increment(&self, key: &str, expire_at: u64) -> ErrandResult<u64> {
        let mut connection = self.connection().await?;
        let expire_at = i64::try_from(expire_at)
            .map_err(|_| ErrandError::store_unavailable("expiry timestamp out of range"))?;

        let (count,): (u64,) = redis::pipe()
            .atomic()
            .incr(key, 1u64)
            .expire_at(key, expire_at)
            .ignore()
            .query_async(&mut connection)
            .await
            .map_err(|e| ErrandError::store_unavailable_with_source("redis pipeline failed", e))?;

        Ok(count)
    }
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("connected", &self.connection.initialized())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment_and_expire_at(&self, key: &str, expire_at: u64) -> ErrandResult<u64> {
        match tokio::time::timeout(self.timeout, self.increment(key, expire_at)).await {
            Ok(result) => {
                if let Err(ref e) = result {
                    warn!(error = %e, key, "counter increment failed");
                }
                result
            }
            Err(_) => {
                warn!(key, timeout_ms = self.timeout.as_millis(), "counter increment timed out");
                Err(ErrandError::store_unavailable("redis operation timed out"))
            }
        }
    }
}
