//! Redis cache backend.
//!
//! Uses `ConnectionManager`, which provides:
//! - Automatic reconnection on connection loss
//! - Connection multiplexing for concurrent calls
//!
//! Reads use one `MGET`; a failed read is a full miss. Writes are pipelined
//! `SET`s with an optional `PX` expiry and are best-effort. Deletes use one
//! `DEL`, whose failure is returned to the committing caller.

use std::time::Duration;

use async_trait::async_trait;
use cirrus_core::{CacheError, Cacher, CallContext, Key};
use redis::aio::ConnectionManager;
use redis::{Client, RedisResult};
use tracing::{debug, instrument, warn};

const BACKEND: &str = "redis";

/// Largest `PX` sent; Redis rejects expiries that overflow its clock.
const MAX_PX_MILLIS: u64 = i64::MAX as u64 / 2;

/// `PX` argument for `expiration`: at least 1ms, or `None` when it is too
/// long for Redis and the item should not expire.
fn px_millis(expiration: Duration) -> Option<u64> {
    let millis = u64::try_from(expiration.as_millis()).unwrap_or(u64::MAX);
    (millis <= MAX_PX_MILLIS).then_some(millis.max(1))
}

/// Redis-backed [`Cacher`].
#[derive(Clone)]
pub struct RedisCacher {
    connection: ConnectionManager,
    expiration: Option<Duration>,
    key_prefix: String,
}

impl RedisCacher {
    /// Connect to `url` (e.g. `redis://127.0.0.1/`).
    pub async fn connect(url: &str, expiration: Option<Duration>) -> Result<Self, CacheError> {
        let client = Client::open(url)
            .map_err(|e| CacheError::backend(BACKEND, format!("Failed to create client: {e}")))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::backend(BACKEND, format!("Failed to connect: {e}")))?;
        Ok(Self::from_connection(connection, expiration))
    }

    pub fn from_connection(connection: ConnectionManager, expiration: Option<Duration>) -> Self {
        Self {
            connection,
            expiration,
            key_prefix: String::new(),
        }
    }

    /// Prefix every cache key, to share one Redis database between applications.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn redis_key(&self, key: &Key) -> String {
        format!("{}{}", self.key_prefix, key.cache_key())
    }

    fn redis_keys(&self, keys: &[Key]) -> Vec<String> {
        keys.iter().map(|k| self.redis_key(k)).collect()
    }
}

#[async_trait]
impl Cacher for RedisCacher {
    #[instrument(name = "redis.get_many", skip_all, fields(keys = keys.len()))]
    async fn get_many(&self, _ctx: &CallContext, keys: &[Key]) -> Vec<Option<Vec<u8>>> {
        if keys.is_empty() {
            return Vec::new();
        }

        let mut conn = self.connection.clone();
        let result: RedisResult<Vec<Option<Vec<u8>>>> = redis::cmd("MGET")
            .arg(self.redis_keys(keys))
            .query_async(&mut conn)
            .await;

        match result {
            Ok(values) if values.len() == keys.len() => values,
            Ok(values) => {
                warn!(expected = keys.len(), got = values.len(), "MGET returned wrong arity");
                vec![None; keys.len()]
            }
            Err(e) => {
                debug!(error = %e, "MGET failed");
                vec![None; keys.len()]
            }
        }
    }

    #[instrument(name = "redis.set_many", skip_all, fields(keys = keys.len()))]
    async fn set_many(&self, _ctx: &CallContext, keys: &[Key], values: Vec<Vec<u8>>) {
        if keys.is_empty() {
            return;
        }

        let mut pipe = redis::pipe();
        for (key, value) in keys.iter().zip(values) {
            let cmd = pipe.cmd("SET").arg(self.redis_key(key)).arg(value);
            if let Some(px) = self.expiration.and_then(px_millis) {
                cmd.arg("PX").arg(px);
            }
            cmd.ignore();
        }

        let mut conn = self.connection.clone();
        let result: RedisResult<()> = pipe.query_async(&mut conn).await;
        if let Err(e) = result {
            debug!(error = %e, "pipelined SET failed");
        }
    }

    #[instrument(name = "redis.delete_many", skip_all, fields(keys = keys.len()))]
    async fn delete_many(&self, _ctx: &CallContext, keys: &[Key]) -> Result<(), CacheError> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.connection.clone();
        let result: RedisResult<i64> = redis::cmd("DEL")
            .arg(self.redis_keys(keys))
            .query_async(&mut conn)
            .await;
        result
            .map(|_| ())
            .map_err(|e| CacheError::backend(BACKEND, e))
    }

    fn backend_name(&self) -> &str {
        BACKEND
    }
}
