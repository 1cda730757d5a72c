//! Cache capability consumed by the cache interceptor.
//!
//! Backends store opaque bytes under [`Key::cache_key`]. The interceptor never
//! asks a backend to update an entry in place: entries are written after a
//! remote fetch and removed after a committed mutation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::CallContext;
use crate::error::CacheError;
use crate::key::Key;

/// Pluggable cache storage.
///
/// Implementations must be safe for concurrent use by many in-flight calls.
///
/// # Contract
///
/// - `get_many` returns one slot per key, in key order. `None` means absent
///   or unusable; backend failures are reported as misses, never as errors.
/// - `set_many` stores `values[i]` under `keys[i]`. Failures are swallowed.
/// - `delete_many` removes the keys. A key that is not cached is not an
///   error; any other failure is returned and fails the caller's commit.
#[async_trait]
pub trait Cacher: Send + Sync {
    async fn get_many(&self, ctx: &CallContext, keys: &[Key]) -> Vec<Option<Vec<u8>>>;

    async fn set_many(&self, ctx: &CallContext, keys: &[Key], values: Vec<Vec<u8>>);

    async fn delete_many(&self, ctx: &CallContext, keys: &[Key]) -> Result<(), CacheError>;

    /// Short backend identifier for logs.
    fn backend_name(&self) -> &str;
}

#[async_trait]
impl<C: Cacher + ?Sized> Cacher for Arc<C> {
    async fn get_many(&self, ctx: &CallContext, keys: &[Key]) -> Vec<Option<Vec<u8>>> {
        (**self).get_many(ctx, keys).await
    }

    async fn set_many(&self, ctx: &CallContext, keys: &[Key], values: Vec<Vec<u8>>) {
        (**self).set_many(ctx, keys, values).await
    }

    async fn delete_many(&self, ctx: &CallContext, keys: &[Key]) -> Result<(), CacheError> {
        (**self).delete_many(ctx, keys).await
    }

    fn backend_name(&self) -> &str {
        (**self).backend_name()
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries written.
    pub sets: u64,
    /// Number of entries removed.
    pub deletes: u64,
    /// Number of entries currently in cache, where the backend can tell.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
