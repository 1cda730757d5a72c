//! Cirrus Cache - Read-Through Lookup Caching
//!
//! [`CacheInterceptor`] serves datastore point lookups from a [`Cacher`] and
//! invalidates entries on commit. Backends:
//!
//! - [`MemoryCacher`]: process-local, optional per-item expiration
//! - [`LmdbCacher`]: persistent and shared by processes on one host
//! - `RedisCacher` (feature `redis`): shared by every process that can reach
//!   the server
//!
//! [`CacheConfig`] picks one at composition time.
//!
//! [`Cacher`]: cirrus_core::Cacher

pub mod config;
pub mod interceptor;
pub mod lmdb_backend;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_backend;

pub use config::{BackendKind, CacheConfig};
pub use interceptor::{invalidation_keys, CacheInterceptor};
pub use lmdb_backend::{LmdbCacheError, LmdbCacher};
pub use memory::MemoryCacher;
#[cfg(feature = "redis")]
pub use redis_backend::RedisCacher;
