//! LMDB-backed cache implementation.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a persistent,
//! memory-mapped cache shared by every process on the host that opens the
//! same directory.
//!
//! # Value Format
//!
//! `[expires_at: 8 bytes, i64 LE unix millis, 0 = never][payload]`
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The backend uses:
//! - One read transaction per `get_many`
//! - One write transaction per `set_many` / `delete_many`
//! - Statistics behind an `RwLock`

use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use cirrus_core::{CacheError, CacheStats, Cacher, CallContext, Key};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use tracing::{debug, instrument};

const BACKEND: &str = "lmdb";

/// Length of the expiry header in front of every value.
const HEADER_LEN: usize = 8;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for CacheError {
    fn from(e: LmdbCacheError) -> Self {
        CacheError::backend(BACKEND, e)
    }
}

/// LMDB-backed [`Cacher`].
///
/// # Example
///
/// ```ignore
/// let cacher = LmdbCacher::new("/var/cache/cirrus", 100, Some(Duration::from_secs(600)))?;
/// let interceptor = CacheInterceptor::new(Arc::new(cacher));
/// ```
pub struct LmdbCacher {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
    expiration: Option<Duration>,
    stats: RwLock<CacheStats>,
}

impl LmdbCacher {
    /// Open (or create) an LMDB cache.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    /// * `expiration` - Lifetime of each written entry, `None` for no expiry
    pub fn new<P: AsRef<Path>>(
        path: P,
        max_size_mb: usize,
        expiration: Option<Duration>,
    ) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(Self {
            env,
            db,
            expiration,
            stats: RwLock::new(CacheStats::default()),
        })
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.read().map(|s| s.clone()).unwrap_or_default();
        if let Ok(rtxn) = self.env.read_txn() {
            stats.entry_count = self.db.len(&rtxn).unwrap_or(0);
        }
        stats
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }

    fn read_slots(&self, keys: &[Key]) -> Result<Vec<Option<Vec<u8>>>, LmdbCacheError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let now = Utc::now().timestamp_millis();
        let mut slots = Vec::with_capacity(keys.len());
        for key in keys {
            let slot = match self.db.get(&rtxn, key.cache_key().as_bytes()) {
                Ok(Some(bytes)) => unpack(bytes, now),
                Ok(None) => None,
                Err(e) => {
                    debug!(key = %key, error = %e, "lmdb read failed");
                    None
                }
            };
            slots.push(slot);
        }
        Ok(slots)
    }

    fn write_slots(&self, keys: &[Key], values: Vec<Vec<u8>>) -> Result<u64, LmdbCacheError> {
        let expires_at = self.expiration.map_or(0, expiry_millis);

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let mut written = 0u64;
        for (key, value) in keys.iter().zip(values) {
            let packed = pack(expires_at, &value);
            self.db
                .put(&mut wtxn, key.cache_key().as_bytes(), &packed)
                .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
            written += 1;
        }

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        Ok(written)
    }

    fn delete_slots(&self, keys: &[Key]) -> Result<u64, LmdbCacheError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let mut deleted = 0u64;
        for key in keys {
            if self
                .db
                .delete(&mut wtxn, key.cache_key().as_bytes())
                .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?
            {
                deleted += 1;
            }
        }

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        Ok(deleted)
    }
}

/// Absolute expiry in Unix millis for an item written now, saturating at `i64::MAX`.
fn expiry_millis(expiration: Duration) -> i64 {
    let ttl = i64::try_from(expiration.as_millis()).unwrap_or(i64::MAX);
    Utc::now().timestamp_millis().saturating_add(ttl)
}

fn pack(expires_at: i64, value: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + value.len());
    bytes.extend_from_slice(&expires_at.to_le_bytes());
    bytes.extend_from_slice(value);
    bytes
}

/// Payload of a stored value, or `None` if it is malformed or expired at `now`.
fn unpack(bytes: &[u8], now: i64) -> Option<Vec<u8>> {
    let header: [u8; HEADER_LEN] = bytes.get(..HEADER_LEN)?.try_into().ok()?;
    let expires_at = i64::from_le_bytes(header);
    if expires_at != 0 && expires_at < now {
        return None;
    }
    Some(bytes[HEADER_LEN..].to_vec())
}

#[async_trait]
impl Cacher for LmdbCacher {
    #[instrument(name = "lmdb.get_many", skip_all, fields(keys = keys.len()))]
    async fn get_many(&self, _ctx: &CallContext, keys: &[Key]) -> Vec<Option<Vec<u8>>> {
        match self.read_slots(keys) {
            Ok(slots) => {
                let hits = slots.iter().filter(|s| s.is_some()).count() as u64;
                self.record(|s| {
                    s.hits += hits;
                    s.misses += keys.len() as u64 - hits;
                });
                slots
            }
            Err(e) => {
                debug!(error = %e, "lmdb get_many failed");
                self.record(|s| s.misses += keys.len() as u64);
                vec![None; keys.len()]
            }
        }
    }

    #[instrument(name = "lmdb.set_many", skip_all, fields(keys = keys.len()))]
    async fn set_many(&self, _ctx: &CallContext, keys: &[Key], values: Vec<Vec<u8>>) {
        match self.write_slots(keys, values) {
            Ok(written) => self.record(|s| s.sets += written),
            Err(e) => debug!(error = %e, "lmdb set_many failed"),
        }
    }

    #[instrument(name = "lmdb.delete_many", skip_all, fields(keys = keys.len()))]
    async fn delete_many(&self, _ctx: &CallContext, keys: &[Key]) -> Result<(), CacheError> {
        let deleted = self.delete_slots(keys)?;
        self.record(|s| s.deletes += deleted);
        Ok(())
    }

    fn backend_name(&self) -> &str {
        BACKEND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_backend(expiration: Option<Duration>) -> (LmdbCacher, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let backend = LmdbCacher::new(temp_dir.path(), 10, expiration)
            .expect("backend creation should succeed");
        (backend, temp_dir)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (backend, _temp_dir) = create_test_backend(None);
        let ctx = CallContext::new();
        let a = Key::id("Task", 1);
        let b = Key::name("Task", "b").with_namespace("ns");

        backend
            .set_many(&ctx, &[a.clone(), b.clone()], vec![b"a".to_vec(), b"b".to_vec()])
            .await;

        let slots = backend
            .get_many(&ctx, &[b, Key::id("Task", 3), a])
            .await;
        assert_eq!(slots, vec![Some(b"b".to_vec()), None, Some(b"a".to_vec())]);
        assert_eq!(backend.stats().entry_count, 2);
    }

    #[tokio::test]
    async fn test_delete_removes_and_ignores_absent() {
        let (backend, _temp_dir) = create_test_backend(None);
        let ctx = CallContext::new();
        let a = Key::id("Task", 1);
        backend.set_many(&ctx, &[a.clone()], vec![b"a".to_vec()]).await;

        backend
            .delete_many(&ctx, &[a.clone(), Key::id("Task", 2)])
            .await
            .expect("delete should succeed");

        assert_eq!(backend.get_many(&ctx, &[a]).await, vec![None]);
        assert_eq!(backend.stats().deletes, 1);
    }

    #[test]
    fn test_unpack_respects_expiry() {
        let packed = pack(1_000, b"v");
        assert_eq!(unpack(&packed, 999), Some(b"v".to_vec()));
        assert_eq!(unpack(&packed, 1_001), None);

        let forever = pack(0, b"v");
        assert_eq!(unpack(&forever, i64::MAX), Some(b"v".to_vec()));
    }

    #[test]
    fn test_expiry_millis_saturates() {
        assert_eq!(expiry_millis(Duration::from_secs(u64::MAX)), i64::MAX);
        assert!(expiry_millis(Duration::from_secs(60)) > Utc::now().timestamp_millis());
    }

    #[tokio::test]
    async fn test_huge_expiration_keeps_items() {
        let (backend, _temp_dir) = create_test_backend(Some(Duration::from_secs(u64::MAX)));
        let ctx = CallContext::new();
        let key = Key::id("Task", 1);

        backend.set_many(&ctx, &[key.clone()], vec![b"v".to_vec()]).await;

        assert_eq!(backend.get_many(&ctx, &[key]).await, vec![Some(b"v".to_vec())]);
    }

    #[test]
    fn test_unpack_rejects_short_values() {
        assert_eq!(unpack(&[1, 2, 3], 0), None);
        assert_eq!(unpack(&[0u8; 8], 0), Some(Vec::new()));
    }
}
