//! Process-local cache backend.
//!
//! A map guarded by an `RwLock`, with an optional expiration applied to
//! every item at write time. Expired items read as misses and are dropped by
//! [`MemoryCacher::purge_expired`] or by the next write to the same slot.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cirrus_core::{CacheError, CacheStats, Cacher, CallContext, Key};
use tracing::instrument;

/// Internal structure for memory cache entries with expiration.
struct Item {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Item {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at >= now)
    }
}

/// In-memory [`Cacher`].
pub struct MemoryCacher {
    expiration: Option<Duration>,
    items: RwLock<HashMap<String, Item>>,
    stats: RwLock<CacheStats>,
}

impl Default for MemoryCacher {
    fn default() -> Self {
        Self::new(None)
    }
}

impl MemoryCacher {
    /// Create a cache whose items live for `expiration`, or forever if `None`.
    pub fn new(expiration: Option<Duration>) -> Self {
        Self {
            expiration,
            items: RwLock::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    pub fn expiration(&self) -> Option<Duration> {
        self.expiration
    }

    /// Number of stored items, expired ones included.
    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired items. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        match self.items.write() {
            Ok(mut items) => {
                let before = items.len();
                items.retain(|_, item| item.is_live(now));
                before - items.len()
            }
            Err(_) => 0,
        }
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.read().map(|s| s.clone()).unwrap_or_default();
        stats.entry_count = self.len() as u64;
        stats
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }
}

#[async_trait]
impl Cacher for MemoryCacher {
    #[instrument(name = "memory.get_many", skip_all, fields(keys = keys.len()))]
    async fn get_many(&self, _ctx: &CallContext, keys: &[Key]) -> Vec<Option<Vec<u8>>> {
        let Ok(items) = self.items.read() else {
            return vec![None; keys.len()];
        };

        let now = Instant::now();
        let slots: Vec<Option<Vec<u8>>> = keys
            .iter()
            .map(|key| {
                items
                    .get(&key.cache_key())
                    .filter(|item| item.is_live(now))
                    .map(|item| item.value.clone())
            })
            .collect();
        drop(items);

        let hits = slots.iter().filter(|s| s.is_some()).count() as u64;
        self.record(|s| {
            s.hits += hits;
            s.misses += keys.len() as u64 - hits;
        });
        slots
    }

    #[instrument(name = "memory.set_many", skip_all, fields(keys = keys.len()))]
    async fn set_many(&self, _ctx: &CallContext, keys: &[Key], values: Vec<Vec<u8>>) {
        // An expiration past the clock's range never expires.
        let expires_at = self.expiration.and_then(|d| Instant::now().checked_add(d));
        let Ok(mut items) = self.items.write() else {
            return;
        };

        let mut written = 0u64;
        for (key, value) in keys.iter().zip(values) {
            items.insert(key.cache_key(), Item { value, expires_at });
            written += 1;
        }
        drop(items);

        self.record(|s| s.sets += written);
    }

    #[instrument(name = "memory.delete_many", skip_all, fields(keys = keys.len()))]
    async fn delete_many(&self, _ctx: &CallContext, keys: &[Key]) -> Result<(), CacheError> {
        let mut items = self.items.write().map_err(|_| CacheError::LockPoisoned)?;

        let mut removed = 0u64;
        for key in keys {
            if items.remove(&key.cache_key()).is_some() {
                removed += 1;
            }
        }
        drop(items);

        self.record(|s| s.deletes += removed);
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CallContext {
        CallContext::new()
    }

    #[tokio::test]
    async fn test_get_many_returns_slot_per_key() {
        let cache = MemoryCacher::default();
        let a = Key::id("Task", 1);
        let b = Key::id("Task", 2);

        cache.set_many(&ctx(), &[a.clone()], vec![b"one".to_vec()]).await;

        let slots = cache.get_many(&ctx(), &[b.clone(), a.clone(), b]).await;
        assert_eq!(slots, vec![None, Some(b"one".to_vec()), None]);
    }

    #[tokio::test]
    async fn test_setting_same_value_twice_is_idempotent() {
        let cache = MemoryCacher::default();
        let key = Key::name("Task", "x");

        cache.set_many(&ctx(), &[key.clone()], vec![b"v".to_vec()]).await;
        cache.set_many(&ctx(), &[key.clone()], vec![b"v".to_vec()]).await;

        assert_eq!(cache.get_many(&ctx(), &[key]).await, vec![Some(b"v".to_vec())]);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_equal_keys_share_a_slot() {
        let cache = MemoryCacher::default();
        let written = Key::id("Task", 1).with_project("p1");
        let read = Key::id("Task", 1).with_namespace("");

        cache.set_many(&ctx(), &[written], vec![b"v".to_vec()]).await;
        assert_eq!(cache.get_many(&ctx(), &[read]).await, vec![Some(b"v".to_vec())]);
    }

    #[tokio::test]
    async fn test_delete_many_ignores_absent_keys() {
        let cache = MemoryCacher::default();
        let a = Key::id("Task", 1);
        cache.set_many(&ctx(), &[a.clone()], vec![b"v".to_vec()]).await;

        cache
            .delete_many(&ctx(), &[a.clone(), Key::id("Task", 99)])
            .await
            .expect("delete should succeed");

        assert_eq!(cache.get_many(&ctx(), &[a]).await, vec![None]);
        assert_eq!(cache.stats().deletes, 1);
    }

    #[tokio::test]
    async fn test_expired_items_read_as_misses() {
        let cache = MemoryCacher::new(Some(Duration::from_millis(1)));
        let key = Key::id("Task", 1);
        cache.set_many(&ctx(), &[key.clone()], vec![b"v".to_vec()]).await;

        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(cache.get_many(&ctx(), &[key]).await, vec![None]);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_no_expiration_keeps_items() {
        let cache = MemoryCacher::new(None);
        let key = Key::id("Task", 1);
        cache.set_many(&ctx(), &[key.clone()], vec![b"v".to_vec()]).await;

        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.get_many(&ctx(), &[key]).await, vec![Some(b"v".to_vec())]);
    }

    #[tokio::test]
    async fn test_huge_expiration_keeps_items() {
        let cache = MemoryCacher::new(Some(Duration::from_secs(u64::MAX)));
        let key = Key::id("Task", 1);
        cache.set_many(&ctx(), &[key.clone()], vec![b"v".to_vec()]).await;

        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.get_many(&ctx(), &[key]).await, vec![Some(b"v".to_vec())]);
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_misses() {
        let cache = MemoryCacher::default();
        let a = Key::id("Task", 1);
        cache.set_many(&ctx(), &[a.clone()], vec![b"v".to_vec()]).await;
        cache.get_many(&ctx(), &[a, Key::id("Task", 2)]).await;

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.entry_count, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 0.001);
    }
}
