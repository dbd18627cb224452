// src/cache.rs
//! # TTL Cache
//! Timestamped JSON entries layered over a [`KvStore`].
//!
//! - An entry is valid iff `now - timestamp < ttl`.
//! - `ttl == 0` disables serving from cache; writes still happen so a later
//!   positive TTL benefits immediately.
//! - Expired or corrupt entries are evicted on read and reported as a miss.
//! - No in-process mirror: every read re-parses the stored JSON.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::KvStore;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry<T> {
    pub data: T,
    /// Unix millis at write time.
    pub timestamp: i64,
}

pub struct TtlCache {
    store: Arc<dyn KvStore>,
    ttl_ms: AtomicU64,
}

impl TtlCache {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        gauge!("cache_ttl_ms").set(ttl_ms as f64);
        Self {
            store,
            ttl_ms: AtomicU64::new(ttl_ms),
        }
    }

    /// Build from the user-facing expiry setting.
    pub fn with_expiry_minutes(store: Arc<dyn KvStore>, minutes: u64) -> Self {
        Self::new(store, Duration::from_secs(minutes.saturating_mul(60)))
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms.load(Ordering::Relaxed))
    }

    /// Change the TTL for all subsequent reads.
    pub fn set_ttl(&self, ttl: Duration) {
        let ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self.ttl_ms.store(ms, Ordering::Relaxed);
        gauge!("cache_ttl_ms").set(ms as f64);
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_at(key, now_millis())
    }

    pub fn get_at<T: DeserializeOwned>(&self, key: &str, now_ms: i64) -> Option<T> {
        let ttl_ms = self.ttl_ms.load(Ordering::Relaxed);
        if ttl_ms == 0 {
            counter!("cache_misses_total").increment(1);
            return None;
        }

        let Some(raw) = self.store.get(key) else {
            counter!("cache_misses_total").increment(1);
            return None;
        };

        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(e) => e,
            Err(e) => {
                warn!(target: "cache", key, error = %e, "corrupt cache entry evicted");
                self.evict(key);
                return None;
            }
        };

        let age = now_ms.saturating_sub(entry.timestamp);
        if age < 0 || (age as u64) >= ttl_ms {
            debug!(target: "cache", key, age_ms = age, "expired cache entry evicted");
            self.evict(key);
            return None;
        }

        counter!("cache_hits_total").increment(1);
        Some(entry.data)
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        self.set_at(key, value, now_millis())
    }

    /// Write a fresh entry. Failures are logged and swallowed.
    pub fn set_at<T: Serialize>(&self, key: &str, value: &T, now_ms: i64) {
        let entry = CacheEntry {
            data: value,
            timestamp: now_ms,
        };
        let json = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!(target: "cache", key, error = %e, "cache entry not serializable");
                return;
            }
        };
        if let Err(e) = self.store.set(key, &json) {
            warn!(target: "cache", key, error = ?e, "cache write failed");
        }
    }

    pub fn clear(&self, key: &str) {
        self.store.remove(key);
    }

    fn evict(&self, key: &str) {
        counter!("cache_misses_total").increment(1);
        counter!("cache_evictions_total").increment(1);
        self.store.remove(key);
    }
}

/// Current Unix time in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const MIN: i64 = 60_000;

    fn cache(minutes: u64) -> (Arc<MemoryStore>, TtlCache) {
        let store = Arc::new(MemoryStore::new());
        let c = TtlCache::with_expiry_minutes(store.clone(), minutes);
        (store, c)
    }

    #[test]
    fn round_trip_within_ttl() {
        let (_s, c) = cache(60);
        let t0 = 1_700_000_000_000;
        c.set_at("k", &vec!["a".to_string(), "b".to_string()], t0);
        let got: Option<Vec<String>> = c.get_at("k", t0 + 59 * MIN);
        assert_eq!(got, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn expired_read_misses_and_evicts() {
        let (store, c) = cache(60);
        let t0 = 1_700_000_000_000;
        c.set_at("k", &42u32, t0);
        assert_eq!(c.get_at::<u32>("k", t0 + 61 * MIN), None);
        assert!(store.is_empty(), "expired entry should be evicted");
    }

    #[test]
    fn exactly_at_ttl_is_expired() {
        let (_s, c) = cache(1);
        c.set_at("k", &1u8, 0);
        assert_eq!(c.get_at::<u8>("k", MIN - 1), Some(1));
        assert_eq!(c.get_at::<u8>("k", MIN), None);
    }

    #[test]
    fn zero_ttl_always_misses_but_still_writes() {
        let (store, c) = cache(0);
        c.set_at("k", &"v", 1000);
        assert_eq!(c.get_at::<String>("k", 1000), None);
        assert_eq!(store.len(), 1, "write must still happen");

        c.set_ttl(Duration::from_secs(60));
        assert_eq!(c.get_at::<String>("k", 1001).as_deref(), Some("v"));
    }

    #[test]
    fn corrupt_entry_is_a_miss_and_evicted() {
        let (store, c) = cache(60);
        store.set("k", "{not json").unwrap();
        assert_eq!(c.get_at::<u32>("k", 0), None);
        assert!(store.get("k").is_none());
    }

    #[test]
    fn wrong_shape_is_a_miss() {
        let (store, c) = cache(60);
        c.set_at("k", &"text", 0);
        assert_eq!(c.get_at::<Vec<u32>>("k", 1), None);
        assert!(store.is_empty());
    }

    #[test]
    fn clear_removes_entry() {
        let (_s, c) = cache(60);
        c.set_at("k", &1u8, 0);
        c.clear("k");
        assert_eq!(c.get_at::<u8>("k", 1), None);
    }
}
