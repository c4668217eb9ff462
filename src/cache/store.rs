//! Bounded TTL storage shared by the session caches.
//!
//! Entries live in a [`DashMap`] so readers and writers of different keys never
//! block each other. When a new key arrives at capacity the entry with the
//! oldest `cached_at` is evicted by a full scan.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use metrics::counter;
use serde::Serialize;
use tracing::debug;

use super::entry::{CacheEntry, Clock};

pub const METRIC_CACHE_HIT: &str = "deckcache_cache_hit_total";
pub const METRIC_CACHE_MISS: &str = "deckcache_cache_miss_total";
pub const METRIC_CACHE_EVICT: &str = "deckcache_cache_evict_total";

/// Point-in-time counters for one cache.
///
/// Counters are read independently of the map, so a snapshot taken while other
/// threads are active may be slightly inconsistent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub skipped_invalidations: u64,
}

impl CacheStats {
    /// `hits / (hits + misses)`, or `0.0` before the first access.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub(crate) struct TtlStore<K, V> {
    name: &'static str,
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
    max_size: NonZeroUsize,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> TtlStore<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub(crate) fn new(
        name: &'static str,
        ttl: Duration,
        max_size: NonZeroUsize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            ttl,
            max_size,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a still-valid value and record the hit or miss.
    pub(crate) fn lookup(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let fresh = self
            .entries
            .get(key)
            .filter(|entry| entry.is_valid_at(self.ttl, now))
            .map(|entry| entry.value().value().clone());

        match fresh {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_CACHE_HIT, "cache" => self.name).increment(1);
                debug!(cache = self.name, ?key, "Cache hit");
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_CACHE_MISS, "cache" => self.name).increment(1);
                debug!(cache = self.name, ?key, "Cache miss");
                None
            }
        }
    }

    /// Store `value` stamped with the current time. If `key` is new, evict the
    /// oldest other entries until the store is back within its bound.
    ///
    /// Writers shrink the map after inserting, so concurrent inserts can push it
    /// over the bound only until the last of them returns.
    pub(crate) fn insert(&self, key: K, value: V) {
        let entry = CacheEntry::new(value, self.clock.now());
        if self.entries.insert(key.clone(), entry).is_some() {
            return;
        }
        while self.entries.len() > self.max_size.get() {
            if !self.evict_oldest(&key) {
                break;
            }
        }
    }

    fn evict_oldest(&self, keep: &K) -> bool {
        // The iterator holds shard read locks; collect the victim before removing.
        let victim = self
            .entries
            .iter()
            .filter(|entry| entry.key() != keep)
            .min_by_key(|entry| entry.value().cached_at())
            .map(|entry| entry.key().clone());

        let Some(key) = victim else {
            return false;
        };
        if self.entries.remove(&key).is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            counter!(METRIC_CACHE_EVICT, "cache" => self.name).increment(1);
            debug!(cache = self.name, ?key, "Evicted oldest cache entry");
        }
        true
    }

    pub(crate) fn remove(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry whose key matches `predicate`. Returns how many were removed.
    pub(crate) fn remove_where<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&K) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|key, _| !predicate(key));
        before.saturating_sub(self.entries.len())
    }

    pub(crate) fn clear(&self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.entries.len(),
            skipped_invalidations: 0,
        }
    }
}
