//! Time-boxed key/value cache
//!
//! A small generic cache used by the profile cache and the session-count
//! cache. Every entry carries its own expiry; reads drop expired entries
//! lazily and [`TimedCache::sweep_expired`] removes them in bulk.
//!
//! The capacity bound is enforced on insert: expired entries are swept
//! first, and if the map is still too large one arbitrary entry is evicted.
//! This is not LRU; cached values here are cheap to recompute.
//!
//! Read-through callers fill the cache after an async storage call. A fill
//! taken with [`TimedCache::generation`] before the call and written with
//! [`TimedCache::set_if_current`] is discarded if any delete or clear ran
//! in between, so an invalidation is never undone by a slower reader.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe string-keyed cache with per-entry expiry
///
/// Readers proceed in parallel; inserts, deletes and sweeps take the
/// write lock.
#[derive(Debug)]
pub struct TimedCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    ttl: Duration,
    max_entries: usize,
    // Bumped under the write lock by every delete and clear
    generation: AtomicU64,
}

impl<V: Clone> TimedCache<V> {
    /// Create a new cache
    ///
    /// # Arguments
    /// * `ttl` - Lifetime of an entry written with [`set`](Self::set)
    /// * `max_entries` - Capacity bound; values below 1 are raised to 1
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        TimedCache {
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
            generation: AtomicU64::new(0),
        }
    }

    /// Look up a key, treating an expired entry as a miss and removing it.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        // Expired: re-check under the write lock, a concurrent set may have refreshed it
        let mut entries = self.entries.write();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Insert or overwrite with the default TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.ttl);
    }

    /// Insert or overwrite with an explicit TTL.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let mut entries = self.entries.write();
        self.insert_locked(&mut entries, key.into(), value, ttl);
    }

    /// Invalidation generation; read it before loading a value to fill.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Insert with the default TTL unless a delete or clear happened since
    /// `generation` was read. Returns whether the value was stored.
    pub fn set_if_current(&self, key: impl Into<String>, value: V, generation: u64) -> bool {
        let mut entries = self.entries.write();
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        self.insert_locked(&mut entries, key.into(), value, self.ttl);
        true
    }

    fn insert_locked(
        &self,
        entries: &mut HashMap<String, CacheEntry<V>>,
        key: String,
        value: V,
        ttl: Duration,
    ) {
        let now = Instant::now();
        entries.insert(
            key.clone(),
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );

        if entries.len() <= self.max_entries {
            return;
        }

        entries.retain(|_, entry| !entry.is_expired(now));

        if entries.len() > self.max_entries {
            let victim = entries.keys().find(|k| **k != key).cloned();
            if let Some(victim) = victim {
                entries.remove(&victim);
                debug!(evicted = %victim, "Cache over capacity, evicted entry");
            }
        }
    }

    /// Remove one key.
    pub fn delete(&self, key: &str) {
        let mut entries = self.entries.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.remove(key);
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.clear();
    }

    /// Remove all expired entries, returning how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of stored entries, including ones that expired but were not yet swept
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            max_entries: self.max_entries,
            ttl_millis: self.ttl.as_millis() as u64,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of entries
    pub entries: usize,
    /// Maximum number of entries
    pub max_entries: usize,
    /// Default TTL in milliseconds
    pub ttl_millis: u64,
}
