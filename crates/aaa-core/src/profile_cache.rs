//! Billing profile cache
//!
//! Profiles are read on every authorization of a dynamically linked account,
//! so they are served from a [`TimedCache`] and only fetched from storage on
//! a miss or after expiry. Failed lookups are not cached.
//!
//! A background task sweeps expired entries on a fixed interval so memory is
//! reclaimed even when nothing reads the cache. The task is stopped with
//! [`ProfileCache::shutdown`] (or signalled when the cache is dropped).

use crate::cache::TimedCache;
use crate::error::StoreError;
use crate::model::Profile;
use crate::store::ProfileLookup;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

/// Profile cache tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileCacheConfig {
    /// Entry lifetime in seconds (default: 300)
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Background sweep interval in seconds (default: 60)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Maximum cached profiles (default: 10000)
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_max_entries() -> usize {
    10_000
}

impl Default for ProfileCacheConfig {
    fn default() -> Self {
        ProfileCacheConfig {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_entries: default_max_entries(),
        }
    }
}

impl ProfileCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Read-through cache of profiles keyed by id
pub struct ProfileCache {
    cache: Arc<TimedCache<Profile>>,
    lookup: Arc<dyn ProfileLookup>,
    hits: AtomicU64,
    misses: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ProfileCache {
    /// Create a profile cache and start its background sweeper.
    ///
    /// Must be called from within a tokio runtime for the sweeper to run;
    /// outside a runtime the cache still works but only expires lazily.
    pub fn new(lookup: Arc<dyn ProfileLookup>, config: &ProfileCacheConfig) -> Self {
        Self::new_internal(lookup, config.ttl(), config.max_entries, Some(config.sweep_interval()))
    }

    /// Create a profile cache with default tuning and a running sweeper
    pub fn with_defaults(lookup: Arc<dyn ProfileLookup>) -> Self {
        Self::new(lookup, &ProfileCacheConfig::default())
    }

    /// Create a cache with a custom TTL and sweep interval
    pub fn with_timing(
        lookup: Arc<dyn ProfileLookup>,
        ttl: Duration,
        sweep_interval: Duration,
    ) -> Self {
        Self::new_internal(lookup, ttl, default_max_entries(), Some(sweep_interval))
    }

    /// Create a cache without the background sweeper
    pub fn without_sweeper(lookup: Arc<dyn ProfileLookup>, ttl: Duration) -> Self {
        Self::new_internal(lookup, ttl, default_max_entries(), None)
    }

    fn new_internal(
        lookup: Arc<dyn ProfileLookup>,
        ttl: Duration,
        max_entries: usize,
        sweep_interval: Option<Duration>,
    ) -> Self {
        let cache = Arc::new(TimedCache::new(ttl, max_entries));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sweeper = sweep_interval.and_then(|interval| {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => Some(handle.spawn(sweep_loop(
                    Arc::clone(&cache),
                    interval,
                    shutdown_rx,
                ))),
                Err(_) => {
                    warn!("No tokio runtime available, profile cache sweeper not started");
                    None
                }
            }
        });

        ProfileCache {
            cache,
            lookup,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            shutdown_tx,
            sweeper: Mutex::new(sweeper),
        }
    }

    /// Return the profile, loading it from storage on a miss.
    ///
    /// Storage errors (including not-found) are returned unchanged and
    /// nothing is cached for them. A profile loaded while an invalidation
    /// ran is returned to this caller but not cached.
    pub async fn get(&self, profile_id: i64) -> Result<Profile, StoreError> {
        let key = profile_id.to_string();
        if let Some(profile) = self.cache.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(profile);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let generation = self.cache.generation();
        let profile = self.lookup.get_profile(profile_id).await?;
        if self.cache.set_if_current(key, profile.clone(), generation) {
            debug!(profile_id, "Profile loaded into cache");
        } else {
            debug!(profile_id, "Profile invalidated during load, not cached");
        }
        Ok(profile)
    }

    /// Insert or refresh a profile the caller already holds.
    pub fn set(&self, profile_id: i64, profile: Profile) {
        self.cache.set(profile_id.to_string(), profile);
    }

    /// Drop one profile; call after the profile is updated or deleted.
    pub fn invalidate(&self, profile_id: i64) {
        self.cache.delete(&profile_id.to_string());
    }

    /// Drop both ends of an account's profile reassignment.
    pub fn invalidate_reassignment(&self, old_profile_id: i64, new_profile_id: i64) {
        self.invalidate(old_profile_id);
        if new_profile_id != old_profile_id {
            self.invalidate(new_profile_id);
        }
    }

    pub fn invalidate_all(&self) {
        self.cache.clear();
    }

    /// Remove expired entries now, without waiting for the sweeper.
    pub fn sweep_expired(&self) -> usize {
        self.cache.sweep_expired()
    }

    /// Whether the background sweeper is still running
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the background sweeper and wait for it to exit.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Profile cache sweeper ended abnormally");
            }
        }
    }

    pub fn stats(&self) -> ProfileCacheStats {
        ProfileCacheStats {
            entries: self.cache.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Drop for ProfileCache {
    fn drop(&mut self) {
        // Signal the sweeper; it exits on its next wakeup
        let _ = self.shutdown_tx.send(true);
    }
}

impl std::fmt::Debug for ProfileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileCache")
            .field("ttl", &self.cache.ttl())
            .field("entries", &self.cache.len())
            .finish()
    }
}

/// Profile cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

async fn sweep_loop(
    cache: Arc<TimedCache<Profile>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = cache.sweep_expired();
                if removed > 0 {
                    debug!(
                        removed = removed,
                        remaining = cache.len(),
                        "Profile cache sweep completed"
                    );
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    debug!("Profile cache sweeper stopped");
}
