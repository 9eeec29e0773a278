//! Runtime settings
//!
//! Operators change a small set of keys while the server runs. Every key is
//! declared in [`SCHEMA`] with its type, allowed range and default; anything
//! else is rejected. Values live in memory for fast reads and are written
//! through to a [`SettingsBackend`].

use crate::error::{Error, Result};
use crate::store::SettingsBackend;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub const ACCT_HISTORY_DAYS: &str = "radius.acct_history_days";
pub const ONLINE_SESSION_TTL_SECS: &str = "radius.online_session_ttl_secs";
pub const REJECT_DELAY_SECS: &str = "radius.reject_delay_secs";

/// Declaration of one known setting: an integer within an inclusive range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingSpec {
    pub key: &'static str,
    pub min: i64,
    pub max: i64,
    pub default: &'static str,
    pub description: &'static str,
}

pub const SCHEMA: &[SettingSpec] = &[
    SettingSpec {
        key: ACCT_HISTORY_DAYS,
        min: 1,
        max: 3650,
        default: "180",
        description: "Days closed accounting records are kept",
    },
    SettingSpec {
        key: ONLINE_SESSION_TTL_SECS,
        min: 60,
        max: 86400,
        default: "600",
        description: "Seconds without an update before a session is considered stale",
    },
    SettingSpec {
        key: REJECT_DELAY_SECS,
        min: 0,
        max: 10,
        default: "0",
        description: "Delay before an admission reject is returned",
    },
];

/// Find the declaration of `key`
pub fn spec_for(key: &str) -> Option<&'static SettingSpec> {
    SCHEMA.iter().find(|spec| spec.key == key)
}

impl SettingSpec {
    /// Check `value` and return its canonical form.
    pub fn normalize(&self, value: &str) -> std::result::Result<String, String> {
        let value = value.trim();
        let n: i64 = value
            .parse()
            .map_err(|_| format!("'{}' is not an integer", value))?;
        if n < self.min || n > self.max {
            return Err(format!("{} is outside {}..={}", n, self.min, self.max));
        }
        Ok(n.to_string())
    }
}

pub struct SettingsStore {
    backend: Arc<dyn SettingsBackend>,
    values: RwLock<HashMap<String, String>>,
    // Serializes set() so a rollback never clobbers a newer write
    write_lock: Mutex<()>,
}

impl SettingsStore {
    /// Create a store holding only defaults. Call [`load`](Self::load) to
    /// read persisted values.
    pub fn new(backend: Arc<dyn SettingsBackend>) -> Self {
        SettingsStore {
            backend,
            values: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Read persisted values. Unknown keys and invalid values are skipped
    /// so their defaults stay in effect. Returns how many values were applied.
    pub async fn load(&self) -> Result<usize> {
        let persisted = self.backend.load_settings().await?;
        let mut accepted = HashMap::new();

        for (key, value) in persisted {
            let Some(spec) = spec_for(&key) else {
                warn!(key = %key, "Ignoring unknown persisted setting");
                continue;
            };
            match spec.normalize(&value) {
                Ok(normalized) => {
                    accepted.insert(key, normalized);
                }
                Err(reason) => {
                    warn!(key = %key, value = %value, reason = %reason, "Ignoring invalid persisted setting");
                }
            }
        }

        let applied = accepted.len();
        *self.values.write() = accepted;
        info!(applied, "Runtime settings loaded");
        Ok(applied)
    }

    /// Current value, or the default for a known key that was never set.
    /// `None` for unknown keys.
    pub fn get(&self, key: &str) -> Option<String> {
        let spec = spec_for(key)?;
        Some(
            self.values
                .read()
                .get(key)
                .cloned()
                .unwrap_or_else(|| spec.default.to_string()),
        )
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key)?.parse().ok()
    }

    pub fn acct_history_days(&self) -> i64 {
        self.get_int(ACCT_HISTORY_DAYS).unwrap_or(180)
    }

    pub fn online_session_ttl(&self) -> Duration {
        let secs = self.get_int(ONLINE_SESSION_TTL_SECS).unwrap_or(600);
        Duration::from_secs(secs.max(0) as u64)
    }

    pub fn reject_delay(&self) -> Duration {
        let secs = self.get_int(REJECT_DELAY_SECS).unwrap_or(0);
        Duration::from_secs(secs.max(0) as u64)
    }

    /// Every known key with its current value, in schema order
    pub fn snapshot(&self) -> Vec<(&'static str, String)> {
        let values = self.values.read();
        SCHEMA
            .iter()
            .map(|spec| {
                let value = values
                    .get(spec.key)
                    .cloned()
                    .unwrap_or_else(|| spec.default.to_string());
                (spec.key, value)
            })
            .collect()
    }

    /// Validate, apply and persist a value.
    ///
    /// Unknown keys and invalid values fail with `Validation` and change
    /// nothing. If persisting fails the previous value is restored and the
    /// storage error is returned.
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let spec = spec_for(key)
            .ok_or_else(|| Error::Validation(format!("unknown setting '{}'", key)))?;
        let normalized = spec
            .normalize(value)
            .map_err(|reason| Error::Validation(format!("{}: {}", key, reason)))?;

        let _guard = self.write_lock.lock().await;
        let previous = self.values.write().insert(key.to_string(), normalized.clone());

        if let Err(e) = self.backend.save_setting(key, &normalized).await {
            let mut values = self.values.write();
            match previous {
                Some(old) => values.insert(key.to_string(), old),
                None => values.remove(key),
            };
            warn!(key, error = %e, "Failed to persist setting, previous value restored");
            return Err(e.into());
        }

        info!(key, value = %normalized, "Setting updated");
        Ok(())
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("values", &*self.values.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_defaults() {
        let settings = SettingsStore::new(Arc::new(MemoryStore::new()));
        assert_eq!(settings.acct_history_days(), 180);
        assert_eq!(settings.online_session_ttl(), Duration::from_secs(600));
        assert_eq!(settings.reject_delay(), Duration::ZERO);
        assert_eq!(settings.get("radius.nope"), None);
    }

    #[tokio::test]
    async fn test_set_persists_normalized() {
        let store = Arc::new(MemoryStore::new());
        let settings = SettingsStore::new(store.clone());

        settings.set(REJECT_DELAY_SECS, " 03 ").await.unwrap();
        settings.set(ONLINE_SESSION_TTL_SECS, "900").await.unwrap();
        assert_eq!(settings.reject_delay(), Duration::from_secs(3));
        assert_eq!(settings.online_session_ttl(), Duration::from_secs(900));

        let persisted = store.load_settings().await.unwrap();
        assert!(persisted.contains(&(REJECT_DELAY_SECS.to_string(), "3".to_string())));
    }

    #[tokio::test]
    async fn test_set_rejects_invalid() {
        let settings = SettingsStore::new(Arc::new(MemoryStore::new()));

        for (key, value) in [
            (ACCT_HISTORY_DAYS, "0"),
            (ACCT_HISTORY_DAYS, "3651"),
            (ACCT_HISTORY_DAYS, "ten"),
            (ONLINE_SESSION_TTL_SECS, "59"),
            (REJECT_DELAY_SECS, "-1"),
            ("radius.unknown", "1"),
        ] {
            let err = settings.set(key, value).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{}={}", key, value);
        }
        assert_eq!(settings.acct_history_days(), 180);
    }

    #[tokio::test]
    async fn test_load_skips_unknown_and_invalid() {
        let store = Arc::new(MemoryStore::new());
        store.save_setting(ACCT_HISTORY_DAYS, "30").await.unwrap();
        store.save_setting(REJECT_DELAY_SECS, "99").await.unwrap();
        store.save_setting("radius.legacy", "x").await.unwrap();

        let settings = SettingsStore::new(store);
        assert_eq!(settings.load().await.unwrap(), 1);
        assert_eq!(settings.acct_history_days(), 30);
        assert_eq!(settings.reject_delay(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_snapshot_in_schema_order() {
        let settings = SettingsStore::new(Arc::new(MemoryStore::new()));
        settings.set(REJECT_DELAY_SECS, "3").await.unwrap();

        let snapshot = settings.snapshot();
        assert_eq!(snapshot.len(), SCHEMA.len());
        assert_eq!(snapshot[0], (ACCT_HISTORY_DAYS, "180".to_string()));
        assert_eq!(snapshot[2], (REJECT_DELAY_SECS, "3".to_string()));
    }

    struct BrokenBackend;

    #[async_trait::async_trait]
    impl SettingsBackend for BrokenBackend {
        async fn load_settings(&self) -> std::result::Result<Vec<(String, String)>, StoreError> {
            Ok(vec![(ACCT_HISTORY_DAYS.to_string(), "90".to_string())])
        }

        async fn save_setting(&self, _: &str, _: &str) -> std::result::Result<(), StoreError> {
            Err(StoreError::Backend("disk full".into()))
        }
    }

    #[tokio::test]
    async fn test_rollback_on_persist_failure() {
        let settings = SettingsStore::new(Arc::new(BrokenBackend));
        settings.load().await.unwrap();

        let err = settings.set(ACCT_HISTORY_DAYS, "30").await.unwrap_err();
        assert!(matches!(err, Error::Storage(StoreError::Backend(_))));
        assert_eq!(settings.acct_history_days(), 90);

        // A key that was never set falls back to its default again
        settings.set(REJECT_DELAY_SECS, "5").await.unwrap_err();
        assert_eq!(settings.reject_delay(), Duration::ZERO);
    }
}
