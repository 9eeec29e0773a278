//! Component wiring
//!
//! [`AaaService`] builds every core component from a [`CoreConfig`] over one
//! storage backend and owns their lifecycle.

use crate::accounting::AccountingRepository;
use crate::config::CoreConfig;
use crate::error::Result;
use crate::handler::{AccountingDispatcher, AdmissionControl};
use crate::metrics::AaaMetrics;
use crate::profile_cache::ProfileCache;
use crate::session::SessionRepository;
use crate::settings::SettingsStore;
use crate::store::{AccountingStore, MemoryStore, ProfileLookup, SessionStore, SettingsBackend};
use std::sync::Arc;
use tracing::info;

/// Everything the core needs from one storage backend
pub trait Storage: ProfileLookup + SessionStore + AccountingStore + SettingsBackend + 'static {}

impl<T> Storage for T where
    T: ProfileLookup + SessionStore + AccountingStore + SettingsBackend + 'static
{
}

pub struct AaaService {
    pub profiles: Arc<ProfileCache>,
    pub sessions: Arc<SessionRepository>,
    pub accounting: Arc<AccountingRepository>,
    pub settings: Arc<SettingsStore>,
    pub metrics: Arc<AaaMetrics>,
    pub dispatcher: AccountingDispatcher,
    pub admission: AdmissionControl,
}

impl AaaService {
    /// Build the components over `store` and load runtime settings.
    ///
    /// Starts the profile cache sweeper, so call from within a tokio runtime.
    pub async fn start<S: Storage>(config: &CoreConfig, store: Arc<S>) -> Result<Self> {
        let timeout = config.storage_timeout();

        let profiles = Arc::new(ProfileCache::new(
            store.clone() as Arc<dyn ProfileLookup>,
            &config.profile_cache,
        ));
        let sessions = Arc::new(
            SessionRepository::with_count_cache(
                store.clone(),
                config.session_count_ttl(),
                config.session_count_max_entries,
            )
            .with_timeout(timeout),
        );
        let accounting =
            Arc::new(AccountingRepository::new(store.clone()).with_timeout(timeout));
        let settings = Arc::new(SettingsStore::new(store));
        settings.load().await?;

        let metrics = Arc::new(AaaMetrics::new());
        let dispatcher =
            AccountingDispatcher::new(sessions.clone(), accounting.clone(), metrics.clone());
        let admission =
            AdmissionControl::new(sessions.clone(), Some(profiles.clone()), metrics.clone())
                .with_settings(settings.clone());

        info!(
            profile_ttl_secs = config.profile_cache.ttl_secs,
            session_count_ttl_ms = config.session_count_ttl_ms,
            storage_timeout_ms = ?config.storage_timeout_ms,
            "AAA core started"
        );

        Ok(AaaService {
            profiles,
            sessions,
            accounting,
            settings,
            metrics,
            dispatcher,
            admission,
        })
    }

    /// Start over a fresh in-memory store
    pub async fn in_memory(config: &CoreConfig) -> Result<(Self, Arc<MemoryStore>)> {
        let store = Arc::new(MemoryStore::new());
        let service = Self::start(config, store.clone()).await?;
        Ok((service, store))
    }

    /// Start over PostgreSQL when configured, in-memory storage otherwise.
    #[cfg(feature = "postgres")]
    pub async fn connect(config: &CoreConfig) -> Result<Self> {
        match &config.postgres {
            Some(pg) => {
                let store = Arc::new(crate::store::PgStore::connect(pg).await?);
                Self::start(config, store).await
            }
            None => Ok(Self::in_memory(config).await?.0),
        }
    }

    /// Purge accounting history older than the configured retention.
    pub async fn purge_history(&self) -> Result<u64> {
        self.accounting.purge_with_settings(&self.settings).await
    }

    /// Remove online sessions idle longer than `radius.online_session_ttl_secs`.
    pub async fn purge_stale_sessions(&self) -> Result<u64> {
        self.sessions
            .purge_stale(self.settings.online_session_ttl())
            .await
    }

    /// Counters plus profile cache gauges in Prometheus text format
    pub fn render_metrics(&self) -> String {
        self.metrics.render_with_cache(Some(&self.profiles.stats()))
    }

    /// Stop the background sweeper.
    pub async fn shutdown(&self) {
        self.profiles.shutdown().await;
        info!("AAA core stopped");
    }
}

impl std::fmt::Debug for AaaService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AaaService")
            .field("profiles", &self.profiles)
            .field("sessions", &self.sessions)
            .finish()
    }
}
