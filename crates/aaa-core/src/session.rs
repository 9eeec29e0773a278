//! Online session tracking
//!
//! [`SessionRepository`] sits between the accounting dispatcher and the
//! session table. Admission control asks it how many sessions a user has
//! online on every authentication, so those counts are cached for a short
//! time and invalidated whenever this node creates or removes a session.
//! A count loaded while an invalidation ran is returned but not cached.

use crate::cache::TimedCache;
use crate::error::{Error, Result};
use crate::model::OnlineSession;
use crate::store::{with_deadline, SessionStore};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Default lifetime of a cached per-user session count
pub const DEFAULT_COUNT_TTL: Duration = Duration::from_secs(2);

/// Default capacity of the count cache
pub const DEFAULT_COUNT_MAX_ENTRIES: usize = 10_000;

pub struct SessionRepository {
    store: Arc<dyn SessionStore>,
    counts: TimedCache<i64>,
    timeout: Option<Duration>,
}

impl SessionRepository {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self::with_count_cache(store, DEFAULT_COUNT_TTL, DEFAULT_COUNT_MAX_ENTRIES)
    }

    pub fn with_count_cache(
        store: Arc<dyn SessionStore>,
        count_ttl: Duration,
        max_entries: usize,
    ) -> Self {
        SessionRepository {
            store,
            counts: TimedCache::new(count_ttl, max_entries),
            timeout: None,
        }
    }

    /// Bound every storage call by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Persist a new online session and return it with its row id.
    pub async fn create(&self, mut session: OnlineSession) -> Result<OnlineSession> {
        if session.id.is_none() {
            session.id = Some(Uuid::new_v4());
        }

        with_deadline(self.timeout, self.store.insert_session(&session)).await?;
        self.invalidate_count(&session.username);

        debug!(
            session_id = %session.acct_session_id,
            username = %session.username,
            "Online session created"
        );
        Ok(session)
    }

    /// Write counters, session time and last-update time.
    ///
    /// Returns `NotFound` if no online session has this session id.
    pub async fn update(&self, session: &OnlineSession) -> Result<()> {
        let changed = with_deadline(self.timeout, self.store.update_session(session)).await?;
        if changed == 0 {
            return Err(Error::not_found(
                "online session",
                session.acct_session_id.as_str(),
            ));
        }
        Ok(())
    }

    /// Remove a session and return the number of rows removed.
    pub async fn delete(&self, acct_session_id: &str) -> Result<u64> {
        // The username is only needed for count invalidation
        let username = match with_deadline(self.timeout, self.store.get_session(acct_session_id))
            .await
        {
            Ok(session) => session.username,
            Err(e) => {
                debug!(session_id = acct_session_id, error = %e, "Username lookup before delete failed");
                String::new()
            }
        };

        let removed =
            with_deadline(self.timeout, self.store.delete_session(acct_session_id)).await?;
        self.invalidate_count(&username);
        Ok(removed)
    }

    pub async fn get_by_session_id(&self, acct_session_id: &str) -> Result<OnlineSession> {
        with_deadline(self.timeout, self.store.get_session(acct_session_id)).await
    }

    /// Number of sessions `username` has online.
    ///
    /// Served from the count cache when fresh. An empty username is always
    /// counted against storage and never cached.
    pub async fn count_by_username(&self, username: &str) -> Result<i64> {
        if username.is_empty() {
            return with_deadline(self.timeout, self.store.count_sessions(username)).await;
        }

        if let Some(count) = self.counts.get(username) {
            return Ok(count);
        }

        let generation = self.counts.generation();
        let count = with_deadline(self.timeout, self.store.count_sessions(username)).await?;
        self.counts.set_if_current(username, count, generation);
        Ok(count)
    }

    /// Uncached existence check
    pub async fn exists(&self, acct_session_id: &str) -> Result<bool> {
        with_deadline(self.timeout, self.store.session_exists(acct_session_id)).await
    }

    /// All online sessions of one user, oldest first
    pub async fn list_by_username(&self, username: &str) -> Result<Vec<OnlineSession>> {
        with_deadline(self.timeout, self.store.list_sessions(username)).await
    }

    /// Remove sessions by row id. Clears the whole count cache.
    pub async fn batch_delete(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let removed = with_deadline(self.timeout, self.store.delete_sessions_by_ids(ids)).await?;
        self.counts.clear();
        debug!(requested = ids.len(), removed, "Batch deleted online sessions");
        Ok(removed)
    }

    /// Remove every session reported by a NAS, matched by address or
    /// identifier. Clears the whole count cache.
    pub async fn batch_delete_by_nas(&self, nas_addr: &str, nas_id: &str) -> Result<u64> {
        if nas_addr.is_empty() && nas_id.is_empty() {
            return Err(Error::Validation(
                "NAS address or NAS identifier required".to_string(),
            ));
        }
        let removed = with_deadline(
            self.timeout,
            self.store.delete_sessions_by_nas(nas_addr, nas_id),
        )
        .await?;
        self.counts.clear();
        debug!(nas_addr, nas_id, removed, "Cleared online sessions for NAS");
        Ok(removed)
    }

    /// Remove sessions whose last update is older than `ttl`. Clears the
    /// whole count cache.
    ///
    /// Sessions go stale when the NAS never sends their Stop.
    pub async fn purge_stale(&self, ttl: Duration) -> Result<u64> {
        if ttl.is_zero() {
            return Err(Error::Validation(
                "stale session ttl must be positive".to_string(),
            ));
        }
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|_| Error::Validation(format!("stale session ttl {:?} too large", ttl)))?;
        let cutoff = Utc::now() - ttl;

        let removed = with_deadline(
            self.timeout,
            self.store.delete_sessions_idle_since(cutoff),
        )
        .await?;
        self.counts.clear();
        if removed > 0 {
            info!(removed, cutoff = %cutoff, "Purged stale online sessions");
        }
        Ok(removed)
    }

    /// Build the online row for a fresh session, back-dating the start time
    /// by the session time the NAS already reports.
    pub fn new_session(
        acct_session_id: impl Into<String>,
        username: impl Into<String>,
        session_time: u32,
    ) -> OnlineSession {
        let mut session = OnlineSession::new(acct_session_id, username);
        let now = Utc::now();
        session.acct_session_time = session_time;
        session.acct_start_time = now - chrono::Duration::seconds(i64::from(session_time));
        session.last_update = now;
        session
    }

    fn invalidate_count(&self, username: &str) {
        if !username.is_empty() {
            self.counts.delete(username);
        }
    }
}

impl std::fmt::Debug for SessionRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRepository")
            .field("cached_counts", &self.counts.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}
