//! Accounting history
//!
//! One [`AccountingRecord`] is written per session on Start and closed on
//! Stop. Closed records are kept for `radius.acct_history_days` and then
//! purged.

use crate::error::{Error, Result};
use crate::model::AccountingRecord;
use crate::settings::SettingsStore;
use crate::store::{with_deadline, AccountingStore};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

pub struct AccountingRepository {
    store: Arc<dyn AccountingStore>,
    timeout: Option<Duration>,
}

impl AccountingRepository {
    pub fn new(store: Arc<dyn AccountingStore>) -> Self {
        AccountingRepository {
            store,
            timeout: None,
        }
    }

    /// Bound every storage call by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Insert an open record, assigning a row id when absent.
    pub async fn create(&self, mut record: AccountingRecord) -> Result<AccountingRecord> {
        if record.id.is_none() {
            record.id = Some(Uuid::new_v4());
        }
        with_deadline(self.timeout, self.store.insert_record(&record)).await?;
        debug!(
            session_id = %record.acct_session_id,
            username = %record.username,
            "Accounting record opened"
        );
        Ok(record)
    }

    /// Close the open record of a session with the final counters.
    ///
    /// Writes stop time, session time, totals, packet counts and terminate
    /// cause. If no open record matches, nothing is written and `NotFound`
    /// is returned.
    pub async fn update_stop(
        &self,
        acct_session_id: &str,
        record: &AccountingRecord,
    ) -> Result<()> {
        let mut closing = record.clone();
        if closing.acct_stop_time.is_none() {
            closing.acct_stop_time = Some(Utc::now());
        }

        let changed = with_deadline(
            self.timeout,
            self.store.close_record(acct_session_id, &closing),
        )
        .await?;
        if changed == 0 {
            return Err(Error::not_found("accounting", acct_session_id));
        }
        Ok(())
    }

    /// Every record written for a session id, open or closed
    pub async fn list_by_session_id(&self, acct_session_id: &str) -> Result<Vec<AccountingRecord>> {
        with_deadline(self.timeout, self.store.list_records(acct_session_id)).await
    }

    /// Delete closed records that stopped more than `retention_days` ago.
    pub async fn purge_history(&self, retention_days: i64) -> Result<u64> {
        if retention_days < 1 {
            return Err(Error::Validation(format!(
                "retention must be at least one day, got {}",
                retention_days
            )));
        }

        let cutoff = Utc::now() - ChronoDuration::days(retention_days);
        let removed = with_deadline(self.timeout, self.store.delete_closed_before(cutoff)).await?;
        if removed > 0 {
            info!(removed, retention_days, "Purged accounting history");
        }
        Ok(removed)
    }

    /// Purge using the configured `radius.acct_history_days`.
    pub async fn purge_with_settings(&self, settings: &SettingsStore) -> Result<u64> {
        self.purge_history(settings.acct_history_days()).await
    }
}

impl std::fmt::Debug for AccountingRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountingRepository")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OnlineSession;
    use crate::store::MemoryStore;

    fn open_record(sid: &str) -> AccountingRecord {
        AccountingRecord::from(&OnlineSession::new(sid, "alice"))
    }

    #[tokio::test]
    async fn test_create_assigns_id() {
        let store = Arc::new(MemoryStore::new());
        let repo = AccountingRepository::new(store.clone());

        let record = repo.create(open_record("s1")).await.unwrap();
        assert!(record.id.is_some());
        assert!(record.is_open());
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_stop_closes_record() {
        let store = Arc::new(MemoryStore::new());
        let repo = AccountingRepository::new(store.clone());
        repo.create(open_record("s1")).await.unwrap();

        let mut stop = open_record("s1");
        stop.acct_session_time = 3600;
        stop.acct_input_total = 8_589_935_592;
        stop.acct_output_total = 42;
        stop.acct_terminate_cause = Some(1);
        repo.update_stop("s1", &stop).await.unwrap();

        let records = repo.list_by_session_id("s1").await.unwrap();
        assert_eq!(records.len(), 1);
        let closed = &records[0];
        assert!(!closed.is_open());
        assert_eq!(closed.acct_session_time, 3600);
        assert_eq!(closed.acct_input_total, 8_589_935_592);
        assert_eq!(closed.acct_terminate_cause, Some(1));
    }

    #[tokio::test]
    async fn test_update_stop_without_open_record() {
        let store = Arc::new(MemoryStore::new());
        let repo = AccountingRepository::new(store.clone());

        let err = repo.update_stop("ghost", &open_record("ghost")).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.record_count().await, 0);

        // A second Stop for an already closed session also fails
        repo.create(open_record("s1")).await.unwrap();
        repo.update_stop("s1", &open_record("s1")).await.unwrap();
        let err = repo.update_stop("s1", &open_record("s1")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_purge_history() {
        let store = Arc::new(MemoryStore::new());
        let repo = AccountingRepository::new(store.clone());

        let mut old = open_record("old");
        old.acct_stop_time = Some(Utc::now() - ChronoDuration::days(200));
        store.insert_record(&old).await.unwrap();

        let mut recent = open_record("recent");
        recent.acct_stop_time = Some(Utc::now() - ChronoDuration::days(10));
        store.insert_record(&recent).await.unwrap();

        repo.create(open_record("open")).await.unwrap();

        assert_eq!(repo.purge_history(180).await.unwrap(), 1);
        assert_eq!(store.record_count().await, 2);
        assert!(matches!(
            repo.purge_history(0).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_purge_with_settings() {
        let store = Arc::new(MemoryStore::new());
        let repo = AccountingRepository::new(store.clone());
        let settings = SettingsStore::new(store.clone());
        settings.set("radius.acct_history_days", "5").await.unwrap();

        let mut stale = open_record("stale");
        stale.acct_stop_time = Some(Utc::now() - ChronoDuration::days(10));
        store.insert_record(&stale).await.unwrap();

        assert_eq!(repo.purge_with_settings(&settings).await.unwrap(), 1);
    }
}
