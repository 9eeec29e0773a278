//! In-memory storage implementation

use super::{
    AccountStore, AccountingStore, ProfileLookup, ProfileStore, SessionStore, SettingsBackend,
};
use crate::error::StoreError;
use crate::model::{Account, AccountingRecord, OnlineSession, Profile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory store
///
/// Keeps every table in local memory. It provides no persistence and is
/// meant for single-node deployments, development and tests.
///
/// # Thread Safety
///
/// Online sessions live in a `DashMap` (the hot table); everything else
/// uses `tokio::sync::RwLock` for concurrent access from async tasks.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
    profiles: Arc<RwLock<HashMap<i64, Profile>>>,
    sessions: Arc<DashMap<String, OnlineSession>>,
    records: Arc<RwLock<Vec<AccountingRecord>>>,
    settings: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of online sessions across all users
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of accounting records, open or closed
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Clear all stored data
    pub async fn clear(&self) {
        self.accounts.write().await.clear();
        self.profiles.write().await.clear();
        self.sessions.clear();
        self.records.write().await.clear();
        self.settings.write().await.clear();
    }
}

#[async_trait]
impl ProfileLookup for MemoryStore {
    async fn get_profile(&self, id: i64) -> Result<Profile, StoreError> {
        self.profiles
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("profile", id.to_string()))
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn upsert_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        self.profiles
            .write()
            .await
            .insert(profile.id, profile.clone());
        Ok(())
    }

    async fn delete_profile(&self, id: i64) -> Result<(), StoreError> {
        self.profiles
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("profile", id.to_string()))
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn get_account(&self, username: &str) -> Result<Account, StoreError> {
        self.accounts
            .read()
            .await
            .get(username)
            .cloned()
            .ok_or_else(|| StoreError::not_found("account", username))
    }

    async fn upsert_account(&self, account: &Account) -> Result<(), StoreError> {
        self.accounts
            .write()
            .await
            .insert(account.username.clone(), account.clone());
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: &OnlineSession) -> Result<(), StoreError> {
        match self.sessions.entry(session.acct_session_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict {
                entity: "online session",
                key: session.acct_session_id.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                Ok(())
            }
        }
    }

    async fn update_session(&self, session: &OnlineSession) -> Result<u64, StoreError> {
        match self.sessions.get_mut(&session.acct_session_id) {
            Some(mut row) => {
                row.acct_session_time = session.acct_session_time;
                row.acct_input_total = session.acct_input_total;
                row.acct_output_total = session.acct_output_total;
                row.acct_input_packets = session.acct_input_packets;
                row.acct_output_packets = session.acct_output_packets;
                row.last_update = session.last_update;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_session(&self, acct_session_id: &str) -> Result<u64, StoreError> {
        Ok(self.sessions.remove(acct_session_id).map_or(0, |_| 1))
    }

    async fn get_session(&self, acct_session_id: &str) -> Result<OnlineSession, StoreError> {
        self.sessions
            .get(acct_session_id)
            .map(|row| row.value().clone())
            .ok_or_else(|| StoreError::not_found("online session", acct_session_id))
    }

    async fn session_exists(&self, acct_session_id: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.contains_key(acct_session_id))
    }

    async fn count_sessions(&self, username: &str) -> Result<i64, StoreError> {
        Ok(self
            .sessions
            .iter()
            .filter(|row| row.username == username)
            .count() as i64)
    }

    async fn list_sessions(&self, username: &str) -> Result<Vec<OnlineSession>, StoreError> {
        let mut sessions: Vec<OnlineSession> = self
            .sessions
            .iter()
            .filter(|row| row.username == username)
            .map(|row| row.value().clone())
            .collect();
        sessions.sort_by_key(|s| s.acct_start_time);
        Ok(sessions)
    }

    async fn delete_sessions_by_ids(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| !session.id.is_some_and(|id| ids.contains(&id)));
        Ok((before - self.sessions.len()) as u64)
    }

    async fn delete_sessions_by_nas(
        &self,
        nas_addr: &str,
        nas_id: &str,
    ) -> Result<u64, StoreError> {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| !session.belongs_to_nas(nas_addr, nas_id));
        Ok((before - self.sessions.len()) as u64)
    }

    async fn delete_sessions_idle_since(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.last_update >= cutoff);
        Ok((before - self.sessions.len()) as u64)
    }
}

#[async_trait]
impl AccountingStore for MemoryStore {
    async fn insert_record(&self, record: &AccountingRecord) -> Result<(), StoreError> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn close_record(
        &self,
        acct_session_id: &str,
        record: &AccountingRecord,
    ) -> Result<u64, StoreError> {
        let mut records = self.records.write().await;
        let mut changed = 0;
        for row in records
            .iter_mut()
            .filter(|r| r.acct_session_id == acct_session_id && r.is_open())
        {
            row.acct_stop_time = record.acct_stop_time;
            row.acct_session_time = record.acct_session_time;
            row.acct_input_total = record.acct_input_total;
            row.acct_output_total = record.acct_output_total;
            row.acct_input_packets = record.acct_input_packets;
            row.acct_output_packets = record.acct_output_packets;
            row.acct_terminate_cause = record.acct_terminate_cause;
            changed += 1;
        }
        Ok(changed)
    }

    async fn list_records(
        &self,
        acct_session_id: &str,
    ) -> Result<Vec<AccountingRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.acct_session_id == acct_session_id)
            .cloned()
            .collect())
    }

    async fn delete_closed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| !r.acct_stop_time.is_some_and(|stop| stop < cutoff));
        Ok((before - records.len()) as u64)
    }
}

#[async_trait]
impl SettingsBackend for MemoryStore {
    async fn load_settings(&self) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .settings
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn save_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.settings
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(id: &str, user: &str, nas: &str) -> OnlineSession {
        let mut s = OnlineSession::new(id, user);
        s.id = Some(Uuid::new_v4());
        s.nas_addr = nas.to_string();
        s
    }

    #[tokio::test]
    async fn test_profile_roundtrip() {
        let store = MemoryStore::new();
        let mut profile = Profile::new(1, "gold");
        profile.up_rate = 10240;
        store.upsert_profile(&profile).await.unwrap();

        assert_eq!(store.get_profile(1).await.unwrap().up_rate, 10240);
        store.delete_profile(1).await.unwrap();
        assert!(store.get_profile(1).await.unwrap_err().is_not_found());
        assert!(store.delete_profile(1).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_insert_session_conflict() {
        let store = MemoryStore::new();
        store
            .insert_session(&session("s1", "alice", "10.0.0.1"))
            .await
            .unwrap();

        let err = store
            .insert_session(&session("s1", "bob", "10.0.0.1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn test_update_session_changes_counters_only() {
        let store = MemoryStore::new();
        store
            .insert_session(&session("s1", "alice", "10.0.0.1"))
            .await
            .unwrap();

        let mut update = session("s1", "mallory", "10.9.9.9");
        update.acct_input_total = 500;
        update.acct_session_time = 60;
        assert_eq!(store.update_session(&update).await.unwrap(), 1);

        let row = store.get_session("s1").await.unwrap();
        assert_eq!(row.username, "alice");
        assert_eq!(row.nas_addr, "10.0.0.1");
        assert_eq!(row.acct_input_total, 500);
        assert_eq!(row.acct_session_time, 60);

        assert_eq!(
            store
                .update_session(&session("missing", "alice", ""))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_count_and_delete_by_nas() {
        let store = MemoryStore::new();
        store
            .insert_session(&session("s1", "alice", "10.0.0.1"))
            .await
            .unwrap();
        store
            .insert_session(&session("s2", "alice", "10.0.0.2"))
            .await
            .unwrap();
        store
            .insert_session(&session("s3", "bob", "10.0.0.1"))
            .await
            .unwrap();

        assert_eq!(store.count_sessions("alice").await.unwrap(), 2);
        assert_eq!(
            store.delete_sessions_by_nas("10.0.0.1", "").await.unwrap(),
            2
        );
        assert_eq!(store.count_sessions("alice").await.unwrap(), 1);
        assert_eq!(store.count_sessions("bob").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_idle_sessions() {
        let store = MemoryStore::new();
        let mut idle = session("s1", "alice", "10.0.0.1");
        idle.last_update = Utc::now() - chrono::Duration::minutes(30);
        store.insert_session(&idle).await.unwrap();
        store
            .insert_session(&session("s2", "alice", "10.0.0.1"))
            .await
            .unwrap();

        let cutoff = Utc::now() - chrono::Duration::minutes(10);
        assert_eq!(store.delete_sessions_idle_since(cutoff).await.unwrap(), 1);
        assert!(store.session_exists("s2").await.unwrap());
        assert_eq!(store.delete_sessions_idle_since(cutoff).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_by_ids() {
        let store = MemoryStore::new();
        let s1 = session("s1", "alice", "10.0.0.1");
        let s2 = session("s2", "alice", "10.0.0.1");
        store.insert_session(&s1).await.unwrap();
        store.insert_session(&s2).await.unwrap();

        let removed = store
            .delete_sessions_by_ids(&[s1.id.unwrap(), Uuid::new_v4()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(!store.session_exists("s1").await.unwrap());
        assert!(store.session_exists("s2").await.unwrap());
    }

    #[tokio::test]
    async fn test_close_record_only_touches_open_rows() {
        let store = MemoryStore::new();
        let record = AccountingRecord::from(&session("s1", "alice", "10.0.0.1"));
        store.insert_record(&record).await.unwrap();

        let mut stop = record.clone();
        stop.acct_stop_time = Some(Utc::now());
        stop.acct_output_total = 99;
        assert_eq!(store.close_record("s1", &stop).await.unwrap(), 1);
        // Already closed
        assert_eq!(store.close_record("s1", &stop).await.unwrap(), 0);
        assert_eq!(store.close_record("nope", &stop).await.unwrap(), 0);

        let rows = store.list_records("s1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].acct_output_total, 99);
    }

    #[tokio::test]
    async fn test_delete_closed_before() {
        let store = MemoryStore::new();
        let mut old = AccountingRecord::from(&session("old", "alice", ""));
        old.acct_stop_time = Some(Utc::now() - Duration::days(30));
        let mut recent = AccountingRecord::from(&session("recent", "alice", ""));
        recent.acct_stop_time = Some(Utc::now());
        let open = AccountingRecord::from(&session("open", "alice", ""));

        for r in [&old, &recent, &open] {
            store.insert_record(r).await.unwrap();
        }

        let removed = store
            .delete_closed_before(Utc::now() - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.record_count().await, 2);
    }

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let store = MemoryStore::new();
        store.save_setting("radius.reject_delay_secs", "2").await.unwrap();
        let all = store.load_settings().await.unwrap();
        assert_eq!(
            all,
            vec![("radius.reject_delay_secs".to_string(), "2".to_string())]
        );

        store.clear().await;
        assert!(store.load_settings().await.unwrap().is_empty());
    }
}
