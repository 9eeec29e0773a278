//! Storage contracts consumed by the core
//!
//! The core never talks to a database directly. Each component depends on
//! the narrowest trait that covers what it needs, so tests and alternative
//! deployments can substitute their own implementations.
//!
//! # Implementations
//!
//! - [`MemoryStore`]: in-process maps (single node, tests)
//! - `PgStore`: PostgreSQL via sqlx (`postgres` feature)
//!
//! All methods are async and cancel cleanly when their future is dropped;
//! callers that need a deadline wrap them in `tokio::time::timeout`
//! (the repositories do this when a storage timeout is configured).

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

use crate::error::{Error, StoreError};
use crate::model::{Account, AccountingRecord, OnlineSession, Profile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

/// Given a profile id, return the profile or fail
///
/// This is all the profile cache needs from storage.
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    async fn get_profile(&self, id: i64) -> Result<Profile, StoreError>;
}

/// Profile persistence used by management write paths
#[async_trait]
pub trait ProfileStore: ProfileLookup {
    async fn upsert_profile(&self, profile: &Profile) -> Result<(), StoreError>;

    /// Returns `NotFound` if no profile had this id.
    async fn delete_profile(&self, id: i64) -> Result<(), StoreError>;
}

/// Account persistence, keyed by username
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(&self, username: &str) -> Result<Account, StoreError>;

    async fn upsert_account(&self, account: &Account) -> Result<(), StoreError>;
}

/// Online session table, keyed by Acct-Session-Id
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new row. Returns `Conflict` if the session id is already online.
    async fn insert_session(&self, session: &OnlineSession) -> Result<(), StoreError>;

    /// Write counters, session time and last-update time of the row with the
    /// same session id. Returns the number of rows changed.
    async fn update_session(&self, session: &OnlineSession) -> Result<u64, StoreError>;

    /// Returns the number of rows removed.
    async fn delete_session(&self, acct_session_id: &str) -> Result<u64, StoreError>;

    async fn get_session(&self, acct_session_id: &str) -> Result<OnlineSession, StoreError>;

    async fn session_exists(&self, acct_session_id: &str) -> Result<bool, StoreError>;

    async fn count_sessions(&self, username: &str) -> Result<i64, StoreError>;

    async fn list_sessions(&self, username: &str) -> Result<Vec<OnlineSession>, StoreError>;

    async fn delete_sessions_by_ids(&self, ids: &[Uuid]) -> Result<u64, StoreError>;

    /// Remove sessions whose NAS address or NAS identifier matches.
    /// Empty arguments never match.
    async fn delete_sessions_by_nas(&self, nas_addr: &str, nas_id: &str)
        -> Result<u64, StoreError>;

    /// Remove sessions last updated before `cutoff`.
    async fn delete_sessions_idle_since(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Accounting history table
#[async_trait]
pub trait AccountingStore: Send + Sync {
    async fn insert_record(&self, record: &AccountingRecord) -> Result<(), StoreError>;

    /// Close the open record for this session id with the stop fields of
    /// `record`. Returns the number of rows changed; zero means no open
    /// record matched.
    async fn close_record(
        &self,
        acct_session_id: &str,
        record: &AccountingRecord,
    ) -> Result<u64, StoreError>;

    async fn list_records(&self, acct_session_id: &str)
        -> Result<Vec<AccountingRecord>, StoreError>;

    /// Delete closed records that stopped before `cutoff`.
    async fn delete_closed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Persistence for runtime settings
#[async_trait]
pub trait SettingsBackend: Send + Sync {
    async fn load_settings(&self) -> Result<Vec<(String, String)>, StoreError>;

    async fn save_setting(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Run a storage call, bounded by `deadline` when one is configured.
pub(crate) async fn with_deadline<T, F>(deadline: Option<Duration>, call: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match deadline {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::Timeout(limit)),
        },
        None => call.await.map_err(Error::from),
    }
}
