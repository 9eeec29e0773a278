//! Error types for the AAA core

use aaa_proto::AccountingError;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by storage implementations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No row matched the lookup key
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A row with the same unique key already exists
    #[error("{entity} already exists: {key}")]
    Conflict { entity: &'static str, key: String },

    /// Backend (database, connection) failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Stored data could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(format!("JSON error: {}", err))
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound {
                entity: "row",
                key: String::new(),
            },
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Conflict {
                entity: "row",
                key: db.constraint().unwrap_or_default().to_string(),
            },
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Serialization(err.to_string())
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Errors returned by the core components
#[derive(Debug, Error)]
pub enum Error {
    /// An expected record does not exist
    #[error("no {entity} record found for {key}")]
    NotFound { entity: &'static str, key: String },

    /// Input rejected before any state was changed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage layer failure, passed through unchanged
    #[error("Storage error: {0}")]
    Storage(StoreError),

    /// Storage call exceeded the configured deadline
    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed accounting request from the bridge
    #[error("Protocol error: {0}")]
    Protocol(#[from] AccountingError),
}

impl Error {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Error::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, key } => Error::NotFound { entity, key },
            other => Error::Storage(other),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
