//! Record store error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::api::{ObjectKey, ResourceKind};

/// Errors from record store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A record body could not be (de)serialized.
    #[error("Record serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The write was based on a stale copy of the record.
    #[error("Conflict writing {kind} {key}: expected resource version {expected}, found {actual}")]
    Conflict {
        kind: ResourceKind,
        key: ObjectKey,
        expected: u64,
        actual: u64,
    },

    #[error("{kind} {key} not found")]
    NotFound { kind: ResourceKind, key: ObjectKey },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: ResourceKind, key: ObjectKey },

    /// The store lock was poisoned.
    #[error("Record store lock poisoned")]
    LockPoisoned,

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },
}

impl StoreError {
    /// Whether repeating the operation against fresh state may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict { .. } | StoreError::Sqlite(_) | StoreError::LockPoisoned
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Result type for record store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
