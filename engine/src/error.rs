//! Error types for the sync engine.

use crate::{Key, Record};
use thiserror::Error;

/// Failures reported by a [`LocalStore`](crate::LocalStore).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("local write failed: {0}")]
    WriteFailed(String),

    #[error("local read failed: {0}")]
    ReadFailed(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Failures reported by a [`RemoteClient`](crate::RemoteClient).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The remote has no record for the key. Polling treats this as "no update".
    #[error("remote has no note for key: {0}")]
    NotFound(Key),

    #[error("network error: {0}")]
    Network(String),

    #[error("remote request timed out")]
    Timeout,

    /// The remote refused a store because it holds a version that wins.
    #[error("remote rejected write; current version at {}", .current.updated_at())]
    Rejected { current: Box<Record> },
}

impl RemoteError {
    /// Whether this is the "no record" answer rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}

/// All errors surfaced by the engine's public operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Fatal to a write: nothing was sent to the remote.
    #[error("write aborted: {0}")]
    LocalWriteFailed(#[source] StoreError),

    /// The record is committed locally but the remote did not accept it.
    #[error("note '{}' saved locally but remote publish failed: {source}", .record.key())]
    RemoteWriteFailed {
        record: Box<Record>,
        #[source]
        source: RemoteError,
    },

    /// A background poll failed; reported through `SyncStatus::Failed`.
    #[error("fetching '{key}' failed: {source}")]
    RemoteFetchFailed {
        key: Key,
        #[source]
        source: RemoteError,
    },

    #[error("local read failed: {0}")]
    LocalReadFailed(#[source] StoreError),
}

impl Error {
    /// Whether the caller can retry the operation as-is.
    ///
    /// Only a failed remote publish qualifies: the local copy is already
    /// durable, so re-sending it is safe.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RemoteWriteFailed { .. })
    }

    /// The locally committed record of a failed remote publish.
    pub fn committed_record(&self) -> Option<&Record> {
        match self {
            Error::RemoteWriteFailed { record, .. } => Some(record.as_ref()),
            _ => None,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for local store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type for remote client operations.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;
