//! Error types for the replication engine.
//!
//! | Error | Scope | Handling |
//! |-------|-------|----------|
//! | `StoreError::Unavailable` | one document | abandoned for this cycle, retried next |
//! | `StoreError::Conflict` | one document | taken down the conflict path, never overwritten |
//! | `SyncError` from `run_cycle` | whole cycle | logged, replication loop halts |
//! | `SyncError::Config` | `start()` | returned immediately |

use docsync_protocol::RecordError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a local or remote store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The document does not exist.
    #[error("document {uuid} not found")]
    NotFound {
        /// Document uuid.
        uuid: String,
    },

    /// The write was based on a stale revision.
    #[error("revision conflict for document {uuid}")]
    Conflict {
        /// Document uuid.
        uuid: String,
    },

    /// Transient I/O failure (network, disk).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Non-transient backend failure.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored document could not be encoded or decoded.
    #[error("store codec error: {0}")]
    Codec(String),
}

impl StoreError {
    /// Creates a transient error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Returns true for a stale-revision write conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Returns true if the operation can be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Codec(err.to_string())
    }
}

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by the replication engine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Engine is misconfigured (missing store, invalid settings).
    #[error("configuration error: {0}")]
    Config(String),

    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A record transition was refused.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// The checkpoint document is unreadable.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// The requested document does not exist locally.
    #[error("document {uuid} not found")]
    DocumentNotFound {
        /// Document uuid.
        uuid: String,
    },

    /// Operation not allowed in the engine's current state.
    #[error("invalid state transition from {from} to {to}")]
    InvalidState {
        /// Current state.
        from: String,
        /// Attempted operation.
        to: String,
    },
}

impl SyncError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns true if a later attempt may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Store(err) => err.is_retryable(),
            _ => false,
        }
    }
}
