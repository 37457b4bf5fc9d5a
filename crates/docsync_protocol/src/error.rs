//! Error types for document records.

use thiserror::Error;

/// Result type for record operations.
pub type RecordResult<T> = Result<T, RecordError>;

/// Errors raised when a record transition is refused.
#[derive(Error, Debug)]
pub enum RecordError {
    /// The record holds an unresolved conflict and is immutable until resolved.
    #[error("document {uuid} has an unresolved conflict")]
    Conflicted {
        /// Document uuid.
        uuid: String,
    },

    /// The record is already marked for deletion.
    #[error("document {uuid} is marked for deletion")]
    PendingDelete {
        /// Document uuid.
        uuid: String,
    },

    /// Resolution was requested for a record without a conflict.
    #[error("document {uuid} has no conflict to resolve")]
    NoConflict {
        /// Document uuid.
        uuid: String,
    },

    /// The uuid is reserved for the replication checkpoint.
    #[error("document id {0:?} is reserved")]
    ReservedId(String),

    /// A payload could not be encoded or decoded.
    #[error("payload codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
