//! CLI error type.

use docsync_engine::{StoreError, SyncError};
use docsync_protocol::RecordError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by `docsync` commands.
#[derive(Error, Debug)]
pub enum CliError {
    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A state file or argument is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Another process holds the state file.
    #[error("state file {} is locked by another process", .0.display())]
    Locked(PathBuf),

    /// Payload argument is valid JSON but not an object.
    #[error("document payload must be a JSON object")]
    InvalidPayload,

    /// The named document does not exist.
    #[error("document {uuid} not found")]
    NotFound {
        /// Document uuid.
        uuid: String,
    },

    /// The replication loop stopped on a cycle-level failure.
    #[error("replication halted: {0}")]
    Halted(String),

    /// Engine failure.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Refused record transition.
    #[error(transparent)]
    Record(#[from] RecordError),
}
