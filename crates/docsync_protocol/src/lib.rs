//! # docsync protocol
//!
//! Document, change-feed and checkpoint types for docsync replication.
//!
//! This crate provides:
//! - `DocumentRecord`, one replicable document plus its replication flags
//! - `RemoteDocument` in the CouchDB document shape (`_id`, `_rev`, payload)
//! - `ChangesResponse` / `RemoteChangeSet` for the remote changes feed
//! - `CheckpointDocument` and per-cycle `CycleStats`
//! - `classify`, the decision function mapping a record to an `Action`
//!
//! This is a pure crate with no I/O operations.
//!
//! ## Classification precedence
//!
//! ```text
//! root id                                  -> None
//! localDelete                              -> LocalDelete
//! conflictPayload | (localChange & diverged) -> Conflict
//! diverged                                 -> RemotePull
//! localChange                              -> LocalPush
//! otherwise                                -> None
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod action;
mod changes;
mod checkpoint;
mod error;
mod record;
mod remote;

pub use action::{classify, classify_remote_only, Action};
pub use changes::{ChangeEntry, ChangeToken, ChangesResponse, RemoteChange, RemoteChangeSet};
pub use checkpoint::{CheckpointDocument, CycleStats};
pub use error::{RecordError, RecordResult};
pub use record::{ConflictResolution, DocumentRecord, Payload, Revision, ROOT_DOCUMENT_ID};
pub use remote::RemoteDocument;
