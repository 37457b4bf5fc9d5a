//! Replicable document records.

use crate::error::{RecordError, RecordResult};
use crate::remote::RemoteDocument;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved uuid of the checkpoint document. Never replicated.
pub const ROOT_DOCUMENT_ID: &str = "root";

/// Application-owned document content. The engine never inspects its fields.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Opaque revision token issued by whichever store last wrote a document.
///
/// Revisions are compared for equality only; they are never parsed or ordered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    /// Creates a revision from a store-issued token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Revision {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for Revision {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// How a conflicted record should be settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Restore the preserved local edit and push it over the remote revision.
    KeepLocal,
    /// Keep the adopted remote version and discard the preserved edit.
    AcceptRemote,
}

/// One document plus its replication metadata.
///
/// # Invariants
///
/// - `uuid` never changes once assigned.
/// - At most one of `local_delete` and `conflict_payload` is set.
/// - A record with `conflict_payload` is immutable to edits and deletes
///   until [`DocumentRecord::resolve_conflict`] clears it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    /// Globally unique document id.
    pub uuid: String,
    /// Revision last seen from the remote store; `None` for never-pushed documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revision>,
    /// Document content.
    #[serde(default)]
    pub payload: Payload,
    /// Local copy was mutated since the last successful push or pull.
    #[serde(default)]
    pub local_change: bool,
    /// Local copy is marked for deletion that has not reached the remote yet.
    #[serde(default)]
    pub local_delete: bool,
    /// Local edit preserved when it collided with a divergent remote revision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_payload: Option<Payload>,
}

impl DocumentRecord {
    /// Creates an unsynced local document.
    pub fn new(uuid: impl Into<String>, payload: Payload) -> Self {
        Self {
            uuid: uuid.into(),
            revision: None,
            payload,
            local_change: true,
            local_delete: false,
            conflict_payload: None,
        }
    }

    /// Creates an unsynced local document with a freshly generated v4 uuid.
    pub fn generate(payload: Payload) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), payload)
    }

    /// Creates a clean record from a document fetched from the remote store.
    pub fn from_remote(document: RemoteDocument) -> Self {
        Self {
            uuid: document.uuid,
            revision: document.revision,
            payload: document.payload,
            local_change: false,
            local_delete: false,
            conflict_payload: None,
        }
    }

    /// Returns true for the reserved checkpoint document.
    pub fn is_root(&self) -> bool {
        self.uuid == ROOT_DOCUMENT_ID
    }

    /// Returns true if an unresolved conflict is pending.
    pub fn has_conflict(&self) -> bool {
        self.conflict_payload.is_some()
    }

    /// Replaces the payload with a local edit.
    pub fn edit(&mut self, payload: Payload) -> RecordResult<()> {
        self.ensure_mutable()?;
        if self.local_delete {
            return Err(RecordError::PendingDelete {
                uuid: self.uuid.clone(),
            });
        }
        self.payload = payload;
        self.local_change = true;
        Ok(())
    }

    /// Marks the record for deletion on the next cycle.
    pub fn mark_deleted(&mut self) -> RecordResult<()> {
        self.ensure_mutable()?;
        self.local_delete = true;
        Ok(())
    }

    /// Snapshots the current payload as the conflicting local edit.
    ///
    /// An existing snapshot is kept: the first unsynced edit is the one preserved.
    pub fn record_conflict(&mut self) {
        if self.conflict_payload.is_none() {
            self.conflict_payload = Some(self.payload.clone());
        }
    }

    /// Withdraws a pending deletion the remote store refused as stale.
    ///
    /// The content that was to be deleted becomes the conflict snapshot.
    pub fn withdraw_delete(&mut self) {
        self.local_delete = false;
        self.record_conflict();
    }

    /// Adopts a remote version as the new clean baseline.
    pub fn adopt_remote(&mut self, revision: Option<Revision>, payload: Payload) {
        self.revision = revision;
        self.payload = payload;
        self.local_change = false;
    }

    /// Settles a pending conflict.
    pub fn resolve_conflict(&mut self, resolution: ConflictResolution) -> RecordResult<()> {
        let preserved = self.conflict_payload.take().ok_or_else(|| RecordError::NoConflict {
            uuid: self.uuid.clone(),
        })?;

        if resolution == ConflictResolution::KeepLocal {
            self.payload = preserved;
            self.local_change = true;
        }
        Ok(())
    }

    /// Builds the document sent to the remote store on push.
    ///
    /// Top-level `_`-prefixed keys are reserved for document metadata and
    /// are not sent.
    pub fn to_remote_document(&self) -> RemoteDocument {
        let payload = self
            .payload
            .iter()
            .filter(|(key, _)| !key.starts_with('_'))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        RemoteDocument {
            uuid: self.uuid.clone(),
            revision: self.revision.clone(),
            payload,
        }
    }

    fn ensure_mutable(&self) -> RecordResult<()> {
        if self.is_root() {
            return Err(RecordError::ReservedId(self.uuid.clone()));
        }
        if self.has_conflict() {
            return Err(RecordError::Conflicted {
                uuid: self.uuid.clone(),
            });
        }
        Ok(())
    }
}
