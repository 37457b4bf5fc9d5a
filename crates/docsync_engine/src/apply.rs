//! Per-document action appliers.
//!
//! A failed applier leaves the record's revision and flags as they were, so
//! the document re-enters classification unchanged on the next cycle.

use crate::error::{StoreError, StoreResult};
use crate::store::{LocalStore, RemoteStore};
use docsync_protocol::{Action, CycleStats, DocumentRecord, Payload, RemoteChange, RemoteDocument};
use tracing::{debug, info};

/// Result of a successfully applied action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Nothing was written.
    Nothing,
    /// Local edit reached the remote store.
    Pushed,
    /// Remote version overwrote the local copy.
    Pulled,
    /// A remote-only document was copied locally.
    Created,
    /// Local record removed because the remote copy is gone.
    RemoteDeleted,
    /// Local deletion reached the remote store and the record was removed.
    LocalDeleted,
    /// The remote store rejected a write as stale; the local edit was
    /// preserved as a conflict and the remote version adopted.
    Diverged,
}

impl Applied {
    /// Adds this outcome to the cycle statistics.
    pub fn tally(self, stats: &mut CycleStats) {
        match self {
            Applied::Nothing => {}
            Applied::Pushed => stats.local_updates_pushed += 1,
            Applied::Pulled | Applied::Created => stats.remote_updates_pulled += 1,
            Applied::RemoteDeleted => stats.remote_deletes += 1,
            Applied::LocalDeleted => stats.local_deletes += 1,
            Applied::Diverged => {
                stats.conflicts_found += 1;
                stats.remote_updates_pulled += 1;
            }
        }
    }
}

/// Adds a classification to the cycle statistics.
pub fn tally_classified(action: Action, stats: &mut CycleStats) {
    match action {
        Action::LocalPush => stats.local_updates_found += 1,
        Action::RemotePull | Action::RemoteCreate => stats.remote_updates_found += 1,
        Action::Conflict => {
            stats.conflicts_found += 1;
            stats.remote_updates_found += 1;
        }
        Action::None | Action::LocalDelete => {}
    }
}

/// Applies classified actions against a store pair.
pub struct DocumentApplier<'a, L: LocalStore, R: RemoteStore> {
    local: &'a L,
    remote: &'a R,
}

impl<'a, L: LocalStore, R: RemoteStore> DocumentApplier<'a, L, R> {
    /// Creates an applier over borrowed stores.
    pub fn new(local: &'a L, remote: &'a R) -> Self {
        Self { local, remote }
    }

    /// Applies `action` to a local record.
    pub async fn apply(
        &self,
        action: Action,
        record: DocumentRecord,
        change: Option<&RemoteChange>,
    ) -> StoreResult<Applied> {
        match action {
            Action::None => Ok(Applied::Nothing),
            Action::LocalDelete => self.local_delete(record).await,
            Action::Conflict => self.conflict(record, change).await,
            Action::RemotePull => self.remote_pull(record, change).await,
            Action::LocalPush => self.local_push(record).await,
            Action::RemoteCreate => self.remote_create(&record.uuid).await,
        }
    }

    /// Propagates a local deletion, then removes the local record.
    ///
    /// If the remote copy moved on since the record was last synced, the
    /// deletion is withdrawn: the deleted content becomes the conflict
    /// snapshot and the remote version is adopted.
    pub async fn local_delete(&self, mut record: DocumentRecord) -> StoreResult<Applied> {
        if let Some(revision) = record.revision.clone() {
            match self.remote.delete(&record.uuid, &revision).await {
                Ok(()) => {}
                Err(StoreError::NotFound { .. }) => {
                    debug!(uuid = %record.uuid, "remote copy already deleted");
                }
                Err(StoreError::Conflict { .. }) => {
                    info!(uuid = %record.uuid, "remote copy changed, withdrawing local delete");
                    record.withdraw_delete();
                    self.conflict(record, None).await?;
                    return Ok(Applied::Diverged);
                }
                Err(err) => return Err(err),
            }
        }
        self.local.delete(&record.uuid).await?;
        Ok(Applied::LocalDeleted)
    }

    /// Preserves the local edit in `conflict_payload` and adopts the remote
    /// version in a single local write.
    pub async fn conflict(
        &self,
        mut record: DocumentRecord,
        change: Option<&RemoteChange>,
    ) -> StoreResult<Applied> {
        let fetched = self.fetch(&record.uuid, change).await?;
        if !record.has_conflict() {
            info!(uuid = %record.uuid, "conflict detected, preserving local edit");
            record.record_conflict();
        }
        match fetched {
            Some(document) => record.adopt_remote(document.revision, document.payload),
            None => record.adopt_remote(None, Payload::new()),
        }
        self.local.save(record).await?;
        Ok(Applied::Pulled)
    }

    /// Overwrites the local copy with the remote version.
    pub async fn remote_pull(
        &self,
        mut record: DocumentRecord,
        change: Option<&RemoteChange>,
    ) -> StoreResult<Applied> {
        match self.fetch(&record.uuid, change).await? {
            Some(document) => {
                record.adopt_remote(document.revision, document.payload);
                self.local.save(record).await?;
                Ok(Applied::Pulled)
            }
            None => {
                debug!(uuid = %record.uuid, "remote copy deleted, removing local record");
                self.local.delete(&record.uuid).await?;
                Ok(Applied::RemoteDeleted)
            }
        }
    }

    /// Creates a local record for a document only the remote store has.
    pub async fn remote_create(&self, uuid: &str) -> StoreResult<Applied> {
        match self.remote.get(uuid).await? {
            Some(document) => {
                self.local.save(DocumentRecord::from_remote(document)).await?;
                Ok(Applied::Created)
            }
            None => Ok(Applied::Nothing),
        }
    }

    /// Sends the local edit to the remote store and adopts the new revision.
    ///
    /// A stale-revision rejection is never retried as an overwrite: the edit
    /// takes the conflict path against the current remote version.
    pub async fn local_push(&self, mut record: DocumentRecord) -> StoreResult<Applied> {
        let revision = match self.remote.save(record.to_remote_document()).await {
            Ok(revision) => revision,
            Err(StoreError::Conflict { .. }) => {
                info!(uuid = %record.uuid, "push rejected as stale");
                self.conflict(record, None).await?;
                return Ok(Applied::Diverged);
            }
            Err(err) => return Err(err),
        };
        record.revision = Some(revision);
        record.local_change = false;
        self.local.save(record).await?;
        Ok(Applied::Pushed)
    }

    async fn fetch(
        &self,
        uuid: &str,
        change: Option<&RemoteChange>,
    ) -> StoreResult<Option<RemoteDocument>> {
        if change.is_some_and(|c| c.deleted) {
            return Ok(None);
        }
        self.remote.get(uuid).await
    }
}
