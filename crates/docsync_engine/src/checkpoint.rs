//! Replication checkpoint persistence.
//!
//! The checkpoint lives in the local store as the reserved `root` document.
//! It is written once per cycle, after every document action of that cycle
//! has settled, so a crash before the write only causes the same batch of
//! remote changes to be reprocessed. Classification is idempotent, which
//! makes the reprocessing safe.

use crate::error::{SyncError, SyncResult};
use crate::store::LocalStore;
use docsync_protocol::{
    ChangeToken, CheckpointDocument, CycleStats, DocumentRecord, ROOT_DOCUMENT_ID,
};
use std::sync::Arc;
use tracing::debug;

/// Reads and writes the checkpoint document.
pub struct CheckpointStore<L: LocalStore> {
    local: Arc<L>,
}

impl<L: LocalStore> CheckpointStore<L> {
    /// Creates a checkpoint store over a local store.
    pub fn new(local: Arc<L>) -> Self {
        Self { local }
    }

    /// Loads the checkpoint. A missing document means "never replicated".
    pub async fn load(&self) -> SyncResult<CheckpointDocument> {
        match self.local.get(ROOT_DOCUMENT_ID).await? {
            Some(record) => CheckpointDocument::from_payload(&record.payload)
                .map_err(|e| SyncError::Checkpoint(e.to_string())),
            None => Ok(CheckpointDocument::default()),
        }
    }

    /// Moves the replication point to `token` and appends `stats`.
    pub async fn save(
        &self,
        token: ChangeToken,
        stats: CycleStats,
    ) -> SyncResult<CheckpointDocument> {
        let mut checkpoint = self.load().await?;
        debug!(token = %token, "advancing replication checkpoint");
        checkpoint.advance(token, stats);
        self.write(checkpoint).await
    }

    /// Appends `stats` without moving the replication point.
    pub async fn append_history(&self, stats: CycleStats) -> SyncResult<CheckpointDocument> {
        let mut checkpoint = self.load().await?;
        debug!(
            point = ?checkpoint.last_replication_point,
            "holding replication checkpoint"
        );
        checkpoint.record(stats);
        self.write(checkpoint).await
    }

    /// Clears the replication point, keeping history and document flags.
    pub async fn reset(&self) -> SyncResult<CheckpointDocument> {
        let mut checkpoint = self.load().await?;
        checkpoint.reset();
        self.write(checkpoint).await
    }

    async fn write(&self, checkpoint: CheckpointDocument) -> SyncResult<CheckpointDocument> {
        let payload = checkpoint
            .to_payload()
            .map_err(|e| SyncError::Checkpoint(e.to_string()))?;
        let record = DocumentRecord {
            local_change: false,
            ..DocumentRecord::new(ROOT_DOCUMENT_ID, payload)
        };
        self.local.save(record).await?;
        Ok(checkpoint)
    }
}
