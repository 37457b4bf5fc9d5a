//! Store contracts consumed by the engine.
//!
//! Every method is a potential suspension point. The engine awaits each call
//! to completion before issuing the next one, so implementations need not be
//! safe for concurrent access on the same uuid.

use crate::error::StoreResult;
use async_trait::async_trait;
use docsync_protocol::{ChangeToken, ChangesResponse, DocumentRecord, RemoteDocument, Revision};

/// Key-addressed local document persistence.
#[async_trait]
pub trait LocalStore: Send + Sync + 'static {
    /// Store-specific setup, run once by `SyncEngine::start`.
    async fn initialize(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Fetches a record by uuid.
    async fn get(&self, uuid: &str) -> StoreResult<Option<DocumentRecord>>;

    /// Inserts or replaces a record keyed by its uuid.
    async fn save(&self, record: DocumentRecord) -> StoreResult<DocumentRecord>;

    /// Removes a record. Removing a missing record is not an error.
    async fn delete(&self, uuid: &str) -> StoreResult<()>;

    /// Returns a full snapshot of all records.
    async fn get_all(&self) -> StoreResult<Vec<DocumentRecord>>;
}

/// Remote document persistence with a changes feed.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Store-specific setup, run once by `SyncEngine::start`.
    async fn initialize(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Fetches a live document by uuid.
    async fn get(&self, uuid: &str) -> StoreResult<Option<RemoteDocument>>;

    /// Writes a document and returns its new revision.
    ///
    /// Fails with `StoreError::Conflict` if `document.revision` is stale.
    async fn save(&self, document: RemoteDocument) -> StoreResult<Revision>;

    /// Deletes the document at `revision`.
    async fn delete(&self, uuid: &str, revision: &Revision) -> StoreResult<()>;

    /// Returns changes after `since`; `None` reads from the beginning.
    async fn get_changes(&self, since: Option<&ChangeToken>) -> StoreResult<ChangesResponse>;
}
