//! In-memory stores with fault injection.
//!
//! `MemoryRemoteStore` follows CouchDB semantics closely enough to exercise
//! every replication path: a sequence-numbered changes feed, generation
//! prefixed revisions, stale-revision conflicts and deletion tombstones.

use crate::error::{StoreError, StoreResult};
use crate::store::{LocalStore, RemoteStore};
use async_trait::async_trait;
use docsync_protocol::{
    ChangeEntry, ChangeToken, ChangesResponse, DocumentRecord, Payload, RemoteDocument, Revision,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `get`
    Get,
    /// `save`
    Save,
    /// `delete`
    Delete,
    /// `get_all`
    GetAll,
    /// `get_changes`
    GetChanges,
}

/// Injects failures into store operations until cleared.
#[derive(Debug, Default)]
pub struct FaultInjector {
    faults: Mutex<HashMap<(StoreOp, Option<String>), StoreError>>,
}

impl FaultInjector {
    /// Makes every call of `op` fail with `error`.
    pub fn fail(&self, op: StoreOp, error: StoreError) {
        self.faults.lock().insert((op, None), error);
    }

    /// Makes calls of `op` for one uuid fail with `error`.
    pub fn fail_document(&self, op: StoreOp, uuid: impl Into<String>, error: StoreError) {
        self.faults.lock().insert((op, Some(uuid.into())), error);
    }

    /// Removes all injected failures.
    pub fn clear(&self) {
        self.faults.lock().clear();
    }

    /// Returns the injected failure for a call, if any.
    pub fn check(&self, op: StoreOp, uuid: Option<&str>) -> StoreResult<()> {
        let faults = self.faults.lock();
        if let Some(uuid) = uuid {
            if let Some(err) = faults.get(&(op, Some(uuid.to_string()))) {
                return Err(err.clone());
            }
        }
        match faults.get(&(op, None)) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// An in-memory local store.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    records: RwLock<BTreeMap<String, DocumentRecord>>,
    faults: FaultInjector,
}

impl MemoryLocalStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the given records.
    pub fn from_records(records: impl IntoIterator<Item = DocumentRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Inserts or replaces a record without fault checks.
    pub fn insert(&self, record: DocumentRecord) {
        self.records.write().insert(record.uuid.clone(), record);
    }

    /// Returns a copy of one record.
    pub fn record(&self, uuid: &str) -> Option<DocumentRecord> {
        self.records.read().get(uuid).cloned()
    }

    /// Returns a copy of all records in uuid order.
    pub fn records(&self) -> Vec<DocumentRecord> {
        self.records.read().values().cloned().collect()
    }

    /// Number of stored records, including the checkpoint.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Fault injection handle.
    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn get(&self, uuid: &str) -> StoreResult<Option<DocumentRecord>> {
        self.faults.check(StoreOp::Get, Some(uuid))?;
        Ok(self.record(uuid))
    }

    async fn save(&self, record: DocumentRecord) -> StoreResult<DocumentRecord> {
        self.faults.check(StoreOp::Save, Some(&record.uuid))?;
        self.insert(record.clone());
        Ok(record)
    }

    async fn delete(&self, uuid: &str) -> StoreResult<()> {
        self.faults.check(StoreOp::Delete, Some(uuid))?;
        self.records.write().remove(uuid);
        Ok(())
    }

    async fn get_all(&self) -> StoreResult<Vec<DocumentRecord>> {
        self.faults.check(StoreOp::GetAll, None)?;
        Ok(self.records())
    }
}

/// A remote document version; `payload` is `None` for a deletion tombstone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Current revision.
    pub revision: Revision,
    /// Feed sequence of the last change.
    pub seq: u64,
    /// Live content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

/// Serialisable state of a `MemoryRemoteStore`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    /// Last assigned feed sequence.
    pub seq: u64,
    /// Documents and tombstones by uuid.
    pub documents: BTreeMap<String, StoredDocument>,
}

/// An in-memory remote store with a changes feed.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    state: RwLock<RemoteSnapshot>,
    faults: FaultInjector,
}

impl MemoryRemoteStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a store from a snapshot.
    pub fn from_snapshot(snapshot: RemoteSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
            faults: FaultInjector::default(),
        }
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> RemoteSnapshot {
        self.state.read().clone()
    }

    /// Writes a document as another client would, ignoring revisions.
    pub fn put(&self, uuid: &str, payload: Payload) -> Revision {
        let mut state = self.state.write();
        Self::write(&mut state, uuid, Some(payload))
    }

    /// Deletes a document as another client would. Returns the tombstone revision.
    pub fn remove(&self, uuid: &str) -> Option<Revision> {
        let mut state = self.state.write();
        let live = state
            .documents
            .get(uuid)
            .is_some_and(|doc| doc.payload.is_some());
        live.then(|| Self::write(&mut state, uuid, None))
    }

    /// Stores a document at an exact revision.
    pub fn insert_raw(&self, uuid: &str, revision: impl Into<Revision>, payload: Payload) {
        let mut state = self.state.write();
        state.seq += 1;
        let seq = state.seq;
        state.documents.insert(
            uuid.to_string(),
            StoredDocument {
                revision: revision.into(),
                seq,
                payload: Some(payload),
            },
        );
    }

    /// Returns a live document.
    pub fn document(&self, uuid: &str) -> Option<RemoteDocument> {
        let state = self.state.read();
        let stored = state.documents.get(uuid)?;
        stored.payload.as_ref().map(|payload| RemoteDocument {
            uuid: uuid.to_string(),
            revision: Some(stored.revision.clone()),
            payload: payload.clone(),
        })
    }

    /// Returns the current revision, including tombstones.
    pub fn revision_of(&self, uuid: &str) -> Option<Revision> {
        self.state
            .read()
            .documents
            .get(uuid)
            .map(|doc| doc.revision.clone())
    }

    /// Returns true if the document exists as a tombstone.
    pub fn is_deleted(&self, uuid: &str) -> bool {
        self.state
            .read()
            .documents
            .get(uuid)
            .is_some_and(|doc| doc.payload.is_none())
    }

    /// Number of live documents.
    pub fn live_count(&self) -> usize {
        self.state
            .read()
            .documents
            .values()
            .filter(|doc| doc.payload.is_some())
            .count()
    }

    /// Current end of the changes feed.
    pub fn update_seq(&self) -> ChangeToken {
        ChangeToken::new(self.state.read().seq.to_string())
    }

    /// Fault injection handle.
    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    fn write(state: &mut RemoteSnapshot, uuid: &str, payload: Option<Payload>) -> Revision {
        let previous = state.documents.get(uuid).map(|doc| &doc.revision);
        let revision = next_revision(previous, payload.as_ref());
        state.seq += 1;
        let seq = state.seq;
        state.documents.insert(
            uuid.to_string(),
            StoredDocument {
                revision: revision.clone(),
                seq,
                payload,
            },
        );
        revision
    }
}

/// Derives the next `"<generation>-<digest>"` revision.
fn next_revision(previous: Option<&Revision>, payload: Option<&Payload>) -> Revision {
    let generation = previous
        .and_then(|rev| rev.as_str().split_once('-'))
        .and_then(|(gen, _)| gen.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;

    let mut hasher = Sha256::new();
    if let Some(rev) = previous {
        hasher.update(rev.as_str().as_bytes());
    }
    match payload {
        Some(payload) => hasher.update(serde_json::Value::Object(payload.clone()).to_string()),
        None => hasher.update(b"_deleted"),
    }
    let digest: String = hasher.finalize()[..8]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();

    Revision::new(format!("{generation}-{digest}"))
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get(&self, uuid: &str) -> StoreResult<Option<RemoteDocument>> {
        self.faults.check(StoreOp::Get, Some(uuid))?;
        Ok(self.document(uuid))
    }

    async fn save(&self, document: RemoteDocument) -> StoreResult<Revision> {
        self.faults.check(StoreOp::Save, Some(&document.uuid))?;
        let mut state = self.state.write();

        let accepted = match state.documents.get(&document.uuid) {
            Some(stored) if stored.payload.is_some() => {
                document.revision.as_ref() == Some(&stored.revision)
            }
            Some(tombstone) => document
                .revision
                .as_ref()
                .map_or(true, |rev| rev == &tombstone.revision),
            None => document.revision.is_none(),
        };
        if !accepted {
            return Err(StoreError::Conflict {
                uuid: document.uuid,
            });
        }

        Ok(Self::write(
            &mut state,
            &document.uuid,
            Some(document.payload),
        ))
    }

    async fn delete(&self, uuid: &str, revision: &Revision) -> StoreResult<()> {
        self.faults.check(StoreOp::Delete, Some(uuid))?;
        let mut state = self.state.write();

        match state.documents.get(uuid) {
            Some(stored) if stored.payload.is_some() => {
                if &stored.revision != revision {
                    return Err(StoreError::Conflict {
                        uuid: uuid.to_string(),
                    });
                }
            }
            _ => {
                return Err(StoreError::NotFound {
                    uuid: uuid.to_string(),
                })
            }
        }

        Self::write(&mut state, uuid, None);
        Ok(())
    }

    async fn get_changes(&self, since: Option<&ChangeToken>) -> StoreResult<ChangesResponse> {
        self.faults.check(StoreOp::GetChanges, None)?;
        let since = match since {
            Some(token) => token.as_str().parse::<u64>().map_err(|_| {
                StoreError::Backend(format!("invalid change token {:?}", token.as_str()))
            })?,
            None => 0,
        };

        let state = self.state.read();
        let mut changed: Vec<(&String, &StoredDocument)> = state
            .documents
            .iter()
            .filter(|(_, doc)| doc.seq > since)
            .collect();
        changed.sort_by_key(|(_, doc)| doc.seq);

        let results = changed
            .into_iter()
            .map(|(uuid, doc)| ChangeEntry {
                uuid: uuid.clone(),
                revision: doc.revision.clone(),
                deleted: doc.payload.is_none(),
            })
            .collect();

        Ok(ChangesResponse {
            results,
            end_token: ChangeToken::new(state.seq.to_string()),
        })
    }
}
