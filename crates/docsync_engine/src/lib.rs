//! # docsync engine
//!
//! Periodic bidirectional replication between a local and a remote
//! document store.
//!
//! This crate provides:
//! - `LocalStore` / `RemoteStore`, the async store contracts
//! - `SyncEngine`, the replication loop and cycle state machine
//! - Checkpoint persistence in the reserved `root` document
//! - Conflict preservation and explicit resolution
//! - In-memory stores with fault injection
//!
//! ## Architecture
//!
//! Each cycle reads the remote changes feed from the last checkpoint, then
//! walks every local record and applies exactly one action per document:
//! push, pull, delete, conflict or nothing. Remote-only documents are
//! created locally afterwards. The checkpoint moves only when every action
//! of the cycle succeeded.
//!
//! ## Key Invariants
//!
//! - An unsynced local edit is never silently overwritten
//! - A document's flags change only after its remote call succeeded
//! - The checkpoint never moves backwards
//! - At most one cycle runs at a time
//! - Reprocessing a batch after a crash is idempotent

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod apply;
mod checkpoint;
mod config;
mod engine;
mod error;
mod memory;
mod scheduler;
mod store;

pub use apply::{tally_classified, Applied, DocumentApplier};
pub use checkpoint::CheckpointStore;
pub use config::SyncConfig;
pub use engine::{EngineState, EngineStatus, SyncEngine, SyncEngineBuilder};
pub use error::{StoreError, StoreResult, SyncError, SyncResult};
pub use memory::{
    FaultInjector, MemoryLocalStore, MemoryRemoteStore, RemoteSnapshot, StoreOp, StoredDocument,
};
pub use scheduler::{IntervalScheduler, ManualScheduler, Scheduler};
pub use store::{LocalStore, RemoteStore};
