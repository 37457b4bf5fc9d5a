//! On-disk state for the command-line driver.
//!
//! ```text
//! <local>          # JSON array of DocumentRecord, including `root`
//! <local>.lock     # Advisory lock for single-writer
//! <remote>         # JSON RemoteSnapshot (documents, tombstones, feed sequence)
//! <remote>.lock
//! ```
//!
//! Both locks are held for the lifetime of a [`Workspace`]. Files are written
//! with write-then-rename so an interrupted save leaves the previous state.

use crate::error::{CliError, CliResult};
use docsync_engine::{MemoryLocalStore, MemoryRemoteStore, RemoteSnapshot, SyncConfig, SyncEngine};
use docsync_protocol::DocumentRecord;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Engine type driven by the CLI.
pub type FileEngine = SyncEngine<MemoryLocalStore, MemoryRemoteStore>;

/// Loaded local and remote state, locked for exclusive access.
#[derive(Debug)]
pub struct Workspace {
    local_path: PathBuf,
    remote_path: PathBuf,
    local: Arc<MemoryLocalStore>,
    remote: Arc<MemoryRemoteStore>,
    _locks: [File; 2],
}

impl Workspace {
    /// Locks both state files and loads them. Missing files start empty.
    pub fn open(local_path: &Path, remote_path: &Path) -> CliResult<Self> {
        let local_lock = lock(local_path)?;
        let remote_lock = lock(remote_path)?;

        let records: Vec<DocumentRecord> = read_json(local_path)?.unwrap_or_default();
        let snapshot: RemoteSnapshot = read_json(remote_path)?.unwrap_or_default();
        debug!(
            local = records.len(),
            remote = snapshot.documents.len(),
            "state loaded"
        );

        Ok(Self {
            local_path: local_path.to_path_buf(),
            remote_path: remote_path.to_path_buf(),
            local: Arc::new(MemoryLocalStore::from_records(records)),
            remote: Arc::new(MemoryRemoteStore::from_snapshot(snapshot)),
            _locks: [local_lock, remote_lock],
        })
    }

    /// Local store handle.
    pub fn local(&self) -> &Arc<MemoryLocalStore> {
        &self.local
    }

    /// Remote store handle.
    pub fn remote(&self) -> &Arc<MemoryRemoteStore> {
        &self.remote
    }

    /// Builds an engine over the loaded stores.
    pub fn engine(&self, config: SyncConfig) -> FileEngine {
        SyncEngine::new(config, Arc::clone(&self.local), Arc::clone(&self.remote))
    }

    /// Writes both stores back to disk.
    pub fn save(&self) -> CliResult<()> {
        write_json(&self.local_path, &self.local.records())?;
        write_json(&self.remote_path, &self.remote.snapshot())?;
        debug!("state saved");
        Ok(())
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn lock(path: &Path) -> CliResult<File> {
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path(path))?;

    if lock_file.try_lock_exclusive().is_err() {
        return Err(CliError::Locked(path.to_path_buf()));
    }
    Ok(lock_file)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> CliResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&contents)?))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> CliResult<()> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    fs::write(&temp, serde_json::to_vec_pretty(value)?)?;
    File::open(&temp)?.sync_all()?;
    fs::rename(&temp, path)?;
    Ok(())
}
