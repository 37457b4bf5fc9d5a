//! Replication decisions.

use crate::changes::RemoteChange;
use crate::record::{DocumentRecord, Revision, ROOT_DOCUMENT_ID};
use std::fmt;

/// What a cycle does with one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Nothing to do.
    None,
    /// Propagate a local deletion to the remote store.
    LocalDelete,
    /// Preserve the local edit and adopt the divergent remote version.
    Conflict,
    /// Overwrite the local copy with the newer remote version.
    RemotePull,
    /// Send the local edit to the remote store.
    LocalPush,
    /// Create a local copy of a document only the remote store has.
    RemoteCreate,
}

impl Action {
    /// Returns true if the action requires fetching the remote document.
    pub fn pulls(&self) -> bool {
        matches!(
            self,
            Action::Conflict | Action::RemotePull | Action::RemoteCreate
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::None => "none",
            Action::LocalDelete => "local-delete",
            Action::Conflict => "conflict",
            Action::RemotePull => "remote-pull",
            Action::LocalPush => "local-push",
            Action::RemoteCreate => "remote-create",
        };
        f.write_str(name)
    }
}

/// Classifies a local record against the remote revision reported for it.
///
/// Earlier rules win:
/// 1. the checkpoint document is never replicated
/// 2. a pending local delete
/// 3. a pending conflict, or an unsynced edit whose remote copy diverged
/// 4. a diverged remote copy
/// 5. an unsynced edit
pub fn classify(record: &DocumentRecord, remote: Option<&Revision>) -> Action {
    if record.uuid == ROOT_DOCUMENT_ID {
        return Action::None;
    }
    if record.local_delete {
        return Action::LocalDelete;
    }

    let diverged = remote.is_some_and(|rev| record.revision.as_ref() != Some(rev));

    if record.conflict_payload.is_some() || (record.local_change && diverged) {
        Action::Conflict
    } else if diverged {
        Action::RemotePull
    } else if record.local_change {
        Action::LocalPush
    } else {
        Action::None
    }
}

/// Classifies a uuid present in the remote change set but absent locally.
pub fn classify_remote_only(uuid: &str, change: &RemoteChange) -> Action {
    if uuid == ROOT_DOCUMENT_ID || change.deleted {
        Action::None
    } else {
        Action::RemoteCreate
    }
}
