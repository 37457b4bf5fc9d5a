//! Remote changes feed.

use crate::record::{Revision, ROOT_DOCUMENT_ID};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Opaque position in the remote change stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeToken(String);

impl ChangeToken {
    /// Creates a token from the remote store's representation.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChangeToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

/// One row of the changes feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    /// Changed document id.
    pub uuid: String,
    /// Revision after the change.
    pub revision: Revision,
    /// The change removed the document.
    #[serde(default)]
    pub deleted: bool,
}

impl ChangeEntry {
    /// Creates a live-document change.
    pub fn updated(uuid: impl Into<String>, revision: impl Into<Revision>) -> Self {
        Self {
            uuid: uuid.into(),
            revision: revision.into(),
            deleted: false,
        }
    }

    /// Creates a deletion change.
    pub fn deleted(uuid: impl Into<String>, revision: impl Into<Revision>) -> Self {
        Self {
            uuid: uuid.into(),
            revision: revision.into(),
            deleted: true,
        }
    }
}

/// Response to a changes-feed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesResponse {
    /// Changes in feed order.
    pub results: Vec<ChangeEntry>,
    /// Position after which nothing further has been observed.
    pub end_token: ChangeToken,
}

/// Latest remote state of one document within a change set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteChange {
    /// Remote revision.
    pub revision: Revision,
    /// The remote copy is deleted.
    pub deleted: bool,
}

/// Per-cycle snapshot of remote changes, keyed by uuid.
///
/// Rebuilt every cycle from a single changes-feed fetch; never persisted.
#[derive(Debug, Clone)]
pub struct RemoteChangeSet {
    changes: BTreeMap<String, RemoteChange>,
    end_token: ChangeToken,
}

impl RemoteChangeSet {
    /// Builds the change set from a feed response.
    ///
    /// Later entries for the same uuid replace earlier ones.
    pub fn from_response(response: ChangesResponse) -> Self {
        let mut changes = BTreeMap::new();
        for entry in response.results {
            changes.insert(
                entry.uuid,
                RemoteChange {
                    revision: entry.revision,
                    deleted: entry.deleted,
                },
            );
        }
        Self {
            changes,
            end_token: response.end_token,
        }
    }

    /// Returns the remote change for a uuid, if any.
    pub fn get(&self, uuid: &str) -> Option<&RemoteChange> {
        self.changes.get(uuid)
    }

    /// Returns the remote revision for a uuid, if any.
    pub fn revision_of(&self, uuid: &str) -> Option<&Revision> {
        self.changes.get(uuid).map(|change| &change.revision)
    }

    /// Returns the feed position this set was read up to.
    pub fn end_token(&self) -> &ChangeToken {
        &self.end_token
    }

    /// Number of changed documents, excluding the reserved checkpoint id.
    pub fn len(&self) -> usize {
        self.changes
            .keys()
            .filter(|uuid| uuid.as_str() != ROOT_DOCUMENT_ID)
            .count()
    }

    /// Returns true if no documents changed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over changes whose uuid is not in `known`, in uuid order.
    pub fn remote_only<'a>(
        &'a self,
        known: &'a BTreeSet<String>,
    ) -> impl Iterator<Item = (&'a str, &'a RemoteChange)> + 'a {
        self.changes
            .iter()
            .filter(move |(uuid, _)| !known.contains(uuid.as_str()))
            .map(|(uuid, change)| (uuid.as_str(), change))
    }
}
