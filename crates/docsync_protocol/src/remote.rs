//! Remote-bound document shape.

use crate::record::{Payload, Revision};
use serde::{Deserialize, Serialize};

/// A document as exchanged with the remote store.
///
/// Serialises in the CouchDB shape: `_id`, `_rev` (omitted for brand-new
/// documents) and the payload keys flattened alongside them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    /// Document id.
    #[serde(rename = "_id")]
    pub uuid: String,
    /// Revision the write is based on, or the stored revision on reads.
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revision>,
    /// Document content.
    #[serde(flatten)]
    pub payload: Payload,
}

impl RemoteDocument {
    /// Creates a remote document.
    pub fn new(uuid: impl Into<String>, revision: Option<Revision>, payload: Payload) -> Self {
        Self {
            uuid: uuid.into(),
            revision,
            payload,
        }
    }
}
