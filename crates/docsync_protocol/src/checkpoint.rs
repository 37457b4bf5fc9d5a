//! Replication checkpoint and per-cycle statistics.

use crate::changes::ChangeToken;
use crate::error::RecordResult;
use crate::record::Payload;
use serde::{Deserialize, Serialize};

/// Statistics for one replication cycle.
///
/// Observational only: nothing here feeds back into classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CycleStats {
    /// Wall-clock start of the cycle, milliseconds since the Unix epoch.
    pub started_at_ms: u64,
    /// Cycle duration in milliseconds.
    pub duration_ms: u64,
    /// Replication point the cycle read changes from.
    pub since: Option<ChangeToken>,
    /// End token returned by the changes feed.
    pub end_token: Option<ChangeToken>,
    /// Whether the checkpoint moved to `end_token`.
    pub checkpoint_advanced: bool,
    /// Documents reported by the changes feed.
    pub remote_changes: u64,
    /// Local documents classified for push.
    pub local_updates_found: u64,
    /// Local documents pushed successfully.
    pub local_updates_pushed: u64,
    /// Documents classified for pull (including conflicts and remote creates).
    pub remote_updates_found: u64,
    /// Documents pulled successfully.
    pub remote_updates_pulled: u64,
    /// Local deletions propagated to the remote store.
    pub local_deletes: u64,
    /// Local records removed because the remote copy was deleted.
    pub remote_deletes: u64,
    /// Conflicts detected.
    pub conflicts_found: u64,
    /// Per-document actions that failed and will be retried.
    pub failures: u64,
    /// Per-document actions the remote refused as stale. Replaying the feed
    /// cannot change their outcome, so they do not hold the checkpoint.
    pub rejected: u64,
}

impl CycleStats {
    /// Starts statistics for a cycle reading from `since`.
    pub fn begin(started_at_ms: u64, since: Option<ChangeToken>) -> Self {
        Self {
            started_at_ms,
            since,
            ..Self::default()
        }
    }

    /// Returns true if no per-document action needs the feed replayed.
    pub fn is_clean(&self) -> bool {
        self.failures == 0
    }
}

/// Singleton checkpoint stored under the reserved `root` id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointDocument {
    /// Remote change token as of the last fully completed cycle.
    #[serde(default)]
    pub last_replication_point: Option<ChangeToken>,
    /// Append-only per-cycle statistics.
    #[serde(default)]
    pub history: Vec<CycleStats>,
}

impl CheckpointDocument {
    /// Decodes a checkpoint from a document payload.
    pub fn from_payload(payload: &Payload) -> RecordResult<Self> {
        Ok(serde_json::from_value(serde_json::Value::Object(
            payload.clone(),
        ))?)
    }

    /// Encodes the checkpoint as a document payload.
    pub fn to_payload(&self) -> RecordResult<Payload> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            _ => Ok(Payload::new()),
        }
    }

    /// Moves the replication point and appends the cycle's statistics.
    pub fn advance(&mut self, token: ChangeToken, stats: CycleStats) {
        self.last_replication_point = Some(token);
        self.history.push(stats);
    }

    /// Appends statistics without moving the replication point.
    pub fn record(&mut self, stats: CycleStats) {
        self.history.push(stats);
    }

    /// Forgets the replication point; the next cycle re-scans the whole feed.
    pub fn reset(&mut self) {
        self.last_replication_point = None;
    }

    /// Returns the most recent history entry.
    pub fn last_entry(&self) -> Option<&CycleStats> {
        self.history.last()
    }
}
