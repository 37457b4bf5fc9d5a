//! Conflict listing and resolution.

use super::state::Workspace;
use super::OutputFormat;
use crate::error::CliResult;
use clap::ValueEnum;
use docsync_engine::SyncConfig;
use docsync_protocol::{ConflictResolution, Payload, Revision};
use serde::Serialize;

/// Side kept by `resolve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Keep {
    /// Restore the preserved local edit; the next sync pushes it.
    Local,
    /// Keep the remote version and drop the preserved edit.
    Remote,
}

impl From<Keep> for ConflictResolution {
    fn from(keep: Keep) -> Self {
        match keep {
            Keep::Local => ConflictResolution::KeepLocal,
            Keep::Remote => ConflictResolution::AcceptRemote,
        }
    }
}

/// One unresolved conflict.
#[derive(Debug, Serialize)]
pub struct ConflictRow {
    /// Document uuid.
    pub uuid: String,
    /// Adopted remote revision.
    pub revision: Option<Revision>,
    /// Adopted remote content.
    pub remote: Payload,
    /// Preserved local edit.
    pub local: Payload,
}

/// Lists unresolved conflicts.
pub async fn list(ws: &Workspace, config: SyncConfig, format: OutputFormat) -> CliResult<()> {
    let rows: Vec<ConflictRow> = ws
        .engine(config)
        .conflicts()
        .await?
        .into_iter()
        .map(|record| ConflictRow {
            uuid: record.uuid,
            revision: record.revision,
            remote: record.payload,
            local: record.conflict_payload.unwrap_or_default(),
        })
        .collect();

    format.emit(&rows, |rows| {
        if rows.is_empty() {
            println!("No conflicts");
        }
        for row in rows {
            let revision = row
                .revision
                .as_ref()
                .map(Revision::to_string)
                .unwrap_or_else(|| "deleted".into());
            println!("{} (remote {})", row.uuid, revision);
            println!("  local:  {}", serde_json::Value::Object(row.local.clone()));
            println!("  remote: {}", serde_json::Value::Object(row.remote.clone()));
        }
    })
}

/// Settles one conflict.
pub async fn resolve(
    ws: &Workspace,
    config: SyncConfig,
    uuid: &str,
    keep: Keep,
    format: OutputFormat,
) -> CliResult<()> {
    let record = ws
        .engine(config)
        .resolve_conflict(uuid, keep.into())
        .await?;
    ws.save()?;

    format.emit(&record, |record| {
        let pending = if record.local_change { ", push pending" } else { "" };
        println!("✓ Resolved {} keeping {:?}{}", record.uuid, keep, pending);
    })
}
