//! Checkpoint inspection and reset.

use super::state::Workspace;
use super::OutputFormat;
use crate::error::CliResult;
use docsync_engine::SyncConfig;
use docsync_protocol::{ChangeToken, CycleStats};
use serde::Serialize;

/// Replication state summary.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Remote change token of the last completed cycle.
    pub last_replication_point: Option<ChangeToken>,
    /// Number of recorded cycles.
    pub cycles_recorded: usize,
    /// Statistics of the last recorded cycle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle: Option<CycleStats>,
    /// Local documents, excluding the checkpoint.
    pub local_documents: usize,
    /// Local documents with an unpushed edit.
    pub pending_changes: usize,
    /// Local documents marked for deletion.
    pub pending_deletes: usize,
    /// Local documents with an unresolved conflict.
    pub conflicts: usize,
    /// Live remote documents.
    pub remote_documents: usize,
    /// Current end of the remote changes feed.
    pub remote_update_seq: ChangeToken,
}

/// Runs the status command.
pub async fn run(ws: &Workspace, config: SyncConfig, format: OutputFormat) -> CliResult<()> {
    let checkpoint = ws.engine(config).checkpoint().await?;
    let documents: Vec<_> = ws
        .local()
        .records()
        .into_iter()
        .filter(|record| !record.is_root())
        .collect();

    let report = StatusReport {
        last_replication_point: checkpoint.last_replication_point.clone(),
        cycles_recorded: checkpoint.history.len(),
        last_cycle: checkpoint.last_entry().cloned(),
        local_documents: documents.len(),
        pending_changes: documents.iter().filter(|r| r.local_change).count(),
        pending_deletes: documents.iter().filter(|r| r.local_delete).count(),
        conflicts: documents.iter().filter(|r| r.has_conflict()).count(),
        remote_documents: ws.remote().live_count(),
        remote_update_seq: ws.remote().update_seq(),
    };

    format.emit(&report, print_text)
}

/// Forgets the replication point; the next sync re-scans the whole feed.
pub async fn reset(ws: &Workspace, config: SyncConfig) -> CliResult<()> {
    ws.engine(config).reset_checkpoint().await?;
    ws.save()?;
    println!("✓ Replication checkpoint reset");
    Ok(())
}

fn print_text(report: &StatusReport) {
    let point = report
        .last_replication_point
        .as_ref()
        .map(ChangeToken::to_string)
        .unwrap_or_else(|| "never replicated".into());

    println!("Replication");
    println!("  Checkpoint: {point}");
    println!("  Remote feed: {}", report.remote_update_seq);
    println!("  Cycles recorded: {}", report.cycles_recorded);
    if let Some(last) = &report.last_cycle {
        println!(
            "  Last cycle: {} pushed, {} pulled, {} conflicts, {} failures",
            last.local_updates_pushed,
            last.remote_updates_pulled,
            last.conflicts_found,
            last.failures
        );
    }
    println!();
    println!("Documents");
    println!("  Local: {}", report.local_documents);
    println!("  Remote: {}", report.remote_documents);
    println!("  Pending changes: {}", report.pending_changes);
    println!("  Pending deletes: {}", report.pending_deletes);
    println!("  Conflicts: {}", report.conflicts);
}
