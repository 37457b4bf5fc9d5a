//! Replication command.

use super::state::Workspace;
use super::OutputFormat;
use crate::error::{CliError, CliResult};
use docsync_engine::{EngineState, SyncConfig};
use docsync_protocol::CycleStats;
use tracing::{info, warn};

/// Runs `cycles` replication cycles back to back, saving state after each.
pub async fn run(
    ws: &Workspace,
    config: SyncConfig,
    cycles: u64,
    format: OutputFormat,
) -> CliResult<()> {
    let engine = ws.engine(config);

    for cycle in 1..=cycles.max(1) {
        let result = engine.run_cycle().await;
        ws.save()?;
        let stats = result?;
        print_cycle(cycle, &stats, format)?;
    }
    Ok(())
}

/// Runs the scheduled replication loop until Ctrl-C, a cycle-level failure,
/// or `limit` cycles (0 means unbounded).
pub async fn watch(
    ws: &Workspace,
    config: SyncConfig,
    limit: u64,
    format: OutputFormat,
) -> CliResult<()> {
    let engine = ws.engine(config);
    let mut status = engine.subscribe();
    engine.start().await?;
    info!(interval_ms = engine.config().interval.as_millis() as u64, "watching for changes");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut seen = 0u64;

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                if current.cycles_completed > seen {
                    seen = current.cycles_completed;
                    ws.save()?;
                    if let Some(stats) = &current.last_history_entry {
                        print_cycle(seen, stats, format)?;
                    }
                    if limit > 0 && seen >= limit {
                        break;
                    }
                }
                if current.state == EngineState::Paused && !engine.is_running() {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
        }
    }

    engine.stop();
    engine.join().await;
    ws.save()?;

    match engine.status().last_error {
        Some(err) => {
            warn!(error = %err, "replication loop halted");
            Err(CliError::Halted(err))
        }
        None => Ok(()),
    }
}

fn print_cycle(cycle: u64, stats: &CycleStats, format: OutputFormat) -> CliResult<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string(stats)?);
        return Ok(());
    }

    let checkpoint = match (&stats.end_token, stats.checkpoint_advanced) {
        (Some(token), true) => format!("checkpoint {token}"),
        _ => "checkpoint held".to_string(),
    };
    println!(
        "cycle {cycle}: {} changes, pushed {}/{}, pulled {}/{}, deletes {} local {} remote, \
         {} conflicts, {} failures, {checkpoint} ({} ms)",
        stats.remote_changes,
        stats.local_updates_pushed,
        stats.local_updates_found,
        stats.remote_updates_pulled,
        stats.remote_updates_found,
        stats.local_deletes,
        stats.remote_deletes,
        stats.conflicts_found,
        stats.failures,
        stats.duration_ms,
    );
    Ok(())
}
