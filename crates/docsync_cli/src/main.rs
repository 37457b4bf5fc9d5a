//! docsync CLI
//!
//! Command-line driver for docsync replication over JSON state files.
//!
//! # Commands
//!
//! - `put` / `delete` - Edit a local document, or a remote one with `--upstream`
//! - `list` - List local or remote documents
//! - `sync` - Run replication cycles
//! - `status` - Display checkpoint and document counts
//! - `reset-checkpoint` - Force a full re-scan of the remote feed
//! - `conflicts` / `resolve` - Inspect and settle conflicts

mod commands;
mod error;

use clap::{Parser, Subcommand};
use commands::conflicts::Keep;
use commands::state::Workspace;
use commands::OutputFormat;
use docsync_engine::SyncConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// docsync replication tools.
#[derive(Parser)]
#[command(name = "docsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Local state file
    #[arg(global = true, long, default_value = "docsync-local.json")]
    local: PathBuf,

    /// Remote state file
    #[arg(global = true, long, default_value = "docsync-remote.json")]
    remote: PathBuf,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or edit a document
    Put {
        /// Document uuid
        uuid: String,

        /// Document content as a JSON object
        json: String,

        /// Write to the remote store as another client
        #[arg(short, long)]
        upstream: bool,
    },

    /// Mark a document for deletion
    Delete {
        /// Document uuid
        uuid: String,

        /// Delete from the remote store as another client
        #[arg(short, long)]
        upstream: bool,
    },

    /// List documents
    List {
        /// List the remote store instead
        #[arg(short, long)]
        upstream: bool,
    },

    /// Run replication cycles
    Sync {
        /// Number of cycles (0 with --watch runs until interrupted)
        #[arg(short, long, default_value = "1")]
        cycles: u64,

        /// Run the scheduled loop instead of back-to-back cycles
        #[arg(short, long)]
        watch: bool,

        /// Delay between scheduled cycles
        #[arg(short, long, default_value = "10000")]
        interval_ms: u64,
    },

    /// Display replication status
    Status,

    /// Clear the replication checkpoint
    ResetCheckpoint,

    /// List unresolved conflicts
    Conflicts,

    /// Resolve a conflict
    Resolve {
        /// Document uuid
        uuid: String,

        /// Side to keep
        #[arg(short, long, value_enum)]
        keep: Keep,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let ws = Workspace::open(&cli.local, &cli.remote)?;
    let config = SyncConfig::new("docsync");
    let format = cli.format;

    match cli.command {
        Commands::Put {
            uuid,
            json,
            upstream,
        } => commands::documents::put(&ws, &uuid, &json, upstream, format)?,
        Commands::Delete { uuid, upstream } => {
            commands::documents::delete(&ws, &uuid, upstream, format)?
        }
        Commands::List { upstream } => commands::documents::list(&ws, upstream, format)?,
        Commands::Sync {
            cycles,
            watch,
            interval_ms,
        } => {
            let config = config.with_interval(Duration::from_millis(interval_ms));
            if watch {
                commands::sync::watch(&ws, config, cycles, format).await?;
            } else {
                commands::sync::run(&ws, config, cycles, format).await?;
            }
        }
        Commands::Status => commands::status::run(&ws, config, format).await?,
        Commands::ResetCheckpoint => commands::status::reset(&ws, config).await?,
        Commands::Conflicts => commands::conflicts::list(&ws, config, format).await?,
        Commands::Resolve { uuid, keep } => {
            commands::conflicts::resolve(&ws, config, &uuid, keep, format).await?
        }
    }

    Ok(())
}
