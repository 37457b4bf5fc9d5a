//! CLI command implementations.

pub mod conflicts;
pub mod documents;
pub mod state;
pub mod status;
pub mod sync;

use crate::error::CliResult;
use clap::ValueEnum;
use serde::Serialize;

/// Output format shared by all commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// One JSON document per result.
    Json,
}

impl OutputFormat {
    /// Prints `value` as JSON, or runs `text` for the text format.
    pub fn emit<T: Serialize>(self, value: &T, text: impl FnOnce(&T)) -> CliResult<()> {
        match self {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => text(value),
        }
        Ok(())
    }
}
