//! Configuration for the replication engine.

use crate::error::{SyncError, SyncResult};
use std::time::Duration;

/// Configuration for a replication engine instance.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Label used in log output.
    pub name: String,
    /// Delay between the end of one cycle and the start of the next.
    pub interval: Duration,
    /// Delay before the first cycle after `start()`.
    pub initial_delay: Duration,
}

impl SyncConfig {
    /// Creates a configuration with default timings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interval: Duration::from_secs(10),
            initial_delay: Duration::ZERO,
        }
    }

    /// Sets the inter-cycle interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the delay before the first cycle.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Checks that the configuration can drive a replication loop.
    pub fn validate(&self) -> SyncResult<()> {
        if self.name.trim().is_empty() {
            return Err(SyncError::config("engine name must not be empty"));
        }
        if self.interval.is_zero() {
            return Err(SyncError::config("replication interval must be non-zero"));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("docsync")
    }
}
