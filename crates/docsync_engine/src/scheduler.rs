//! Inter-cycle scheduling.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Suspends the replication loop between cycles.
#[async_trait]
pub trait Scheduler: Send + Sync + 'static {
    /// Waits for `delay` to elapse.
    async fn sleep(&self, delay: Duration);
}

/// Wall-clock scheduler backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntervalScheduler;

#[async_trait]
impl Scheduler for IntervalScheduler {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Scheduler that only wakes when told to.
///
/// Each [`advance`](Self::advance) releases exactly one sleep, pending or
/// future, regardless of the requested delay.
#[derive(Debug)]
pub struct ManualScheduler {
    permits: Semaphore,
    sleeping: AtomicUsize,
}

impl ManualScheduler {
    /// Creates a scheduler with no pending wake-ups.
    pub fn new() -> Self {
        Self {
            permits: Semaphore::new(0),
            sleeping: AtomicUsize::new(0),
        }
    }

    /// Releases one sleep.
    pub fn advance(&self) {
        self.permits.add_permits(1);
    }

    /// Number of sleeps currently waiting.
    pub fn pending(&self) -> usize {
        self.sleeping.load(Ordering::SeqCst)
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scheduler for ManualScheduler {
    async fn sleep(&self, _delay: Duration) {
        let _sleeping = SleepGuard::enter(&self.sleeping);
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }
}

/// Keeps the sleeper count right when a sleep is cancelled.
struct SleepGuard<'a>(&'a AtomicUsize);

impl<'a> SleepGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for SleepGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
