//! Replication engine.
//!
//! One engine owns one local/remote store pair and runs at most one cycle at
//! a time. A cycle is:
//!
//! ```text
//! load checkpoint -> fetch changes since it -> classify + apply each local
//! record -> create remote-only records -> save checkpoint (+ history entry)
//! ```
//!
//! Documents are processed one at a time in uuid order, each store call
//! awaited before the next is issued. The loop schedules the next cycle only
//! after the current one has settled.

use crate::apply::{tally_classified, DocumentApplier};
use crate::checkpoint::CheckpointStore;
use crate::config::SyncConfig;
use crate::error::{StoreError, SyncError, SyncResult};
use crate::scheduler::{IntervalScheduler, Scheduler};
use crate::store::{LocalStore, RemoteStore};
use docsync_protocol::{
    classify, classify_remote_only, Action, CheckpointDocument, ConflictResolution, CycleStats,
    DocumentRecord, RemoteChange, RemoteChangeSet,
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Not started, or waiting between cycles.
    Idle,
    /// A cycle is in flight.
    Replicating,
    /// The loop has exited, after `stop()` or a cycle-level failure.
    Paused,
    /// `stop()` was requested while a cycle is in flight.
    Terminating,
}

impl EngineState {
    /// Returns true while a cycle is running.
    pub fn is_active(&self) -> bool {
        matches!(self, EngineState::Replicating | EngineState::Terminating)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Idle => "idle",
            EngineState::Replicating => "replicating",
            EngineState::Paused => "paused",
            EngineState::Terminating => "terminating",
        };
        f.write_str(name)
    }
}

/// Snapshot of the engine's observable state.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    /// Lifecycle state.
    pub state: EngineState,
    /// Statistics of the most recent completed cycle.
    pub last_history_entry: Option<CycleStats>,
    /// Cycles completed since construction.
    pub cycles_completed: u64,
    /// Error that ended the most recent failed cycle.
    pub last_error: Option<String>,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self {
            state: EngineState::Idle,
            last_history_entry: None,
            cycles_completed: 0,
            last_error: None,
        }
    }
}

/// Builds a [`SyncEngine`]. Stores are validated by `start()`, not here.
pub struct SyncEngineBuilder<L: LocalStore, R: RemoteStore> {
    config: SyncConfig,
    local: Option<Arc<L>>,
    remote: Option<Arc<R>>,
    scheduler: Arc<dyn Scheduler>,
}

impl<L: LocalStore, R: RemoteStore> SyncEngineBuilder<L, R> {
    /// Sets the local store.
    pub fn local_store(mut self, store: Arc<L>) -> Self {
        self.local = Some(store);
        self
    }

    /// Sets the remote store.
    pub fn remote_store(mut self, store: Arc<R>) -> Self {
        self.remote = Some(store);
        self
    }

    /// Replaces the wall-clock scheduler.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Builds the engine.
    pub fn build(self) -> SyncEngine<L, R> {
        let (status_tx, _) = watch::channel(EngineStatus::default());
        let (stop_tx, _) = watch::channel(false);

        SyncEngine {
            inner: Arc::new(EngineInner {
                config: self.config,
                local: self.local,
                remote: self.remote,
                scheduler: self.scheduler,
                running: AtomicBool::new(false),
                stop_tx,
                status_tx,
                cycle_lock: tokio::sync::Mutex::new(()),
            }),
            task: Mutex::new(None),
        }
    }
}

/// Replicates documents between a local and a remote store.
///
/// The engine owns its stores for its lifetime. Nothing else may mutate
/// documents through them while a cycle runs; this is not enforced.
pub struct SyncEngine<L: LocalStore, R: RemoteStore> {
    inner: Arc<EngineInner<L, R>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<L: LocalStore, R: RemoteStore> SyncEngine<L, R> {
    /// Starts building an engine.
    pub fn builder(config: SyncConfig) -> SyncEngineBuilder<L, R> {
        SyncEngineBuilder {
            config,
            local: None,
            remote: None,
            scheduler: Arc::new(IntervalScheduler),
        }
    }

    /// Creates an engine over a store pair with the wall-clock scheduler.
    pub fn new(config: SyncConfig, local: Arc<L>, remote: Arc<R>) -> Self {
        Self::builder(config)
            .local_store(local)
            .remote_store(remote)
            .build()
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Gets the local store, if configured.
    pub fn local_store(&self) -> Option<&Arc<L>> {
        self.inner.local.as_ref()
    }

    /// Gets the remote store, if configured.
    pub fn remote_store(&self) -> Option<&Arc<R>> {
        self.inner.remote.as_ref()
    }

    /// Gets the current status.
    pub fn status(&self) -> EngineStatus {
        self.inner.status_tx.borrow().clone()
    }

    /// Gets the current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.inner.status_tx.borrow().state
    }

    /// Watches status changes.
    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Returns true while the replication loop is scheduled to continue.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Validates the configuration, initialises both stores and spawns the
    /// replication loop. Returns once the loop is scheduled.
    pub async fn start(&self) -> SyncResult<()> {
        let (local, remote) = self.inner.stores()?;
        self.inner.config.validate()?;

        let loop_alive = self
            .task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        if loop_alive
            || self
                .inner
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        {
            return Err(SyncError::InvalidState {
                from: self.state().to_string(),
                to: "start".into(),
            });
        }

        let checkpoint = match self.initialize(local, remote).await {
            Ok(checkpoint) => checkpoint,
            Err(err) => {
                self.inner.running.store(false, Ordering::SeqCst);
                return Err(err);
            }
        };

        self.inner.stop_tx.send_replace(false);
        self.inner.status_tx.send_modify(|status| {
            status.state = EngineState::Idle;
            status.last_error = None;
            if status.last_history_entry.is_none() {
                status.last_history_entry = checkpoint.last_entry().cloned();
            }
        });

        let inner = Arc::clone(&self.inner);
        *self.task.lock() = Some(tokio::spawn(inner.run_loop()));
        info!(
            engine = %self.inner.config.name,
            interval_ms = self.inner.config.interval.as_millis() as u64,
            "replication started"
        );
        Ok(())
    }

    /// Stops scheduling new cycles. An in-flight cycle is allowed to finish.
    pub fn stop(&self) {
        let was_running = self.inner.running.swap(false, Ordering::SeqCst);
        self.inner.stop_tx.send_replace(true);
        if was_running {
            info!(engine = %self.inner.config.name, "replication stop requested");
            self.inner.status_tx.send_modify(|status| {
                status.state = match status.state {
                    EngineState::Replicating | EngineState::Terminating => {
                        EngineState::Terminating
                    }
                    _ => EngineState::Paused,
                };
            });
        }
    }

    /// Waits for the replication loop to exit.
    pub async fn join(&self) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(engine = %self.inner.config.name, error = %err, "replication loop panicked");
            }
        }
    }

    /// Runs one replication cycle now, serialised with the loop's cycles.
    pub async fn run_cycle(&self) -> SyncResult<CycleStats> {
        self.inner.cycle(false).await
    }

    /// Loads the checkpoint document.
    pub async fn checkpoint(&self) -> SyncResult<CheckpointDocument> {
        CheckpointStore::new(Arc::clone(self.inner.local()?))
            .load()
            .await
    }

    /// Forgets the replication point so the next cycle re-scans the feed.
    pub async fn reset_checkpoint(&self) -> SyncResult<()> {
        let local = self.inner.local()?;
        let _cycle = self.inner.cycle_lock.lock().await;
        CheckpointStore::new(Arc::clone(local)).reset().await?;
        info!(engine = %self.inner.config.name, "replication checkpoint reset");
        Ok(())
    }

    /// Lists local records holding an unresolved conflict.
    pub async fn conflicts(&self) -> SyncResult<Vec<DocumentRecord>> {
        let mut records = self.inner.local()?.get_all().await?;
        records.retain(|record| record.has_conflict());
        records.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        Ok(records)
    }

    /// Settles a conflicted record.
    pub async fn resolve_conflict(
        &self,
        uuid: &str,
        resolution: ConflictResolution,
    ) -> SyncResult<DocumentRecord> {
        let local = self.inner.local()?;
        let _cycle = self.inner.cycle_lock.lock().await;

        let mut record = local
            .get(uuid)
            .await?
            .ok_or_else(|| SyncError::DocumentNotFound {
                uuid: uuid.to_string(),
            })?;
        record.resolve_conflict(resolution)?;
        let record = local.save(record).await?;
        info!(uuid, resolution = ?resolution, "conflict resolved");
        Ok(record)
    }

    async fn initialize(&self, local: &Arc<L>, remote: &Arc<R>) -> SyncResult<CheckpointDocument> {
        local.initialize().await?;
        remote.initialize().await?;
        CheckpointStore::new(Arc::clone(local)).load().await
    }
}

impl<L: LocalStore, R: RemoteStore> Drop for SyncEngine<L, R> {
    fn drop(&mut self) {
        self.stop();
    }
}

struct EngineInner<L: LocalStore, R: RemoteStore> {
    config: SyncConfig,
    local: Option<Arc<L>>,
    remote: Option<Arc<R>>,
    scheduler: Arc<dyn Scheduler>,
    /// Continuation flag, checked before every scheduled cycle.
    running: AtomicBool,
    stop_tx: watch::Sender<bool>,
    status_tx: watch::Sender<EngineStatus>,
    cycle_lock: tokio::sync::Mutex<()>,
}

impl<L: LocalStore, R: RemoteStore> EngineInner<L, R> {
    fn local(&self) -> SyncResult<&Arc<L>> {
        self.local
            .as_ref()
            .ok_or_else(|| SyncError::config("local store not configured"))
    }

    fn stores(&self) -> SyncResult<(&Arc<L>, &Arc<R>)> {
        let local = self.local()?;
        let remote = self
            .remote
            .as_ref()
            .ok_or_else(|| SyncError::config("remote store not configured"))?;
        Ok((local, remote))
    }

    async fn run_loop(self: Arc<Self>) {
        info!(engine = %self.config.name, "replication loop started");
        let mut delay = self.config.initial_delay;

        loop {
            if !delay.is_zero() && !self.pause(delay).await {
                break;
            }
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            if let Err(err) = self.cycle(true).await {
                error!(
                    engine = %self.config.name,
                    error = %err,
                    "replication cycle failed, halting loop"
                );
                self.running.store(false, Ordering::SeqCst);
                break;
            }
            delay = self.config.interval;
        }

        self.status_tx
            .send_modify(|status| status.state = EngineState::Paused);
        info!(engine = %self.config.name, "replication loop stopped");
    }

    /// Sleeps between cycles. Returns false if woken by `stop()`.
    async fn pause(&self, delay: Duration) -> bool {
        let mut stop_rx = self.stop_tx.subscribe();
        if *stop_rx.borrow_and_update() {
            return false;
        }
        tokio::select! {
            _ = self.scheduler.sleep(delay) => true,
            _ = stop_rx.changed() => false,
        }
    }

    async fn cycle(&self, from_loop: bool) -> SyncResult<CycleStats> {
        let (local, remote) = self.stores()?;
        let _cycle = self.cycle_lock.lock().await;

        let previous = self.begin_cycle(from_loop);
        let result = self.replicate(local, remote).await;
        self.finish_cycle(from_loop, previous, &result);
        result
    }

    async fn replicate(&self, local: &Arc<L>, remote: &Arc<R>) -> SyncResult<CycleStats> {
        let started = Instant::now();
        let checkpoints = CheckpointStore::new(Arc::clone(local));
        let since = checkpoints.load().await?.last_replication_point;
        let mut stats = CycleStats::begin(unix_millis(), since.clone());

        debug!(engine = %self.config.name, since = ?since, "fetching remote changes");
        let changes = RemoteChangeSet::from_response(remote.get_changes(since.as_ref()).await?);
        stats.end_token = Some(changes.end_token().clone());
        stats.remote_changes = changes.len() as u64;

        let mut records = local.get_all().await?;
        records.sort_by(|a, b| a.uuid.cmp(&b.uuid));

        let applier = DocumentApplier::new(local.as_ref(), remote.as_ref());
        let mut known = BTreeSet::new();

        for record in records {
            known.insert(record.uuid.clone());
            let change = changes.get(&record.uuid);
            let action = classify(&record, change.map(|c| &c.revision));
            self.apply_local(&applier, action, record, change, &mut stats)
                .await;
        }

        for (uuid, change) in changes.remote_only(&known) {
            let action = classify_remote_only(uuid, change);
            if action == Action::None {
                continue;
            }
            tally_classified(action, &mut stats);
            match applier.remote_create(uuid).await {
                Ok(applied) => applied.tally(&mut stats),
                Err(err) => self.document_failed(uuid, action, &err, &mut stats),
            }
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        if stats.is_clean() {
            stats.checkpoint_advanced = true;
            checkpoints
                .save(changes.end_token().clone(), stats.clone())
                .await?;
        } else {
            warn!(
                engine = %self.config.name,
                failures = stats.failures,
                "document actions failed, replication checkpoint held"
            );
            checkpoints.append_history(stats.clone()).await?;
        }

        info!(
            engine = %self.config.name,
            pushed = stats.local_updates_pushed,
            pulled = stats.remote_updates_pulled,
            local_deletes = stats.local_deletes,
            remote_deletes = stats.remote_deletes,
            conflicts = stats.conflicts_found,
            failures = stats.failures,
            rejected = stats.rejected,
            "replication cycle finished"
        );
        Ok(stats)
    }

    async fn apply_local(
        &self,
        applier: &DocumentApplier<'_, L, R>,
        action: Action,
        record: DocumentRecord,
        change: Option<&RemoteChange>,
        stats: &mut CycleStats,
    ) {
        tally_classified(action, stats);
        if action == Action::None {
            return;
        }

        let uuid = record.uuid.clone();
        match applier.apply(action, record, change).await {
            Ok(applied) => {
                debug!(uuid = %uuid, action = %action, "document action applied");
                applied.tally(stats);
            }
            Err(err) => self.document_failed(&uuid, action, &err, stats),
        }
    }

    fn document_failed(
        &self,
        uuid: &str,
        action: Action,
        err: &StoreError,
        stats: &mut CycleStats,
    ) {
        if err.is_conflict() {
            stats.rejected += 1;
            warn!(uuid, action = %action, "remote rejected stale revision");
        } else {
            stats.failures += 1;
            warn!(uuid, action = %action, error = %err, "document action failed, will retry");
        }
    }

    fn begin_cycle(&self, from_loop: bool) -> EngineState {
        let stopping = from_loop && !self.running.load(Ordering::SeqCst);
        let mut previous = EngineState::Idle;
        self.status_tx.send_modify(|status| {
            previous = status.state;
            status.state = if stopping {
                EngineState::Terminating
            } else {
                EngineState::Replicating
            };
        });
        debug!(engine = %self.config.name, "replication cycle started");
        previous
    }

    fn finish_cycle(
        &self,
        from_loop: bool,
        previous: EngineState,
        result: &SyncResult<CycleStats>,
    ) {
        let running = self.running.load(Ordering::SeqCst);
        self.status_tx.send_modify(|status| {
            status.state = if running {
                EngineState::Idle
            } else if from_loop
                || status.state != EngineState::Replicating
                || previous == EngineState::Paused
            {
                EngineState::Paused
            } else {
                EngineState::Idle
            };

            match result {
                Ok(stats) => {
                    status.cycles_completed += 1;
                    status.last_history_entry = Some(stats.clone());
                    status.last_error = None;
                }
                Err(err) => status.last_error = Some(err.to_string()),
            }
        });
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
