//! Integration tests for the replication engine over in-memory stores.

use docsync_engine::{
    CheckpointStore, EngineState, ManualScheduler, MemoryLocalStore, MemoryRemoteStore,
    RemoteStore, StoreError, StoreOp, SyncConfig, SyncEngine, SyncError,
};
use docsync_protocol::{
    classify, Action, ChangeToken, ConflictResolution, CycleStats, DocumentRecord, Payload,
    RecordError, Revision,
};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

type MemoryEngine = SyncEngine<MemoryLocalStore, MemoryRemoteStore>;

fn payload(value: serde_json::Value) -> Payload {
    value.as_object().cloned().unwrap()
}

fn record(
    uuid: &str,
    revision: Option<&str>,
    local_change: bool,
    value: serde_json::Value,
) -> DocumentRecord {
    DocumentRecord {
        revision: revision.map(Revision::from),
        local_change,
        ..DocumentRecord::new(uuid, payload(value))
    }
}

fn engine(local: &Arc<MemoryLocalStore>, remote: &Arc<MemoryRemoteStore>) -> MemoryEngine {
    SyncEngine::new(
        SyncConfig::new("integration"),
        Arc::clone(local),
        Arc::clone(remote),
    )
}

fn stores() -> (Arc<MemoryLocalStore>, Arc<MemoryRemoteStore>) {
    (
        Arc::new(MemoryLocalStore::new()),
        Arc::new(MemoryRemoteStore::new()),
    )
}

/// Points the checkpoint at the current end of the remote feed.
async fn checkpoint_at_head(local: &Arc<MemoryLocalStore>, remote: &MemoryRemoteStore) {
    CheckpointStore::new(Arc::clone(local))
        .save(remote.update_seq(), CycleStats::default())
        .await
        .unwrap();
}

// ============================================================================
// Reference scenarios
// ============================================================================

#[tokio::test]
async fn unsynced_edit_with_unchanged_remote_is_pushed() {
    let (local, remote) = stores();
    remote.insert_raw("d1", "1-a", payload(json!({"title": "draft"})));
    local.insert(record("d1", Some("1-a"), true, json!({"title": "final"})));

    let change = remote.get_changes(None).await.unwrap();
    assert_eq!(
        classify(&local.record("d1").unwrap(), Some(&change.results[0].revision)),
        Action::LocalPush
    );

    let stats = engine(&local, &remote).run_cycle().await.unwrap();
    assert_eq!(stats.local_updates_found, 1);
    assert_eq!(stats.local_updates_pushed, 1);

    let stored = local.record("d1").unwrap();
    assert!(stored.revision.as_ref().unwrap().as_str().starts_with("2-"));
    assert!(!stored.local_change);
    assert_eq!(stored.revision, remote.revision_of("d1"));
    assert_eq!(
        remote.document("d1").unwrap().payload,
        payload(json!({"title": "final"}))
    );
}

#[tokio::test]
async fn unsynced_edit_with_divergent_remote_is_conflict() {
    let (local, remote) = stores();
    remote.insert_raw("d2", "3-z", payload(json!({"title": "theirs"})));
    local.insert(record("d2", Some("1-a"), true, json!({"title": "mine"})));

    let stats = engine(&local, &remote).run_cycle().await.unwrap();
    assert_eq!(stats.conflicts_found, 1);
    assert_eq!(stats.local_updates_pushed, 0);

    let stored = local.record("d2").unwrap();
    assert_eq!(stored.conflict_payload, Some(payload(json!({"title": "mine"}))));
    assert_eq!(stored.revision, Some(Revision::new("3-z")));
    assert_eq!(stored.payload, payload(json!({"title": "theirs"})));
    assert!(!stored.local_change);

    // The remote copy is untouched.
    assert_eq!(remote.revision_of("d2"), Some(Revision::new("3-z")));
}

#[tokio::test]
async fn clean_record_with_divergent_remote_is_pulled() {
    let (local, remote) = stores();
    remote.insert_raw("d3", "2-b", payload(json!({"n": 2})));
    local.insert(record("d3", Some("1-a"), false, json!({"n": 1})));

    let stats = engine(&local, &remote).run_cycle().await.unwrap();
    assert_eq!(stats.remote_updates_found, 1);
    assert_eq!(stats.remote_updates_pulled, 1);

    let stored = local.record("d3").unwrap();
    assert_eq!(stored.revision, Some(Revision::new("2-b")));
    assert_eq!(stored.payload, payload(json!({"n": 2})));
}

#[tokio::test]
async fn remote_only_document_is_created_locally() {
    let (local, remote) = stores();
    remote.insert_raw("d4", "1-c", payload(json!({"body": "hello"})));

    let stats = engine(&local, &remote).run_cycle().await.unwrap();
    assert_eq!(stats.remote_updates_pulled, 1);

    let stored = local.record("d4").unwrap();
    assert_eq!(stored.revision, Some(Revision::new("1-c")));
    assert_eq!(stored.payload, payload(json!({"body": "hello"})));
    assert!(!stored.local_change);
    assert!(!stored.local_delete);
}

#[tokio::test]
async fn pending_delete_reaches_remote_then_local_record_is_removed() {
    let (local, remote) = stores();
    remote.insert_raw("d5", "1-a", payload(json!({})));
    let mut doomed = record("d5", Some("1-a"), false, json!({}));
    doomed.mark_deleted().unwrap();
    local.insert(doomed);

    let stats = engine(&local, &remote).run_cycle().await.unwrap();
    assert_eq!(stats.local_deletes, 1);
    assert!(remote.is_deleted("d5"));
    assert!(local.record("d5").is_none());
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn failed_push_keeps_edit_and_holds_checkpoint() {
    let (local, remote) = stores();
    remote.put("other", payload(json!({})));
    local.insert(record("d1", None, true, json!({"v": 1})));
    remote
        .faults()
        .fail_document(StoreOp::Save, "d1", StoreError::unavailable("connection reset"));

    let engine = engine(&local, &remote);
    let stats = engine.run_cycle().await.unwrap();
    assert_eq!(stats.failures, 1);
    assert!(!stats.checkpoint_advanced);

    let stored = local.record("d1").unwrap();
    assert!(stored.local_change);
    assert!(stored.revision.is_none());
    assert_eq!(stored.payload, payload(json!({"v": 1})));

    // Other documents still made progress.
    assert!(local.record("other").is_some());

    let checkpoint = engine.checkpoint().await.unwrap();
    assert!(checkpoint.last_replication_point.is_none());
    assert_eq!(checkpoint.history.len(), 1);

    remote.faults().clear();
    let stats = engine.run_cycle().await.unwrap();
    assert_eq!(stats.local_updates_pushed, 1);
    assert!(stats.checkpoint_advanced);
    assert!(!local.record("d1").unwrap().local_change);
    assert_eq!(
        engine.checkpoint().await.unwrap().last_replication_point,
        stats.end_token
    );
}

#[tokio::test]
async fn failed_remote_delete_stays_pending() {
    let (local, remote) = stores();
    remote.insert_raw("d5", "1-a", payload(json!({})));
    let mut doomed = record("d5", Some("1-a"), false, json!({}));
    doomed.mark_deleted().unwrap();
    local.insert(doomed.clone());
    remote
        .faults()
        .fail(StoreOp::Delete, StoreError::unavailable("timeout"));

    let engine = engine(&local, &remote);
    let stats = engine.run_cycle().await.unwrap();
    assert_eq!(stats.failures, 1);
    assert_eq!(local.record("d5"), Some(doomed));

    remote.faults().clear();
    engine.run_cycle().await.unwrap();
    assert!(local.record("d5").is_none());
    assert!(remote.is_deleted("d5"));
}

#[tokio::test]
async fn stale_push_behind_checkpoint_settles_as_conflict() {
    let (local, remote) = stores();
    remote.insert_raw("d1", "2-x", payload(json!({"v": "remote"})));
    checkpoint_at_head(&local, &remote).await;
    local.insert(record("d1", Some("1-a"), true, json!({"v": "local"})));

    let engine = engine(&local, &remote);
    let stats = engine.run_cycle().await.unwrap();
    assert_eq!(stats.local_updates_found, 1);
    assert_eq!(stats.local_updates_pushed, 0);
    assert_eq!(stats.conflicts_found, 1);
    assert_eq!(stats.failures, 0);
    assert!(stats.checkpoint_advanced);

    // The push was not retried as an overwrite.
    assert_eq!(remote.revision_of("d1"), Some(Revision::new("2-x")));
    let stored = local.record("d1").unwrap();
    assert_eq!(stored.conflict_payload, Some(payload(json!({"v": "local"}))));
    assert_eq!(stored.payload, payload(json!({"v": "remote"})));
    assert_eq!(stored.revision, Some(Revision::new("2-x")));
    assert!(!stored.local_change);

    let stats = engine.run_cycle().await.unwrap();
    assert_eq!(stats.failures, 0);
    assert!(stats.checkpoint_advanced);
}

#[tokio::test]
async fn stale_local_delete_does_not_pin_checkpoint() {
    let (local, remote) = stores();
    remote.put("d1", payload(json!({"v": 1})));

    let engine = engine(&local, &remote);
    engine.run_cycle().await.unwrap();

    let mut doomed = local.record("d1").unwrap();
    doomed.mark_deleted().unwrap();
    local.insert(doomed);
    remote.put("d1", payload(json!({"v": 2})));

    for cycle in 0..5 {
        remote.put(&format!("new-{cycle}"), payload(json!({"cycle": cycle})));
        let stats = engine.run_cycle().await.unwrap();

        assert_eq!(stats.failures, 0, "cycle {cycle}");
        assert!(stats.checkpoint_advanced, "cycle {cycle}");
        assert_eq!(stats.remote_changes, if cycle == 0 { 2 } else { 1 });
        assert_eq!(
            engine.checkpoint().await.unwrap().last_replication_point,
            stats.end_token
        );
        assert!(local.record(&format!("new-{cycle}")).is_some());
    }

    // The remote edit won; the deleted content waits for resolution.
    let stored = local.record("d1").unwrap();
    assert!(!stored.local_delete);
    assert_eq!(stored.payload, payload(json!({"v": 2})));
    assert_eq!(stored.conflict_payload, Some(payload(json!({"v": 1}))));
    assert_eq!(stored.revision, remote.revision_of("d1"));
    assert!(!remote.is_deleted("d1"));
}

#[tokio::test]
async fn failed_push_recovers_without_reset() {
    let (local, remote) = stores();
    remote.put("seed", payload(json!({})));

    let engine = engine(&local, &remote);
    let first = engine.run_cycle().await.unwrap();
    let held_at = first.end_token.clone();
    assert!(held_at.is_some());

    local.insert(record("d1", None, true, json!({"v": 1})));
    remote
        .faults()
        .fail_document(StoreOp::Save, "d1", StoreError::unavailable("connection reset"));

    for cycle in 0..3 {
        remote.put(&format!("new-{cycle}"), payload(json!({})));
        let stats = engine.run_cycle().await.unwrap();
        assert_eq!(stats.failures, 1);
        assert!(!stats.checkpoint_advanced);
        assert_eq!(stats.since, held_at);
        assert_eq!(
            engine.checkpoint().await.unwrap().last_replication_point,
            held_at
        );
    }

    remote.faults().clear();
    let stats = engine.run_cycle().await.unwrap();
    assert_eq!(stats.local_updates_pushed, 1);
    assert!(stats.checkpoint_advanced);
    assert_eq!(
        engine.checkpoint().await.unwrap().last_replication_point,
        stats.end_token
    );

    assert!(!local.record("d1").unwrap().local_change);
    assert_eq!(
        remote.document("d1").unwrap().payload,
        payload(json!({"v": 1}))
    );
    for cycle in 0..3 {
        assert!(local.record(&format!("new-{cycle}")).is_some());
    }
}

#[tokio::test]
async fn stale_rejection_does_not_hold_checkpoint() {
    let (local, remote) = stores();
    remote.put("d1", payload(json!({"v": 1})));
    remote.faults().fail_document(
        StoreOp::Get,
        "d1",
        StoreError::Conflict { uuid: "d1".into() },
    );

    let stats = engine(&local, &remote).run_cycle().await.unwrap();
    assert_eq!(stats.failures, 0);
    assert_eq!(stats.rejected, 1);
    assert!(stats.checkpoint_advanced);
    assert!(local.record("d1").is_none());
}

#[tokio::test]
async fn changes_feed_failure_aborts_cycle() {
    let (local, remote) = stores();
    local.insert(record("d1", None, true, json!({})));
    remote
        .faults()
        .fail(StoreOp::GetChanges, StoreError::unavailable("unreachable"));

    let engine = engine(&local, &remote);
    let err = engine.run_cycle().await.unwrap_err();
    assert!(matches!(err, SyncError::Store(StoreError::Unavailable(_))));
    assert!(err.is_retryable());

    // Nothing was applied and no history was written.
    assert!(local.record("d1").unwrap().local_change);
    assert!(engine.checkpoint().await.unwrap().history.is_empty());
    assert!(engine.status().last_error.is_some());
}

#[tokio::test]
async fn loop_halts_on_cycle_failure_until_restarted() {
    let (local, remote) = stores();
    let scheduler = Arc::new(ManualScheduler::new());
    let engine: MemoryEngine = SyncEngine::builder(SyncConfig::new("halting"))
        .local_store(Arc::clone(&local))
        .remote_store(Arc::clone(&remote))
        .scheduler(scheduler.clone())
        .build();

    remote
        .faults()
        .fail(StoreOp::GetChanges, StoreError::unavailable("unreachable"));
    engine.start().await.unwrap();
    engine.join().await;

    assert_eq!(engine.state(), EngineState::Paused);
    assert!(!engine.is_running());
    assert_eq!(scheduler.pending(), 0);

    remote.faults().clear();
    remote.put("d1", payload(json!({"v": 1})));
    engine.start().await.unwrap();

    let mut status = engine.subscribe();
    status
        .wait_for(|s| s.cycles_completed >= 1)
        .await
        .unwrap();
    assert!(local.record("d1").is_some());

    engine.stop();
    engine.join().await;
    assert_eq!(engine.state(), EngineState::Paused);
}

// ============================================================================
// Remote deletions
// ============================================================================

#[tokio::test]
async fn remote_deletion_removes_clean_local_record() {
    let (local, remote) = stores();
    remote.put("d1", payload(json!({"v": 1})));

    let engine = engine(&local, &remote);
    engine.run_cycle().await.unwrap();
    assert!(local.record("d1").is_some());

    remote.remove("d1");
    let stats = engine.run_cycle().await.unwrap();
    assert_eq!(stats.remote_deletes, 1);
    assert!(local.record("d1").is_none());
}

#[tokio::test]
async fn remote_deletion_of_edited_record_preserves_edit() {
    let (local, remote) = stores();
    remote.put("d1", payload(json!({"v": 1})));

    let engine = engine(&local, &remote);
    engine.run_cycle().await.unwrap();

    let mut edited = local.record("d1").unwrap();
    edited.edit(payload(json!({"v": 2}))).unwrap();
    local.insert(edited);
    remote.remove("d1");

    let stats = engine.run_cycle().await.unwrap();
    assert_eq!(stats.conflicts_found, 1);

    let stored = local.record("d1").unwrap();
    assert_eq!(stored.conflict_payload, Some(payload(json!({"v": 2}))));
    assert!(stored.revision.is_none());
    assert!(stored.payload.is_empty());
}

#[tokio::test]
async fn remote_only_tombstone_is_ignored() {
    let (local, remote) = stores();
    remote.put("gone", payload(json!({})));
    remote.remove("gone");

    let stats = engine(&local, &remote).run_cycle().await.unwrap();
    assert_eq!(stats.remote_changes, 1);
    assert_eq!(stats.remote_updates_found, 0);
    assert!(local.record("gone").is_none());
}

// ============================================================================
// Conflict resolution
// ============================================================================

async fn conflicted(
    local: &Arc<MemoryLocalStore>,
    remote: &Arc<MemoryRemoteStore>,
) -> MemoryEngine {
    remote.insert_raw("d1", "2-r", payload(json!({"v": "remote"})));
    local.insert(record("d1", Some("1-a"), true, json!({"v": "local"})));
    let engine = engine(local, remote);
    engine.run_cycle().await.unwrap();
    engine
}

#[tokio::test]
async fn conflicted_record_refuses_edits() {
    let (local, remote) = stores();
    let engine = conflicted(&local, &remote).await;

    let mut stored = local.record("d1").unwrap();
    assert!(matches!(
        stored.edit(Payload::new()),
        Err(RecordError::Conflicted { .. })
    ));
    assert!(stored.mark_deleted().is_err());

    let conflicts = engine.conflicts().await.unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].uuid, "d1");
}

#[tokio::test]
async fn keep_local_resolution_pushes_preserved_edit() {
    let (local, remote) = stores();
    let engine = conflicted(&local, &remote).await;

    let resolved = engine
        .resolve_conflict("d1", ConflictResolution::KeepLocal)
        .await
        .unwrap();
    assert!(resolved.local_change);
    assert!(resolved.conflict_payload.is_none());
    assert_eq!(resolved.payload, payload(json!({"v": "local"})));

    let stats = engine.run_cycle().await.unwrap();
    assert_eq!(stats.local_updates_pushed, 1);
    assert_eq!(
        remote.document("d1").unwrap().payload,
        payload(json!({"v": "local"}))
    );
    assert!(engine.conflicts().await.unwrap().is_empty());
}

#[tokio::test]
async fn accept_remote_resolution_discards_edit() {
    let (local, remote) = stores();
    let engine = conflicted(&local, &remote).await;

    engine
        .resolve_conflict("d1", ConflictResolution::AcceptRemote)
        .await
        .unwrap();
    let stats = engine.run_cycle().await.unwrap();
    assert_eq!(stats.local_updates_found, 0);
    assert_eq!(stats.conflicts_found, 0);

    let stored = local.record("d1").unwrap();
    assert_eq!(stored.payload, payload(json!({"v": "remote"})));
    assert_eq!(remote.revision_of("d1"), Some(Revision::new("2-r")));

    let err = engine
        .resolve_conflict("d1", ConflictResolution::KeepLocal)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Record(RecordError::NoConflict { .. })));
}

#[tokio::test]
async fn repeated_divergence_keeps_first_edit() {
    let (local, remote) = stores();
    let engine = conflicted(&local, &remote).await;

    remote.put("d1", payload(json!({"v": "remote-2"})));
    engine.run_cycle().await.unwrap();

    let stored = local.record("d1").unwrap();
    assert_eq!(stored.conflict_payload, Some(payload(json!({"v": "local"}))));
    assert_eq!(stored.payload, payload(json!({"v": "remote-2"})));
}

// ============================================================================
// Checkpoint
// ============================================================================

#[tokio::test]
async fn checkpoint_tracks_feed_end_and_never_moves_back() {
    let (local, remote) = stores();
    let engine = engine(&local, &remote);
    let mut previous = 0u64;

    for round in 0..4 {
        remote.put(&format!("doc-{round}"), payload(json!({"round": round})));
        let stats = engine.run_cycle().await.unwrap();
        let point = engine
            .checkpoint()
            .await
            .unwrap()
            .last_replication_point
            .unwrap();

        assert_eq!(Some(&point), stats.end_token.as_ref());
        assert_eq!(point, remote.update_seq());

        let seq: u64 = point.as_str().parse().unwrap();
        assert!(seq >= previous);
        previous = seq;
    }

    let checkpoint = engine.checkpoint().await.unwrap();
    assert_eq!(checkpoint.history.len(), 4);
    assert!(checkpoint.history.iter().all(|h| h.checkpoint_advanced));
}

#[tokio::test]
async fn reset_checkpoint_keeps_pending_flags() {
    let (local, remote) = stores();
    let engine = engine(&local, &remote);
    engine.run_cycle().await.unwrap();

    local.insert(record("pending", None, true, json!({})));
    remote.faults().fail(StoreOp::Save, StoreError::unavailable("offline"));
    engine.run_cycle().await.unwrap();

    engine.reset_checkpoint().await.unwrap();
    let checkpoint = engine.checkpoint().await.unwrap();
    assert!(checkpoint.last_replication_point.is_none());
    assert_eq!(checkpoint.history.len(), 2);
    assert!(local.record("pending").unwrap().local_change);
}

#[tokio::test]
async fn checkpoint_document_is_never_replicated() {
    let (local, remote) = stores();
    remote.put("d1", payload(json!({})));

    let engine = engine(&local, &remote);
    engine.run_cycle().await.unwrap();
    engine.run_cycle().await.unwrap();

    assert!(remote.document("root").is_none());
    assert_eq!(remote.live_count(), 1);
}

#[tokio::test]
async fn status_reports_last_history_entry() {
    let (local, remote) = stores();
    remote.put("d1", payload(json!({})));
    {
        let first = engine(&local, &remote);
        first.run_cycle().await.unwrap();
    }

    // A fresh engine over the same stores picks up persisted history.
    let scheduler = Arc::new(ManualScheduler::new());
    let engine: MemoryEngine = SyncEngine::builder(SyncConfig::new("restarted"))
        .local_store(Arc::clone(&local))
        .remote_store(Arc::clone(&remote))
        .scheduler(scheduler)
        .build();
    let mut status = engine.subscribe();
    engine.start().await.unwrap();

    let entry = engine.status().last_history_entry;
    assert!(entry.is_some());

    status.wait_for(|s| s.cycles_completed == 1).await.unwrap();
    let latest = engine.status().last_history_entry.unwrap();
    assert_eq!(latest.since, Some(ChangeToken::new("1")));

    engine.stop();
    engine.join().await;
}

// ============================================================================
// Scheduled loop
// ============================================================================

#[tokio::test]
async fn loop_picks_up_changes_on_each_tick() {
    let (local, remote) = stores();
    let scheduler = Arc::new(ManualScheduler::new());
    let engine: MemoryEngine = SyncEngine::builder(SyncConfig::new("ticking"))
        .local_store(Arc::clone(&local))
        .remote_store(Arc::clone(&remote))
        .scheduler(scheduler.clone())
        .build();
    let mut status = engine.subscribe();

    engine.start().await.unwrap();
    status.wait_for(|s| s.cycles_completed == 1).await.unwrap();
    assert!(local.records().iter().all(|r| r.is_root()));

    remote.put("late", payload(json!({"arrived": true})));
    local.insert(record("outgoing", None, true, json!({"sent": true})));
    scheduler.advance();
    status.wait_for(|s| s.cycles_completed == 2).await.unwrap();

    assert!(local.record("late").is_some());
    assert!(remote.document("outgoing").is_some());

    engine.stop();
    engine.join().await;
    assert_eq!(engine.status().cycles_completed, 2);
}

#[tokio::test]
async fn start_requires_both_stores() {
    let engine: MemoryEngine = SyncEngine::builder(SyncConfig::new("orphan"))
        .remote_store(Arc::new(MemoryRemoteStore::new()))
        .build();
    let err = engine.start().await.unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
    assert_eq!(engine.state(), EngineState::Idle);
}

// ============================================================================
// Crash recovery
// ============================================================================

/// Remote state of one generated document.
#[derive(Debug, Clone, Copy)]
enum RemoteKind {
    Absent,
    Live,
    Updated,
    Deleted,
}

/// Local state of one generated document.
#[derive(Debug, Clone, Copy)]
enum LocalKind {
    Absent,
    Clean,
    Edited,
    PendingDelete,
    Unpushed,
}

fn remote_kind() -> impl Strategy<Value = RemoteKind> {
    prop_oneof![
        Just(RemoteKind::Absent),
        Just(RemoteKind::Live),
        Just(RemoteKind::Updated),
        Just(RemoteKind::Deleted),
    ]
}

fn local_kind() -> impl Strategy<Value = LocalKind> {
    prop_oneof![
        Just(LocalKind::Absent),
        Just(LocalKind::Clean),
        Just(LocalKind::Edited),
        Just(LocalKind::PendingDelete),
        Just(LocalKind::Unpushed),
    ]
}

fn build_case(
    docs: &[(RemoteKind, LocalKind, i64)],
) -> (Arc<MemoryLocalStore>, Arc<MemoryRemoteStore>) {
    let (local, remote) = stores();

    for (i, (remote_kind, local_kind, value)) in docs.iter().enumerate() {
        let uuid = format!("doc-{i}");
        let first = match remote_kind {
            RemoteKind::Absent => None,
            _ => Some(remote.put(&uuid, payload(json!({"v": value})))),
        };
        match remote_kind {
            RemoteKind::Updated => {
                remote.put(&uuid, payload(json!({"v": value + 1})));
            }
            RemoteKind::Deleted => {
                remote.remove(&uuid);
            }
            _ => {}
        }

        let baseline = first.unwrap_or_else(|| Revision::new("1-gone"));
        let synced = DocumentRecord {
            revision: Some(baseline),
            local_change: false,
            ..DocumentRecord::new(uuid.as_str(), payload(json!({"v": value})))
        };
        let local_record = match local_kind {
            LocalKind::Absent => None,
            LocalKind::Clean => Some(synced),
            LocalKind::Edited => {
                let mut edited = synced;
                edited.edit(payload(json!({"v": value * 10}))).unwrap();
                Some(edited)
            }
            LocalKind::PendingDelete => {
                let mut doomed = synced;
                doomed.mark_deleted().unwrap();
                Some(doomed)
            }
            LocalKind::Unpushed => Some(DocumentRecord::new(
                uuid.as_str(),
                payload(json!({"v": -value})),
            )),
        };
        if let Some(record) = local_record {
            local.insert(record);
        }
    }

    (local, remote)
}

fn documents(local: &MemoryLocalStore) -> Vec<DocumentRecord> {
    local.records().into_iter().filter(|r| !r.is_root()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn rerun_after_crash_before_checkpoint_converges(
        docs in prop::collection::vec((remote_kind(), local_kind(), -50i64..50), 1..8)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let (once_local, once_remote) = build_case(&docs);
            engine(&once_local, &once_remote).run_cycle().await.unwrap();

            let (crash_local, crash_remote) = build_case(&docs);
            let crashing = engine(&crash_local, &crash_remote);
            crash_local.faults().fail_document(
                StoreOp::Save,
                "root",
                StoreError::unavailable("power loss"),
            );
            assert!(crashing.run_cycle().await.is_err());
            assert!(crashing.checkpoint().await.unwrap().last_replication_point.is_none());

            crash_local.faults().clear();
            crashing.run_cycle().await.unwrap();

            assert_eq!(documents(&crash_local), documents(&once_local));
            assert_eq!(crash_remote.snapshot(), once_remote.snapshot());
        });
    }

    #[test]
    fn unsynced_edits_survive_a_cycle(
        docs in prop::collection::vec((remote_kind(), local_kind(), -50i64..50), 1..8)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let (local, remote) = build_case(&docs);
            let before: Vec<DocumentRecord> = documents(&local)
                .into_iter()
                .filter(|r| r.local_change && !r.local_delete)
                .collect();

            engine(&local, &remote).run_cycle().await.unwrap();

            for original in before {
                let after = local.record(&original.uuid).unwrap();
                let on_remote = remote
                    .document(&original.uuid)
                    .map(|doc| doc.payload);
                let kept_locally = after.payload == original.payload
                    || after.conflict_payload.as_ref() == Some(&original.payload);
                assert!(
                    kept_locally || on_remote == Some(original.payload.clone()),
                    "edit to {} was lost",
                    original.uuid
                );
            }
        });
    }
}
