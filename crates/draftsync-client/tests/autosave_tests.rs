use draftsync_client::{
    AutosaveCoordinator, AutosaveState, LocalOnlyReason, Resolution, SyncEvent, TickOutcome,
};
use draftsync_core::{Clock, Draft, DraftId, EvictionNotice, RetentionPolicy, SyncError, MIB};
use draftsync_store::DraftRepository;
use draftsync_test_utils::{draft_with_attachment, Harness, LOCAL_EDITOR};
use std::time::Duration;
use tokio::sync::broadcast::Receiver;

fn drain(rx: &mut Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn note(draft: &Draft) -> Option<&str> {
    draft.fields.get("notes").and_then(|v| v.as_str())
}

#[tokio::test]
async fn test_unlinked_draft_only_saves_locally() {
    let h = Harness::new();
    let coordinator =
        AutosaveCoordinator::new(h.ctx.clone(), Draft::new(DraftId::unsaved(), h.clock.now()));
    let unlinked = |outcome: &TickOutcome| {
        matches!(
            outcome,
            TickOutcome::LocalOnly {
                reason: LocalOnlyReason::Unlinked,
                persisted: true
            }
        )
    };

    coordinator.edit(|d| d.set_field("notes", "first".into()));
    assert!(unlinked(&coordinator.tick().await));
    let first = h.ctx.store.get(&DraftId::unsaved()).unwrap().unwrap();
    assert_eq!(note(&first), Some("first"));
    assert_eq!(h.api.update_calls(), 0);

    h.advance(40);
    coordinator.edit(|d| d.set_field("notes", "second".into()));
    assert!(unlinked(&coordinator.tick().await));
    assert!(!coordinator.is_dirty());

    let second = h.ctx.store.get(&DraftId::unsaved()).unwrap().unwrap();
    assert_eq!(note(&second), Some("second"));
    assert_eq!(second.last_modified_local, h.clock.now());
    assert!(second.last_modified_local > first.last_modified_local);
    assert_eq!(h.api.update_calls(), 0);
    assert_eq!(h.api.create_calls(), 0);
}

#[tokio::test]
async fn test_linked_draft_saves_locally_then_remotely() {
    let h = Harness::new();
    let draft = h.linked_draft("seed");
    let report_id = draft.report_id.unwrap();
    let coordinator = AutosaveCoordinator::new(h.ctx.clone(), draft);
    let mut rx = h.events.subscribe();

    h.advance(30);
    coordinator.edit(|d| d.set_field("notes", "updated".into()));
    let TickOutcome::SavedRemote(receipt) = coordinator.tick().await else {
        panic!("expected a remote save");
    };

    assert_eq!(receipt.version, 2);
    let server = h.api.controller().get(report_id).unwrap();
    assert_eq!(server.fields.get("notes").and_then(|v| v.as_str()), Some("updated"));
    assert!(!coordinator.is_dirty());
    assert_eq!(coordinator.draft().last_known_server_marker, Some(receipt.updated_at));

    let events = drain(&mut rx);
    assert!(matches!(events.first(), Some(SyncEvent::SavedLocally { .. })));
    assert!(events.iter().any(|e| matches!(e, SyncEvent::SavedRemote { .. })));

    // Nothing changed since: no further calls
    assert!(matches!(coordinator.tick().await, TickOutcome::Clean));
    assert_eq!(h.api.update_calls(), 1);
}

#[tokio::test]
async fn test_conflict_stops_remote_saves_until_force_overwrite() {
    let h = Harness::new();
    let draft = h.linked_draft("seed");
    let report_id = draft.report_id.unwrap();
    let coordinator = AutosaveCoordinator::new(h.ctx.clone(), draft);
    let mut rx = h.events.subscribe();

    h.advance(5);
    let theirs = h.api.write_as("bob", report_id, "bob was here");

    coordinator.edit(|d| d.set_field("notes", "mine".into()));
    let TickOutcome::Conflict(context) = coordinator.tick().await else {
        panic!("expected a conflict");
    };
    assert_eq!(context.server_updated_by, "bob");
    assert_eq!(context.server_updated_at, theirs.updated_at);
    assert_eq!(coordinator.state(), AutosaveState::Conflicted);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, SyncEvent::ConflictDetected(c) if c.report_id == report_id)));

    // Edits keep landing locally while the conflict is pending
    coordinator.edit(|d| d.set_field("notes", "mine, again".into()));
    assert!(matches!(
        coordinator.tick().await,
        TickOutcome::LocalOnly {
            reason: LocalOnlyReason::Conflicted,
            persisted: true
        }
    ));
    assert_eq!(h.api.update_calls(), 1);
    let stored = h.ctx.store.get(&coordinator.draft_id()).unwrap().unwrap();
    assert_eq!(note(&stored), Some("mine, again"));

    h.advance(5);
    let outcome = coordinator.resolve_conflict(Resolution::ForceOverwrite).await.unwrap();
    assert!(outcome.marker > theirs.updated_at);
    assert_eq!(outcome.version, theirs.version + 1);
    assert_eq!(coordinator.state(), AutosaveState::Idle);
    assert!(coordinator.pending_conflict().is_none());
    assert!(!coordinator.is_dirty());

    let server = h.api.controller().get(report_id).unwrap();
    assert_eq!(server.updated_by, LOCAL_EDITOR);
    assert_eq!(server.fields.get("notes").and_then(|v| v.as_str()), Some("mine, again"));
}

#[tokio::test]
async fn test_discard_local_adopts_server_copy() {
    let h = Harness::new();
    let draft = h.linked_draft("seed");
    let report_id = draft.report_id.unwrap();
    let coordinator = AutosaveCoordinator::new(h.ctx.clone(), draft);

    let theirs = h.api.write_as("bob", report_id, "bob was here");
    coordinator.edit(|d| d.set_field("notes", "mine".into()));
    assert!(matches!(coordinator.tick().await, TickOutcome::Conflict(_)));

    let outcome = coordinator.resolve_conflict(Resolution::DiscardLocal).await.unwrap();
    assert_eq!(outcome.marker, theirs.updated_at);

    let draft = coordinator.draft();
    assert_eq!(note(&draft), Some("bob was here"));
    assert_eq!(draft.last_known_server_version, Some(theirs.version));
    assert!(!coordinator.is_dirty());
    assert!(matches!(coordinator.tick().await, TickOutcome::Clean));

    // Next edit saves cleanly against the adopted marker
    coordinator.edit(|d| d.set_field("notes", "on top of bob".into()));
    assert!(matches!(coordinator.tick().await, TickOutcome::SavedRemote(_)));
}

#[tokio::test]
async fn test_failed_resolution_keeps_conflict_pending() {
    let h = Harness::new();
    let draft = h.linked_draft("seed");
    let report_id = draft.report_id.unwrap();
    let coordinator = AutosaveCoordinator::new(h.ctx.clone(), draft);

    h.api.write_as("bob", report_id, "bob was here");
    coordinator.edit(|d| d.set_field("notes", "mine".into()));
    assert!(matches!(coordinator.tick().await, TickOutcome::Conflict(_)));

    h.api.set_offline(true);
    let err = coordinator.resolve_conflict(Resolution::ForceOverwrite).await.unwrap_err();
    assert!(matches!(err, SyncError::NetworkFailure(_)));
    assert!(coordinator.pending_conflict().is_some());
    assert_eq!(coordinator.state(), AutosaveState::Conflicted);

    h.api.set_offline(false);
    assert!(coordinator.resolve_conflict(Resolution::ForceOverwrite).await.is_ok());
}

#[tokio::test]
async fn test_second_client_on_same_marker_conflicts() {
    let h = Harness::new();
    let first = h.linked_draft("seed");
    let report_id = first.report_id.unwrap();
    let mut second = first.clone();
    second.id = DraftId::new("second-device");

    let a = AutosaveCoordinator::new(h.ctx.clone(), first);
    let b = AutosaveCoordinator::new(h.ctx.clone(), second);
    a.edit(|d| d.set_field("notes", "from a".into()));
    b.edit(|d| d.set_field("notes", "from b".into()));

    assert!(matches!(a.tick().await, TickOutcome::SavedRemote(_)));
    let TickOutcome::Conflict(context) = b.tick().await else {
        panic!("second writer should conflict");
    };
    assert_eq!(context.server_updated_by, LOCAL_EDITOR);

    let server = h.api.controller().get(report_id).unwrap();
    assert_eq!(server.fields.get("notes").and_then(|v| v.as_str()), Some("from a"));
    assert_eq!(server.version, 2);
}

#[tokio::test]
async fn test_expired_session_suspends_then_replays_once() {
    let h = Harness::new();
    let draft = h.linked_draft("seed");
    let coordinator = AutosaveCoordinator::new(h.ctx.clone(), draft);
    let mut rx = h.events.subscribe();

    h.api.expire_session();
    coordinator.edit(|d| d.set_field("notes", "typed while expired".into()));
    assert!(matches!(coordinator.tick().await, TickOutcome::AuthExpired));
    assert_eq!(coordinator.state(), AutosaveState::AuthExpired);
    assert!(!h.guard.is_remote_allowed());

    for i in 0..3 {
        h.advance(30);
        coordinator.edit(|d| d.set_field("notes", format!("edit {i}").into()));
        assert!(matches!(
            coordinator.tick().await,
            TickOutcome::LocalOnly {
                reason: LocalOnlyReason::Suspended,
                persisted: true
            }
        ));
    }
    assert_eq!(h.api.update_calls(), 1);
    let stored = h.ctx.store.get(&coordinator.draft_id()).unwrap().unwrap();
    assert_eq!(note(&stored), Some("edit 2"));

    let prompts = drain(&mut rx)
        .into_iter()
        .filter(|e| *e == SyncEvent::ReauthRequired)
        .count();
    assert_eq!(prompts, 1);

    h.api.restore_session();
    h.guard.resume("fresh-token");
    assert!(matches!(coordinator.tick().await, TickOutcome::SavedRemote(_)));
    assert_eq!(h.api.update_calls(), 2);
    assert_eq!(coordinator.state(), AutosaveState::Idle);
    assert!(!coordinator.is_dirty());
}

#[tokio::test]
async fn test_expiry_is_shared_across_drafts() {
    let h = Harness::new();
    let a = AutosaveCoordinator::new(h.ctx.clone(), h.linked_draft("a"));
    let b = AutosaveCoordinator::new(h.ctx.clone(), h.linked_draft("b"));
    let mut rx = h.events.subscribe();

    h.api.expire_session();
    a.edit(|d| d.set_field("notes", "a".into()));
    b.edit(|d| d.set_field("notes", "b".into()));

    assert!(matches!(a.tick().await, TickOutcome::AuthExpired));
    // b never reaches the server
    assert!(matches!(
        b.tick().await,
        TickOutcome::LocalOnly {
            reason: LocalOnlyReason::Suspended,
            ..
        }
    ));
    assert_eq!(h.api.update_calls(), 1);
    assert_eq!(
        drain(&mut rx).iter().filter(|e| **e == SyncEvent::ReauthRequired).count(),
        1
    );
}

#[tokio::test]
async fn test_network_failure_retries_on_next_tick() {
    let h = Harness::new();
    let coordinator = AutosaveCoordinator::new(h.ctx.clone(), h.linked_draft("seed"));

    h.api.set_offline(true);
    coordinator.edit(|d| d.set_field("notes", "offline".into()));
    assert!(matches!(
        coordinator.tick().await,
        TickOutcome::RetryLater(SyncError::NetworkFailure(_))
    ));
    assert!(coordinator.is_dirty());
    assert_eq!(coordinator.state(), AutosaveState::Idle);

    h.api.set_offline(false);
    assert!(matches!(coordinator.tick().await, TickOutcome::SavedRemote(_)));
    assert!(!coordinator.is_dirty());
}

#[tokio::test(start_paused = true)]
async fn test_edit_during_flight_stays_dirty() {
    let h = Harness::new();
    let coordinator = AutosaveCoordinator::new(h.ctx.clone(), h.linked_draft("seed"));
    h.api.set_latency(Some(Duration::from_secs(1)));

    coordinator.edit(|d| d.set_field("notes", "before".into()));
    let (first, second) = tokio::join!(coordinator.tick(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        coordinator.edit(|d| d.set_field("notes", "during".into()));
        coordinator.tick().await
    });

    assert!(matches!(first, TickOutcome::SavedRemote(_)));
    assert!(matches!(second, TickOutcome::InFlight));
    assert_eq!(h.api.update_calls(), 1);
    assert!(coordinator.is_dirty());

    assert!(matches!(coordinator.tick().await, TickOutcome::SavedRemote(_)));
    assert!(!coordinator.is_dirty());
    assert_eq!(h.api.update_calls(), 2);
}

#[tokio::test]
async fn test_storage_failure_is_reported_once_and_recovers() {
    let h = Harness::new();
    let coordinator = AutosaveCoordinator::new(h.ctx.clone(), h.linked_draft("seed"));
    let mut rx = h.events.subscribe();

    h.repo.set_unavailable(true);
    for i in 0..3 {
        coordinator.edit(|d| d.set_field("notes", format!("edit {i}").into()));
        assert!(matches!(coordinator.tick().await, TickOutcome::SavedRemote(_)));
    }

    h.repo.set_unavailable(false);
    coordinator.edit(|d| d.set_field("notes", "back".into()));
    assert!(matches!(coordinator.tick().await, TickOutcome::SavedRemote(_)));

    let events = drain(&mut rx);
    let degraded = events
        .iter()
        .filter(|e| matches!(e, SyncEvent::StorageDegraded { .. }))
        .count();
    let recovered = events
        .iter()
        .filter(|e| matches!(e, SyncEvent::StorageRecovered { .. }))
        .count();
    assert_eq!((degraded, recovered), (1, 1));

    let stored = h.ctx.store.get(&coordinator.draft_id()).unwrap().unwrap();
    assert_eq!(note(&stored), Some("back"));
}

#[tokio::test]
async fn test_unlinked_draft_stays_dirty_when_storage_fails() {
    let h = Harness::new();
    let coordinator =
        AutosaveCoordinator::new(h.ctx.clone(), Draft::new(DraftId::unsaved(), h.clock.now()));

    h.repo.set_unavailable(true);
    coordinator.edit(|d| d.set_field("notes", "in memory".into()));
    assert!(matches!(
        coordinator.tick().await,
        TickOutcome::LocalOnly {
            reason: LocalOnlyReason::Unlinked,
            persisted: false
        }
    ));
    assert!(coordinator.is_dirty());
    assert_eq!(note(&coordinator.draft()), Some("in memory"));
}

#[tokio::test]
async fn test_create_remote_rekeys_placeholder_draft() {
    let h = Harness::new();
    let coordinator =
        AutosaveCoordinator::new(h.ctx.clone(), Draft::new(DraftId::unsaved(), h.clock.now()));
    coordinator.edit(|d| d.set_field("notes", "new report".into()));
    coordinator.tick().await;
    assert!(h.ctx.store.exists(&DraftId::unsaved()).unwrap());

    let report_id = coordinator.create_remote().await.unwrap();
    let id = DraftId::new(report_id.to_string());
    assert_eq!(coordinator.draft_id(), id);
    assert!(!h.ctx.store.exists(&DraftId::unsaved()).unwrap());

    let stored = h.ctx.store.get(&id).unwrap().unwrap();
    assert_eq!(stored.report_id, Some(report_id));
    assert!(stored.last_known_server_marker.is_some());

    // Linking twice is a no-op
    assert_eq!(coordinator.create_remote().await.unwrap(), report_id);
    assert_eq!(h.api.create_calls(), 1);
}

#[tokio::test]
async fn test_submit_pushes_and_removes_local_copy() {
    let h = Harness::new();
    let coordinator =
        AutosaveCoordinator::new(h.ctx.clone(), Draft::new(DraftId::unsaved(), h.clock.now()));
    coordinator.edit(|d| d.set_field("notes", "final".into()));

    let receipt = coordinator.submit().await.unwrap();
    assert_eq!(h.api.create_calls(), 1);
    assert_eq!(h.api.update_calls(), 1);
    assert!(h.ctx.store.all().unwrap().is_empty());

    let server = h.api.controller().get(receipt.report_id).unwrap();
    assert_eq!(server.fields.get("notes").and_then(|v| v.as_str()), Some("final"));
    assert!(matches!(coordinator.tick().await, TickOutcome::Closed));
}

#[tokio::test]
async fn test_submit_during_conflict_is_refused() {
    let h = Harness::new();
    let draft = h.linked_draft("seed");
    let report_id = draft.report_id.unwrap();
    let coordinator = AutosaveCoordinator::new(h.ctx.clone(), draft);

    h.api.write_as("bob", report_id, "bob was here");
    coordinator.edit(|d| d.set_field("notes", "mine".into()));

    let err = coordinator.submit().await.unwrap_err();
    assert!(matches!(err, SyncError::Conflict { ref updated_by, .. } if updated_by == "bob"));
    assert!(h.ctx.store.exists(&coordinator.draft_id()).unwrap());
}

#[tokio::test]
async fn test_cancel_deletes_local_copy() {
    let h = Harness::new();
    let coordinator =
        AutosaveCoordinator::new(h.ctx.clone(), Draft::new(DraftId::unsaved(), h.clock.now()));
    coordinator.edit(|d| d.set_field("notes", "abandoned".into()));
    coordinator.tick().await;

    coordinator.cancel().unwrap();
    assert!(!h.ctx.store.exists(&DraftId::unsaved()).unwrap());
    assert!(matches!(coordinator.tick().await, TickOutcome::Closed));
}

#[tokio::test]
async fn test_open_delivers_eviction_notice_once() {
    let h = Harness::new();
    let mut draft = Draft::new(DraftId::new("evicted"), h.clock.now());
    draft.eviction_notice = Some(EvictionNotice {
        stripped_attachments: 2,
        reclaimed_bytes: 3_000,
        at: h.clock.now(),
    });
    h.repo.put(&draft).unwrap();
    let mut rx = h.events.subscribe();

    let coordinator = AutosaveCoordinator::open(h.ctx.clone(), &DraftId::new("evicted"))
        .unwrap()
        .unwrap();
    assert!(coordinator.draft().eviction_notice.is_none());
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [SyncEvent::EvictionNotice { notice, .. }] if notice.stripped_attachments == 2
    ));

    assert!(AutosaveCoordinator::open(h.ctx.clone(), &DraftId::new("evicted")).unwrap().is_some());
    assert!(drain(&mut rx).is_empty());
    assert!(AutosaveCoordinator::open(h.ctx.clone(), &DraftId::new("missing")).unwrap().is_none());
}

#[tokio::test]
async fn test_active_draft_stripped_by_its_own_save() {
    let h = Harness::with_policy(RetentionPolicy::default().with_max_attachment_bytes(10 * MIB));
    let draft = draft_with_attachment("active", 12, h.clock.now());
    let coordinator = AutosaveCoordinator::new(h.ctx.clone(), draft);
    let mut rx = h.events.subscribe();

    coordinator.edit(|d| d.set_field("notes", "with photo".into()));
    coordinator.tick().await;

    assert!(coordinator.draft().attachments.is_empty());
    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        SyncEvent::EvictionNotice { draft_id, notice }
            if draft_id.as_str() == "active" && notice.reclaimed_bytes == 12 * MIB
    )));
    assert_eq!(h.ctx.store.stats().unwrap().attachment_bytes, 0);
}
