//! Integration tests for the history crate
//!
//! These drive a real controller against the in-memory gateway on a
//! paused tokio clock, so every delay in the sync rules is exact.

use chrono::Utc;
use history::actions::ActionHandler;
use history::analysis::{AnalysisRequest, InMemoryAnalysisGateway};
use history::gateway::{GatewayError, InMemoryHistoryGateway};
use history::models::{AnalysisKind, HistoryDraft, HistoryId, HistoryItem, RefreshReason, Session, Snapshot, SyncPhase};
use history::storage::{FileFlagStore, FlagStore, InMemoryFlagStore, RefreshFlag};
use history::sync::{HistoryEvents, HistorySync, Triggers};
use history::Settings;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

/// Helper to create a history record owned by `user`
fn record(id: i64, user: &str) -> HistoryItem {
    HistoryItem::builder(HistoryId::new(id), user)
        .language("python")
        .original_code(format!("def f{}(): pass", id))
        .feedback("Consider adding a docstring.")
        .created_at(Utc::now() - chrono::Duration::minutes(60 - id))
        .build()
}

/// Gateway where alice owns records 1, 4 and 5 (listed as [5, 4, 1])
fn alice_gateway() -> Arc<InMemoryHistoryGateway> {
    let gateway = Arc::new(InMemoryHistoryGateway::new());
    for id in [1, 4, 5] {
        gateway.insert(record(id, "alice"));
    }
    gateway
}

fn alice() -> Option<Session> {
    Session::new("alice")
}

/// Wait until no fetch is in flight and return the resulting state
async fn settled(sync: &HistorySync) -> Snapshot {
    let mut rx = sync.subscribe();
    let snapshot = rx
        .wait_for(|s| s.phase != SyncPhase::Fetching)
        .await
        .expect("controller alive")
        .clone();
    snapshot
}

/// Activate for alice and wait for the first list
async fn activated(gateway: &Arc<InMemoryHistoryGateway>) -> HistorySync {
    let sync = HistorySync::activate(gateway.clone(), Settings::default(), alice()).unwrap();
    let snapshot = settled(&sync).await;
    assert_eq!(snapshot.phase, SyncPhase::Idle);
    sync
}

#[tokio::test(start_paused = true)]
async fn test_activation_scenario_with_broadcast_refresh() {
    let gateway = alice_gateway();
    let events = HistoryEvents::new();

    let sync = HistorySync::activate(gateway.clone(), Settings::default(), alice()).unwrap();
    Triggers::new().broadcast(&events).spawn(&sync);

    let snapshot = settled(&sync).await;
    assert_eq!(gateway.list_log(), vec!["alice"]);
    assert_eq!(snapshot.ids(), vec![5, 4, 1]);
    assert_eq!(snapshot.phase, SyncPhase::Idle);
    assert_eq!(snapshot.username.as_deref(), Some("alice"));

    // A save elsewhere in the app
    gateway.insert(record(9, "alice"));
    events.notify_changed();

    sleep(Duration::from_millis(500)).await;
    assert_eq!(gateway.list_calls(), 1);

    let mut rx = sync.subscribe();
    let snapshot = rx.wait_for(|s| s.ids().contains(&9)).await.unwrap().clone();
    assert_eq!(snapshot.ids(), vec![9, 5, 4, 1]);
    assert_eq!(gateway.list_log(), vec!["alice", "alice"]);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_then_manual_refresh_scenario() {
    let gateway = alice_gateway();
    gateway.set_latency(Duration::from_secs(60));

    let started = tokio::time::Instant::now();
    let sync = HistorySync::activate(gateway.clone(), Settings::default(), alice()).unwrap();
    let snapshot = settled(&sync).await;

    assert_eq!(snapshot.phase, SyncPhase::FetchFailed);
    assert_eq!(snapshot.last_error, Some(GatewayError::Timeout));
    assert!(snapshot.items.is_empty());
    assert!(snapshot.is_failed());
    let elapsed = started.elapsed();
    assert!(elapsed >= Settings::default().request_timeout());
    assert!(elapsed < Duration::from_secs(11));

    gateway.set_latency(Duration::ZERO);
    sync.request_refresh(RefreshReason::Manual, true);
    let snapshot = settled(&sync).await;

    assert_eq!(snapshot.phase, SyncPhase::Idle);
    assert_eq!(snapshot.ids(), vec![5, 4, 1]);
    assert_eq!(snapshot.last_error, None);
    assert_eq!(gateway.list_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_single_flight_for_request_burst() {
    let gateway = alice_gateway();
    let sync = activated(&gateway).await;
    sleep(Duration::from_secs(3)).await;

    gateway.set_latency(Duration::from_millis(200));
    for (i, force) in [false, true, true, false, true, false, true].into_iter().enumerate() {
        let reason = if i % 2 == 0 { RefreshReason::Broadcast } else { RefreshReason::Manual };
        sync.request_refresh(reason, force);
    }

    let snapshot = settled(&sync).await;
    assert_eq!(snapshot.phase, SyncPhase::Idle);
    sleep(Duration::from_secs(1)).await;
    assert_eq!(gateway.list_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_debounce_window() {
    let gateway = alice_gateway();
    let sync = activated(&gateway).await;

    sleep(Duration::from_secs(1)).await;
    sync.request_refresh(RefreshReason::Flag, false);
    assert_eq!(sync.snapshot().phase, SyncPhase::Idle);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(gateway.list_calls(), 1);

    sleep(Duration::from_millis(1900)).await;
    sync.request_refresh(RefreshReason::Flag, false);
    assert_eq!(sync.snapshot().phase, SyncPhase::Fetching);
    settled(&sync).await;
    assert_eq!(gateway.list_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_dispose_discards_in_flight_result() {
    let gateway = alice_gateway();
    let sync = activated(&gateway).await;

    gateway.set_latency(Duration::from_secs(5));
    gateway.insert(record(9, "alice"));
    sync.request_refresh(RefreshReason::Manual, true);
    sleep(Duration::from_millis(10)).await;

    sync.dispose();
    sync.dispose();
    assert!(sync.is_disposed());

    sleep(Duration::from_secs(10)).await;
    assert_eq!(sync.snapshot().ids(), vec![5, 4, 1]);
    assert_eq!(gateway.list_calls(), 2);

    sync.request_refresh(RefreshReason::Manual, true);
    sync.on_user_changed(Session::new("bob"));
    sleep(Duration::from_secs(10)).await;
    assert_eq!(gateway.list_calls(), 2);
    assert_eq!(sync.snapshot().username.as_deref(), Some("alice"));
}

#[tokio::test(start_paused = true)]
async fn test_queued_request_runs_after_in_flight_fetch() {
    let gateway = alice_gateway();
    let sync = activated(&gateway).await;

    // A reads the records when its latency ends, at +1s
    gateway.set_latency(Duration::from_secs(1));
    sync.request_refresh(RefreshReason::Manual, true);
    sleep(Duration::from_millis(100)).await;

    sync.request_refresh(RefreshReason::Focus, true);
    sync.request_refresh(RefreshReason::Manual, true);

    sleep(Duration::from_millis(1400)).await;
    // A is applied and B is in flight
    let snapshot = sync.snapshot();
    assert_eq!(snapshot.ids(), vec![5, 4, 1]);
    assert_eq!(snapshot.phase, SyncPhase::Fetching);
    assert_eq!(gateway.list_calls(), 3);

    gateway.insert(record(9, "alice"));
    let snapshot = settled(&sync).await;
    assert_eq!(snapshot.ids(), vec![9, 5, 4, 1]);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(gateway.list_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failure_preserves_items() {
    let gateway = alice_gateway();
    let sync = activated(&gateway).await;

    gateway.fail_next(GatewayError::ServerError {
        status: 500,
        message: "boom".to_string(),
    });
    sync.request_refresh(RefreshReason::Manual, true);

    let snapshot = settled(&sync).await;
    assert_eq!(snapshot.phase, SyncPhase::FetchFailed);
    assert_eq!(snapshot.ids(), vec![5, 4, 1]);
    assert!(matches!(snapshot.last_error, Some(GatewayError::ServerError { status: 500, .. })));
    assert!(snapshot.last_success_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_drops_queued_request() {
    let gateway = alice_gateway();
    let sync = activated(&gateway).await;

    gateway.set_latency(Duration::from_millis(500));
    gateway.fail_next(GatewayError::network("connection reset"));
    sync.request_refresh(RefreshReason::Manual, true);
    sleep(Duration::from_millis(100)).await;
    sync.request_refresh(RefreshReason::Manual, true);

    let snapshot = settled(&sync).await;
    assert_eq!(snapshot.phase, SyncPhase::FetchFailed);
    sleep(Duration::from_secs(5)).await;
    assert_eq!(gateway.list_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_user_switch_discards_previous_user_result() {
    let gateway = alice_gateway();
    gateway.insert(record(20, "bob"));
    gateway.set_latency(Duration::from_secs(1));

    let sync = HistorySync::activate(gateway.clone(), Settings::default(), alice()).unwrap();
    sleep(Duration::from_millis(100)).await;
    sync.on_user_changed(Session::new("bob"));

    let snapshot = settled(&sync).await;
    assert_eq!(snapshot.username.as_deref(), Some("bob"));
    assert_eq!(snapshot.ids(), vec![20]);

    sleep(Duration::from_secs(3)).await;
    assert_eq!(sync.snapshot().ids(), vec![20]);
    assert_eq!(gateway.list_log(), vec!["alice", "bob"]);
}

#[tokio::test(start_paused = true)]
async fn test_logout_clears_items_and_ignores_refreshes() {
    let gateway = alice_gateway();
    let sync = activated(&gateway).await;

    sync.on_user_changed(None);
    let snapshot = sync.snapshot();
    assert_eq!(snapshot.phase, SyncPhase::Idle);
    assert!(snapshot.items.is_empty());
    assert_eq!(snapshot.username, None);

    sync.request_refresh(RefreshReason::Manual, true);
    sync.on_focus_regained();
    sleep(Duration::from_secs(1)).await;
    assert_eq!(gateway.list_calls(), 1);
    assert_eq!(sync.snapshot().phase, SyncPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_focus_refreshes_only_when_stale() {
    let gateway = alice_gateway();
    let sync = activated(&gateway).await;

    sleep(Duration::from_secs(5)).await;
    sync.on_focus_regained();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(gateway.list_calls(), 1);

    sleep(Duration::from_secs(6)).await;
    sync.on_focus_regained();
    settled(&sync).await;
    assert_eq!(gateway.list_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_focus_after_failed_first_fetch_refreshes() {
    let gateway = alice_gateway();
    gateway.fail_next(GatewayError::Timeout);
    let sync = HistorySync::activate(gateway.clone(), Settings::default(), alice()).unwrap();
    assert_eq!(settled(&sync).await.phase, SyncPhase::FetchFailed);

    sync.on_focus_regained();
    assert_eq!(settled(&sync).await.ids(), vec![5, 4, 1]);
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_burst_yields_one_fetch() {
    let gateway = alice_gateway();
    let events = HistoryEvents::new();
    let sync = activated(&gateway).await;
    assert_eq!(Triggers::new().broadcast(&events).spawn(&sync), 1);

    for _ in 0..5 {
        events.notify_changed();
        sleep(Duration::from_millis(100)).await;
    }

    sleep(Duration::from_secs(2)).await;
    assert_eq!(gateway.list_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_listener_survives_lag() {
    let gateway = alice_gateway();
    let events = HistoryEvents::new();
    let sync = activated(&gateway).await;
    Triggers::new().broadcast(&events).spawn(&sync);

    // More events than the bus keeps per subscriber
    for _ in 0..100 {
        events.notify_changed();
    }
    sleep(Duration::from_secs(2)).await;
    assert_eq!(gateway.list_calls(), 2);

    events.notify_changed();
    sleep(Duration::from_secs(2)).await;
    assert_eq!(gateway.list_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_flag_poller_fresh_flag_triggers_one_fetch() {
    let gateway = alice_gateway();
    let flags = Arc::new(InMemoryFlagStore::new());
    let sync = activated(&gateway).await;

    flags.write(RefreshFlag::raised_now()).unwrap();
    Triggers::new().flag_store(flags.clone()).spawn(&sync);

    // First check runs right away
    sleep(Duration::from_millis(10)).await;
    assert_eq!(gateway.list_calls(), 2);
    assert_eq!(flags.read().unwrap(), None);

    // Nothing raised since: polling keeps quiet
    sleep(Duration::from_secs(10)).await;
    assert_eq!(gateway.list_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_flag_poller_clears_stale_flag_without_fetch() {
    let gateway = alice_gateway();
    let flags = Arc::new(InMemoryFlagStore::new());
    let sync = activated(&gateway).await;
    Triggers::new().flag_store(flags.clone()).spawn(&sync);
    sleep(Duration::from_millis(10)).await;

    flags
        .write(RefreshFlag {
            needs_refresh: true,
            saved_at: Utc::now() - chrono::Duration::seconds(45),
        })
        .unwrap();
    sleep(Duration::from_secs(4)).await;

    assert_eq!(flags.read().unwrap(), None);
    assert_eq!(gateway.list_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_flag_raised_by_another_instance() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("refresh-flag.json");
    let gateway = alice_gateway();

    // Viewer instance polls the flag file
    let sync = activated(&gateway).await;
    Triggers::new()
        .flag_store(Arc::new(FileFlagStore::new(&path)))
        .spawn(&sync);

    // Writer instance saves through its own handler
    let writer = ActionHandler::new(
        gateway.clone(),
        Arc::new(FileFlagStore::new(&path)),
        HistoryEvents::new(),
    );
    let draft = HistoryDraft::new("alice", "rust", AnalysisKind::Explain, "fn main() {}");
    let id = writer.save(&draft).await.unwrap();
    assert!(path.exists());

    let mut rx = sync.subscribe();
    let snapshot = rx.wait_for(|s| s.ids().first() == Some(&id.value())).await.unwrap().clone();
    assert_eq!(snapshot.items[0].kind, AnalysisKind::Explain);

    sleep(Duration::from_millis(10)).await;
    assert!(!path.exists());
}

#[tokio::test(start_paused = true)]
async fn test_signed_out_instance_leaves_flag_for_signed_in_one() {
    let gateway = alice_gateway();
    let flags = Arc::new(InMemoryFlagStore::new());

    let signed_out = HistorySync::activate(gateway.clone(), Settings::default(), None).unwrap();
    Triggers::new().flag_store(flags.clone()).spawn(&signed_out);

    flags.write(RefreshFlag::raised_now()).unwrap();
    sleep(Duration::from_secs(7)).await;
    assert!(flags.read().unwrap().is_some());
    assert_eq!(gateway.list_calls(), 0);

    let viewer = activated(&gateway).await;
    Triggers::new().flag_store(flags.clone()).spawn(&viewer);
    sleep(Duration::from_millis(10)).await;

    assert_eq!(gateway.list_calls(), 2);
    assert_eq!(flags.read().unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_own_save_refreshes_once_and_leaves_flag_for_others() {
    let gateway = alice_gateway();
    let events = HistoryEvents::new();
    let flags = Arc::new(InMemoryFlagStore::new());

    let sync = activated(&gateway).await;
    Triggers::new()
        .broadcast(&events)
        .flag_store(flags.clone())
        .spawn(&sync);

    let handler = ActionHandler::new(gateway.clone(), flags.clone(), events.clone());
    let draft = HistoryDraft::new("alice", "c", AnalysisKind::Review, "int main() {}");
    handler.save(&draft).await.unwrap();

    // The broadcast refreshes this instance; the poller skips the flag
    sleep(Duration::from_secs(10)).await;
    assert_eq!(gateway.list_calls(), 2);
    assert_eq!(sync.snapshot().ids(), vec![6, 5, 4, 1]);
    assert!(flags.read().unwrap().is_some());

    // A second instance sharing the store still sees it
    let other = activated(&gateway).await;
    Triggers::new().flag_store(flags.clone()).spawn(&other);
    sleep(Duration::from_millis(10)).await;
    assert_eq!(gateway.list_calls(), 4);
    assert_eq!(flags.read().unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_analysis_result_reaches_open_views() {
    let gateway = alice_gateway();
    let analyzer = InMemoryAnalysisGateway::new();
    let events = HistoryEvents::new();

    let sync = activated(&gateway).await;
    Triggers::new().broadcast(&events).spawn(&sync);

    let handler = ActionHandler::new(gateway.clone(), Arc::new(InMemoryFlagStore::new()), events);
    let request = AnalysisRequest::new("python", "x = 1\ny = x");
    let (analysis, id) = handler
        .analyze_and_save(&analyzer, AnalysisKind::Suggest, "alice", &request)
        .await
        .unwrap();

    let mut rx = sync.subscribe();
    let snapshot = rx.wait_for(|s| s.ids().first() == Some(&id.value())).await.unwrap().clone();
    let saved = &snapshot.items[0];
    assert_eq!(saved.kind, AnalysisKind::Suggest);
    assert_eq!(saved.artifact.feedback, analysis.artifact.feedback);
    assert!(saved.artifact.feedback.as_deref().is_some_and(|f| f.contains("'x'")));
}

#[tokio::test(start_paused = true)]
async fn test_save_refreshes_open_views() {
    let gateway = alice_gateway();
    let events = HistoryEvents::new();
    let flags = Arc::new(InMemoryFlagStore::new());

    let first = activated(&gateway).await;
    let second = activated(&gateway).await;
    for sync in [&first, &second] {
        Triggers::new().broadcast(&events).spawn(sync);
    }

    let handler = ActionHandler::new(gateway.clone(), flags.clone(), events.clone());
    let draft = HistoryDraft::new("alice", "go", AnalysisKind::Suggest, "func main() {}");
    let id = handler.save(&draft).await.unwrap();
    assert_eq!(id, HistoryId::new(6));

    sleep(Duration::from_secs(2)).await;
    assert_eq!(first.snapshot().ids(), vec![6, 5, 4, 1]);
    assert_eq!(second.snapshot().ids(), vec![6, 5, 4, 1]);

    handler.delete(id, "alice").await.unwrap();
    sleep(Duration::from_secs(2)).await;
    assert_eq!(first.snapshot().ids(), vec![5, 4, 1]);
}

#[tokio::test(start_paused = true)]
async fn test_dispose_stops_triggers() {
    let gateway = alice_gateway();
    let events = HistoryEvents::new();
    let flags = Arc::new(InMemoryFlagStore::new());
    let sync = activated(&gateway).await;
    let started = Triggers::new()
        .broadcast(&events)
        .flag_store(flags.clone())
        .spawn(&sync);
    assert_eq!(started, 2);
    sleep(Duration::from_millis(10)).await;

    sync.dispose();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(events.subscriber_count(), 0);

    flags.write(RefreshFlag::raised_now()).unwrap();
    events.notify_changed();
    sleep(Duration::from_secs(10)).await;

    assert_eq!(gateway.list_calls(), 1);
    assert!(flags.read().unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_last_handle_stops_triggers() {
    let gateway = alice_gateway();
    let events = HistoryEvents::new();
    let sync = activated(&gateway).await;
    Triggers::new().broadcast(&events).spawn(&sync);
    let weak = sync.downgrade();

    drop(sync);
    sleep(Duration::from_millis(10)).await;
    assert!(weak.upgrade().is_none());
    assert_eq!(events.subscriber_count(), 0);

    events.notify_changed();
    sleep(Duration::from_secs(5)).await;
    assert_eq!(gateway.list_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_open_detail_leaves_state_alone() {
    let gateway = alice_gateway();
    let sync = activated(&gateway).await;
    let before = sync.snapshot();

    let detail = sync.open_detail(HistoryId::new(4)).await.unwrap();
    assert_eq!(detail.id, HistoryId::new(4));
    assert_eq!(detail.username, "alice");

    assert!(matches!(
        sync.open_detail(HistoryId::new(99)).await,
        Err(GatewayError::NotFound { .. })
    ));

    let after = sync.snapshot();
    assert_eq!(after.ids(), before.ids());
    assert_eq!(after.phase, before.phase);
    assert_eq!(after.last_success_at, before.last_success_at);
    assert_eq!(gateway.detail_calls(), 2);
}
