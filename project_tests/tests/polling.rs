//! Poll scheduler ticks, failure handling and the stale-result guard.

use std::sync::Arc;
use std::time::Duration;

use lib_dashboard::ingestors::{FetchError, SnapshotSource};
use lib_dashboard::{Category, PollScheduler, SyncSettings};
use project_tests::{healing_event, ids, pipeline_event, settle, GatedSource, Harness, ScriptedSource};

const INTERVAL: Duration = Duration::from_secs(10);

#[tokio::test(start_paused = true)]
async fn stop_discards_in_flight_fetch() {
    let harness = Harness::new(&SyncSettings::default());
    let source = GatedSource::new(Category::Pipeline, vec![pipeline_event(1, "acme/api", "main")]);
    let poller = PollScheduler::new(vec![source.clone() as Arc<dyn SnapshotSource>], harness.handle.clone());

    poller.start(INTERVAL);
    settle().await;
    assert_eq!(source.calls(), 1);

    poller.stop();
    source.release();
    settle().await;

    assert!(harness.view.snapshot(Category::Pipeline).is_empty());
    assert!(!poller.is_running());
}

#[tokio::test(start_paused = true)]
async fn tick_racing_a_stop_is_tagged_with_the_old_generation() {
    let harness = Harness::new(&SyncSettings::default());
    let source = ScriptedSource::new(
        Category::Pipeline,
        vec![Ok(Vec::new()), Ok(vec![pipeline_event(1, "acme/api", "main")])],
    );
    let poller = PollScheduler::new(vec![source.clone() as Arc<dyn SnapshotSource>], harness.handle.clone());

    poller.start(INTERVAL);
    settle().await;
    assert_eq!(source.calls(), 1);

    // The epoch moves on as `stop()` would, but the loop is still alive and
    // gets one more tick in before its cancellation.
    harness.handle.epoch().advance();
    poller.refresh_now();
    settle().await;

    assert_eq!(source.calls(), 2);
    assert!(harness.view.snapshot(Category::Pipeline).is_empty());
    poller.stop();
}

#[tokio::test(start_paused = true)]
async fn restart_merges_under_the_new_generation() {
    let harness = Harness::new(&SyncSettings::default());
    let source = ScriptedSource::new(Category::Pipeline, vec![Ok(vec![pipeline_event(1, "acme/api", "main")])]);
    let poller = PollScheduler::new(vec![source.clone() as Arc<dyn SnapshotSource>], harness.handle.clone());

    poller.start(INTERVAL);
    settle().await;
    poller.stop();
    harness.handle.reset(Category::Pipeline).await.unwrap();

    assert!(poller.start(INTERVAL));
    settle().await;
    assert_eq!(source.calls(), 2);
    assert_eq!(ids(&harness.view.snapshot(Category::Pipeline)), vec!["1"]);
    poller.stop();
}

#[tokio::test(start_paused = true)]
async fn released_fetch_is_merged_while_running() {
    let harness = Harness::new(&SyncSettings::default());
    let source = GatedSource::new(Category::Pipeline, vec![pipeline_event(1, "acme/api", "main")]);
    let poller = PollScheduler::new(vec![source.clone() as Arc<dyn SnapshotSource>], harness.handle.clone());

    poller.start(INTERVAL);
    settle().await;
    source.release();
    settle().await;

    assert_eq!(ids(&harness.view.snapshot(Category::Pipeline)), vec!["1"]);
    poller.stop();
}

#[tokio::test(start_paused = true)]
async fn failing_ticks_keep_previous_snapshot_and_keep_ticking() {
    let harness = Harness::new(&SyncSettings::default());
    let source = ScriptedSource::new(
        Category::Healing,
        vec![
            Ok(vec![healing_event(7, "acme/api")]),
            Err(FetchError::Status(500)),
            Err(FetchError::Transport("connection reset".into())),
        ],
    );
    let poller = PollScheduler::new(vec![source.clone() as Arc<dyn SnapshotSource>], harness.handle.clone());

    poller.start(INTERVAL);
    tokio::time::sleep(INTERVAL * 2 + Duration::from_millis(1)).await;

    assert_eq!(source.calls(), 3);
    assert!(poller.is_running());
    assert_eq!(ids(&harness.view.snapshot(Category::Healing)), vec!["7"]);
    poller.stop();
}

#[tokio::test(start_paused = true)]
async fn refresh_now_fetches_without_waiting_for_the_interval() {
    let harness = Harness::new(&SyncSettings::default());
    let source = ScriptedSource::new(Category::Pipeline, vec![Ok(Vec::new())]);
    let poller = PollScheduler::new(vec![source.clone() as Arc<dyn SnapshotSource>], harness.handle.clone());

    poller.start(INTERVAL);
    settle().await;
    assert_eq!(source.calls(), 1);

    poller.refresh_now();
    settle().await;
    assert_eq!(source.calls(), 2);
    poller.stop();
}

#[tokio::test(start_paused = true)]
async fn retarget_clears_old_scope_before_polling_new_sources() {
    let harness = Harness::new(&SyncSettings::default());
    let main = ScriptedSource::new(Category::Pipeline, vec![Ok(vec![pipeline_event(1, "acme/api", "main")])]);
    let poller = PollScheduler::new(vec![main.clone() as Arc<dyn SnapshotSource>], harness.handle.clone());

    poller.start(INTERVAL);
    settle().await;
    assert_eq!(ids(&harness.view.snapshot(Category::Pipeline)), vec!["1"]);

    let dev = ScriptedSource::new(Category::Pipeline, vec![Ok(vec![pipeline_event(2, "acme/api", "dev")])]);
    poller
        .retarget(vec![dev.clone() as Arc<dyn SnapshotSource>], &[Category::Pipeline], INTERVAL)
        .await;
    settle().await;

    assert_eq!(ids(&harness.view.snapshot(Category::Pipeline)), vec!["2"]);
    assert_eq!(main.calls(), 1);
    assert_eq!(dev.calls(), 1);
    poller.stop();
}

#[tokio::test(start_paused = true)]
async fn live_push_and_snapshot_reconcile_in_one_buffer() {
    let settings = SyncSettings {
        pipeline_capacity: 3,
        ..Default::default()
    };
    let harness = Harness::new(&settings);

    harness.handle.push_live(pipeline_event(5, "acme/api", "live")).await.unwrap();
    harness.handle.push_live(pipeline_event(4, "acme/api", "live")).await.unwrap();

    let source = ScriptedSource::new(
        Category::Pipeline,
        vec![Ok(vec![
            pipeline_event(5, "acme/api", "rest"),
            pipeline_event(3, "acme/api", "rest"),
            pipeline_event(2, "acme/api", "rest"),
            pipeline_event(1, "acme/api", "rest"),
        ])],
    );
    let poller = PollScheduler::new(vec![source as Arc<dyn SnapshotSource>], harness.handle.clone());
    poller.start(INTERVAL);
    settle().await;

    let merged = harness.view.snapshot(Category::Pipeline);
    assert_eq!(ids(&merged), vec!["4", "5", "3"]);
    assert_eq!(merged[1].payload.branch(), Some("live"));
    poller.stop();
}
