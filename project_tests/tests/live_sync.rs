//! Push frames flowing through the manager, router, store and registry.

use std::sync::Arc;
use std::time::Duration;

use lib_dashboard::ingestors::SnapshotSource;
use lib_dashboard::{Category, ConnectionManager, PollScheduler, SyncSettings, TopicRouter};
use project_tests::{
    ids, message_frame, pipeline_json, settle, Harness, MockConnector, Script, ScriptedSource,
};

const DELAY: Duration = Duration::from_millis(5000);

#[tokio::test(start_paused = true)]
async fn listener_only_sees_its_own_repository() {
    let harness = Harness::new(&SyncSettings::default());
    let mut repo_a = harness.registry.subscribe("org/repoA");

    let frames = vec![
        message_frame(Category::Pipeline, &pipeline_json(1, "org/repoB", "main")),
        message_frame(Category::Pipeline, &pipeline_json(2, "org/repoA", "main")),
    ];
    let manager = harness.manager(MockConnector::scripted(vec![Script::FramesThenHold(frames)]), DELAY);
    manager.connect();
    settle().await;

    let received = repo_a.recv().await.unwrap();
    assert_eq!(received.id.as_str(), "2");
    assert!(repo_a.try_recv().is_none());

    // Both still land in the global buffer.
    assert_eq!(ids(&harness.view.snapshot(Category::Pipeline)), vec!["2", "1"]);
    manager.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn events_without_repository_are_not_fanned_out() {
    let harness = Harness::new(&SyncSettings::default());
    let mut empty_key = harness.registry.subscribe("");

    let body = r#"{"sessionId":9,"repoName":"","healingStatus":"APPLIED"}"#;
    let frames = vec![message_frame(Category::Healing, body)];
    let manager = harness.manager(MockConnector::scripted(vec![Script::FramesThenHold(frames)]), DELAY);
    manager.connect();
    settle().await;

    assert_eq!(ids(&harness.view.snapshot(Category::Healing)), vec!["9"]);
    assert!(empty_key.try_recv().is_none());
    manager.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn duplicate_live_delivery_is_stored_once() {
    let harness = Harness::new(&SyncSettings::default());
    let mut repo_a = harness.registry.subscribe("org/repoA");
    let frame = message_frame(Category::Pipeline, &pipeline_json(3, "org/repoA", "main"));
    let manager = harness.manager(
        MockConnector::scripted(vec![Script::FramesThenHold(vec![frame.clone(), frame])]),
        DELAY,
    );
    manager.connect();
    settle().await;

    assert_eq!(ids(&harness.view.snapshot(Category::Pipeline)), vec!["3"]);
    assert_eq!(repo_a.try_recv().map(|e| e.id.as_str().to_string()), Some("3".to_string()));
    assert!(repo_a.try_recv().is_none());
    manager.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn live_healing_event_triggers_a_session_refresh() {
    let harness = Harness::new(&SyncSettings::default());
    let sessions = ScriptedSource::new(Category::Healing, vec![Ok(Vec::new())]);
    let poller = PollScheduler::new(vec![sessions.clone() as Arc<dyn SnapshotSource>], harness.handle.clone());

    let router = TopicRouter::new(harness.handle.clone(), harness.registry.clone())
        .with_refresh_trigger(Category::Healing, poller.refresh_trigger());
    let frames = vec![message_frame(
        Category::Healing,
        r#"{"sessionId":11,"repoName":"org/repoA","healingStatus":"FIX_GENERATED"}"#,
    )];
    let manager = ConnectionManager::new(
        MockConnector::scripted(vec![Script::FramesThenHold(frames)]),
        Arc::new(router),
        DELAY,
    );

    poller.start(Duration::from_secs(30));
    settle().await;
    assert_eq!(sessions.calls(), 1);

    manager.connect();
    settle().await;
    assert_eq!(sessions.calls(), 2);

    manager.disconnect().await;
    poller.stop();
}
