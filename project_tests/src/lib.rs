//! # Test Fixtures
//!
//! Shared doubles for the integration tests under `tests/`:
//!
//! - [`MockConnector`]: a push connector driven by a script of per-attempt
//!   outcomes, recording the instant of every attempt.
//! - [`GatedSource`] and [`ScriptedSource`]: snapshot sources whose results
//!   are held back or sequenced by the test.
//! - [`Harness`]: a running store with its router and registry.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{stream, FutureExt, StreamExt};
use lib_dashboard::core::store::Epoch;
use lib_dashboard::ingestors::stomp::{StompCommand, StompFrame};
use lib_dashboard::ingestors::{
    ConnectionError, ConnectionManager, Connector, FetchError, FrameStream, Snapshot, SnapshotSource,
};
use lib_dashboard::{
    Category, Event, EventPayload, EventStore, StoreHandle, StoreView, SubscriptionRegistry,
    SyncSettings, TopicRouter,
};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

// --- Sample data ---

pub fn pipeline_json(id: i64, repo: &str, branch: &str) -> String {
    serde_json::json!({
        "id": id,
        "repoName": repo,
        "branch": branch,
        "status": "FAILED",
        "failureType": "TEST_FAILURE"
    })
    .to_string()
}

pub fn pipeline_event(id: i64, repo: &str, branch: &str) -> Event {
    let payload = EventPayload::from_json(Category::Pipeline, &pipeline_json(id, repo, branch))
        .expect("valid pipeline payload");
    Event::new(payload)
}

pub fn healing_event(id: i64, repo: &str) -> Event {
    let body = serde_json::json!({
        "sessionId": id,
        "repoName": repo,
        "healingStatus": "ANALYZING",
        "confidence": 0.4
    })
    .to_string();
    Event::new(EventPayload::from_json(Category::Healing, &body).expect("valid healing payload"))
}

/// A STOMP `MESSAGE` frame as the broker would deliver it.
pub fn message_frame(category: Category, body: &str) -> String {
    StompFrame::new(StompCommand::Message)
        .header("destination", category.topic())
        .header("subscription", "sub-0")
        .header("content-type", "application/json")
        .body(body)
        .encode()
}

pub fn ids(events: &[Event]) -> Vec<String> {
    events.iter().map(|e| e.id.to_string()).collect()
}

// --- Store harness ---

pub struct Harness {
    pub handle: StoreHandle,
    pub view: StoreView,
    pub registry: SubscriptionRegistry,
    pub router: Arc<TopicRouter>,
    pub store_task: JoinHandle<()>,
}

impl Harness {
    pub fn new(settings: &SyncSettings) -> Self {
        let (store, handle, view) = EventStore::new(settings, Epoch::new());
        let store_task = store.spawn();
        let registry = SubscriptionRegistry::new(settings.listener_queue_size);
        let router = Arc::new(TopicRouter::new(handle.clone(), registry.clone()));
        Self {
            handle,
            view,
            registry,
            router,
            store_task,
        }
    }

    pub fn manager(&self, connector: Arc<dyn Connector>, delay: Duration) -> ConnectionManager {
        ConnectionManager::new(connector, Arc::clone(&self.router), delay)
    }
}

// --- Push connector double ---

/// Outcome of one connection attempt.
pub enum Script {
    /// The attempt fails with a transport error.
    Fail,
    /// The connector panics while building the channel.
    Panic,
    /// The session delivers these frames and then closes.
    Frames(Vec<String>),
    /// The session delivers these frames and then stays open.
    FramesThenHold(Vec<String>),
}

pub struct MockConnector {
    attempts: Mutex<Vec<Instant>>,
    script: Mutex<VecDeque<Script>>,
}

impl MockConnector {
    /// Every attempt follows `script` in order; once it runs out, attempts fail.
    pub fn scripted(script: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            attempts: Mutex::new(Vec::new()),
            script: Mutex::new(script.into()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Self::scripted(Vec::new())
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }

    /// Gaps between consecutive attempts.
    pub fn attempt_gaps(&self) -> Vec<Duration> {
        self.attempts()
            .windows(2)
            .map(|w| w[1].duration_since(w[0]))
            .collect()
    }
}

impl Connector for MockConnector {
    fn open(&self) -> BoxFuture<'static, Result<FrameStream, ConnectionError>> {
        self.attempts.lock().unwrap().push(Instant::now());
        let step = self.script.lock().unwrap().pop_front().unwrap_or(Script::Fail);
        match step {
            Script::Panic => panic!("connector blew up"),
            Script::Fail => async { Err(ConnectionError::Transport("connection refused".into())) }.boxed(),
            Script::Frames(frames) => {
                let s = stream::iter(frames.into_iter().map(Ok));
                async move { Ok(s.boxed()) }.boxed()
            }
            Script::FramesThenHold(frames) => {
                let s = stream::iter(frames.into_iter().map(Ok)).chain(stream::pending());
                async move { Ok(s.boxed()) }.boxed()
            }
        }
    }
}

// --- Snapshot source doubles ---

/// Holds every fetch until the test opens the gate.
pub struct GatedSource {
    category: Category,
    items: Vec<Event>,
    gate: Arc<Notify>,
    calls: Arc<AtomicUsize>,
}

impl GatedSource {
    pub fn new(category: Category, items: Vec<Event>) -> Arc<Self> {
        Arc::new(Self {
            category,
            items,
            gate: Arc::new(Notify::new()),
            calls: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Lets every waiting fetch complete.
    pub fn release(&self) {
        self.gate.notify_waiters();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SnapshotSource for GatedSource {
    fn name(&self) -> &str {
        "gated"
    }

    fn fetch(&self) -> BoxFuture<'static, Result<Snapshot, FetchError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = Arc::clone(&self.gate);
        let category = self.category;
        let items = self.items.clone();
        async move {
            gate.notified().await;
            Ok(Snapshot::Events { category, items })
        }
        .boxed()
    }
}

/// Answers each fetch with the next scripted result; repeats the last one.
pub struct ScriptedSource {
    category: Category,
    results: Mutex<VecDeque<Result<Vec<Event>, FetchError>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(category: Category, results: Vec<Result<Vec<Event>, FetchError>>) -> Arc<Self> {
        Arc::new(Self {
            category,
            results: Mutex::new(results.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SnapshotSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fetch(&self) -> BoxFuture<'static, Result<Snapshot, FetchError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut results = self.results.lock().unwrap();
        let next = if results.len() > 1 {
            results.pop_front()
        } else {
            results.front().cloned()
        };
        let category = self.category;
        let outcome = next
            .unwrap_or(Err(FetchError::Status(503)))
            .map(|items| Snapshot::Events { category, items });
        async move { outcome }.boxed()
    }
}

/// Lets spawned tasks run until the paused clock would have to advance.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
