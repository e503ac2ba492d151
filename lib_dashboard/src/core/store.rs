//! # Event Store
//!
//! The single owner of every [`EventBuffer`]. Push delivery and periodic
//! snapshots never touch a buffer directly; they send a [`StoreCommand`] to
//! the store task through a bounded queue and the task applies commands one
//! at a time, in arrival order.
//!
//! After each applied command the affected category's merged view is
//! published as an `Arc<[Event]>` on a `watch` channel. Readers holding a
//! [`StoreView`] therefore always observe either the state before a merge or
//! the state after it.
//!
//! A live command may carry an acknowledgement channel. The store answers
//! `true` when the event was new and `false` when its id was already held,
//! so the caller can fan out accepted events only.
//!
//! Snapshot commands carry the poll [`Epoch`] captured when their fetch was
//! dispatched. A snapshot whose epoch is no longer current belongs to a
//! stopped poll cycle and is discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::configs::SyncSettings;
use crate::core::event_buffer::EventBuffer;
use crate::model::{Category, DashboardStats, Event, KnowledgeSnapshot};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    #[error("event store is no longer running")]
    Closed,
}

/// Generation counter of the poll cycle. Shared between the store and the
/// poll scheduler; advancing it invalidates every in-flight fetch.
#[derive(Debug, Clone, Default)]
pub struct Epoch(Arc<AtomicU64>);

impl Epoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Moves to the next generation and returns it.
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[derive(Debug)]
pub enum StoreCommand {
    /// A decoded push event, prepended to its category's live list. `ack`
    /// receives whether the event was accepted.
    Live {
        event: Event,
        ack: Option<oneshot::Sender<bool>>,
    },
    /// A REST snapshot for one category.
    Snapshot {
        category: Category,
        epoch: u64,
        items: Vec<Event>,
    },
    Stats {
        epoch: u64,
        stats: DashboardStats,
    },
    Knowledge {
        epoch: u64,
        snapshot: KnowledgeSnapshot,
    },
    /// Drops a category's live and historical entries.
    Reset(Category),
}

impl StoreCommand {
    /// A live command nobody waits on.
    pub fn live(event: Event) -> Self {
        StoreCommand::Live { event, ack: None }
    }
}

/// One value per category.
#[derive(Debug, Clone)]
struct PerCategory<T> {
    pipeline: T,
    healing: T,
    security: T,
}

impl<T> PerCategory<T> {
    fn build(mut f: impl FnMut(Category) -> T) -> Self {
        Self {
            pipeline: f(Category::Pipeline),
            healing: f(Category::Healing),
            security: f(Category::Security),
        }
    }

    fn get(&self, category: Category) -> &T {
        match category {
            Category::Pipeline => &self.pipeline,
            Category::Healing => &self.healing,
            Category::Security => &self.security,
        }
    }

    fn get_mut(&mut self, category: Category) -> &mut T {
        match category {
            Category::Pipeline => &mut self.pipeline,
            Category::Healing => &mut self.healing,
            Category::Security => &mut self.security,
        }
    }
}

pub struct EventStore {
    buffers: PerCategory<EventBuffer>,
    events_tx: PerCategory<watch::Sender<Arc<[Event]>>>,
    stats_tx: watch::Sender<Option<DashboardStats>>,
    knowledge_tx: watch::Sender<Option<KnowledgeSnapshot>>,
    rx: mpsc::Receiver<StoreCommand>,
    epoch: Epoch,
}

impl<A, B> PerCategory<(A, B)> {
    fn unzip(self) -> (PerCategory<A>, PerCategory<B>) {
        (
            PerCategory {
                pipeline: self.pipeline.0,
                healing: self.healing.0,
                security: self.security.0,
            },
            PerCategory {
                pipeline: self.pipeline.1,
                healing: self.healing.1,
                security: self.security.1,
            },
        )
    }
}

impl EventStore {
    /// Builds the store together with its write handle and read view. The
    /// store does nothing until [`EventStore::spawn`] or [`EventStore::apply`]
    /// is called.
    pub fn new(settings: &SyncSettings, epoch: Epoch) -> (Self, StoreHandle, StoreView) {
        let (tx, rx) = mpsc::channel(settings.command_queue_size.max(1));
        let buffers = PerCategory::build(|c| EventBuffer::new(c, settings.capacity(c)));

        let (events_tx, events_rx) =
            PerCategory::build(|_| watch::channel::<Arc<[Event]>>(Arc::from(Vec::new()))).unzip();
        let (stats_tx, stats_rx) = watch::channel(None);
        let (knowledge_tx, knowledge_rx) = watch::channel(None);

        let view = StoreView {
            events: events_rx,
            stats: stats_rx,
            knowledge: knowledge_rx,
        };

        let store = Self {
            buffers,
            events_tx,
            stats_tx,
            knowledge_tx,
            rx,
            epoch: epoch.clone(),
        };
        (store, StoreHandle { tx, epoch }, view)
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch.clone()
    }

    /// Applies one command. Returns `false` when the command was discarded
    /// or did not change the published state.
    pub fn apply(&mut self, command: StoreCommand) -> bool {
        match command {
            StoreCommand::Live { event, ack } => {
                let category = event.category;
                let id = event.id.clone();
                let accepted = self.buffers.get_mut(category).prepend(event);
                if accepted {
                    self.publish(category);
                } else {
                    log::debug!("Duplicate live {} event {} ignored", category, id);
                }
                if let Some(ack) = ack {
                    // The sender may have given up waiting; nothing to undo.
                    let _ = ack.send(accepted);
                }
                accepted
            }
            StoreCommand::Snapshot { category, epoch, items } => {
                if !self.is_current(epoch) {
                    log::debug!("Discarding stale {} snapshot from epoch {}", category, epoch);
                    return false;
                }
                self.buffers.get_mut(category).replace_historical(items);
                self.publish(category);
                true
            }
            StoreCommand::Stats { epoch, stats } => {
                if !self.is_current(epoch) {
                    return false;
                }
                self.stats_tx.send_replace(Some(stats));
                true
            }
            StoreCommand::Knowledge { epoch, snapshot } => {
                if !self.is_current(epoch) {
                    return false;
                }
                self.knowledge_tx.send_replace(Some(snapshot));
                true
            }
            StoreCommand::Reset(category) => {
                self.buffers.get_mut(category).reset();
                self.publish(category);
                true
            }
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        epoch == self.epoch.current()
    }

    fn publish(&self, category: Category) {
        let snapshot = self.buffers.get(category).snapshot();
        self.events_tx.get(category).send_replace(snapshot);
    }

    /// Processes commands until every [`StoreHandle`] has been dropped.
    pub async fn run(mut self) {
        log::info!("Event store started");
        while let Some(command) = self.rx.recv().await {
            self.apply(command);
        }
        log::info!("Event store stopped: all writers dropped");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

/// Write side of the store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
    epoch: Epoch,
}

impl StoreHandle {
    pub async fn send(&self, command: StoreCommand) -> Result<(), StoreError> {
        self.tx.send(command).await.map_err(|_| StoreError::Closed)
    }

    /// Queues a live event and waits for the store to apply it. Returns
    /// `false` when an event with the same id was already held.
    pub async fn push_live(&self, event: Event) -> Result<bool, StoreError> {
        let (ack, accepted) = oneshot::channel();
        self.send(StoreCommand::Live { event, ack: Some(ack) }).await?;
        accepted.await.map_err(|_| StoreError::Closed)
    }

    pub async fn submit_snapshot(
        &self,
        category: Category,
        epoch: u64,
        items: Vec<Event>,
    ) -> Result<(), StoreError> {
        self.send(StoreCommand::Snapshot { category, epoch, items }).await
    }

    pub async fn reset(&self, category: Category) -> Result<(), StoreError> {
        self.send(StoreCommand::Reset(category)).await
    }

    pub fn epoch(&self) -> &Epoch {
        &self.epoch
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Read side of the store. Every accessor returns an immutable snapshot.
#[derive(Debug, Clone)]
pub struct StoreView {
    events: PerCategory<watch::Receiver<Arc<[Event]>>>,
    stats: watch::Receiver<Option<DashboardStats>>,
    knowledge: watch::Receiver<Option<KnowledgeSnapshot>>,
}

impl StoreView {
    /// Current merged view of one category, newest first.
    pub fn snapshot(&self, category: Category) -> Arc<[Event]> {
        Arc::clone(&self.events.get(category).borrow())
    }

    /// Events of `category` scoped to a repository and optionally a branch.
    /// Entries without a branch are kept when filtering by branch.
    pub fn filtered(&self, category: Category, repo: Option<&str>, branch: Option<&str>) -> Vec<Event> {
        self.snapshot(category)
            .iter()
            .filter(|e| repo.map_or(true, |r| e.belongs_to_repo(r)))
            .filter(|e| match (branch, e.payload.branch()) {
                (Some(wanted), Some(actual)) => wanted == actual,
                _ => true,
            })
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> Option<DashboardStats> {
        self.stats.borrow().clone()
    }

    pub fn knowledge(&self) -> Option<KnowledgeSnapshot> {
        self.knowledge.borrow().clone()
    }

    /// Receiver that wakes on every publish for `category`.
    pub fn watch(&self, category: Category) -> watch::Receiver<Arc<[Event]>> {
        self.events.get(category).clone()
    }

    /// Waits until `category` is published again.
    pub async fn changed(&mut self, category: Category) -> Result<Arc<[Event]>, StoreError> {
        let rx = self.events.get_mut(category);
        rx.changed().await.map_err(|_| StoreError::Closed)?;
        let snapshot = Arc::clone(&rx.borrow_and_update());
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventPayload, HealingEvent, PipelineEvent};

    fn pipeline(id: i64, repo: &str, branch: &str) -> Event {
        let p: PipelineEvent = serde_json::from_value(
            serde_json::json!({"id": id, "repoName": repo, "branch": branch}),
        )
        .unwrap();
        Event::new(EventPayload::Pipeline(p))
    }

    fn healing(id: i64) -> Event {
        let h: HealingEvent = serde_json::from_value(serde_json::json!({"id": id})).unwrap();
        Event::new(EventPayload::Healing(h))
    }

    fn ids(events: &[Event]) -> Vec<&str> {
        events.iter().map(|e| e.id.as_str()).collect()
    }

    fn store() -> (EventStore, StoreHandle, StoreView) {
        EventStore::new(&SyncSettings::default(), Epoch::new())
    }

    #[test]
    fn live_and_snapshot_merge_per_category() {
        let (mut store, _handle, view) = store();
        store.apply(StoreCommand::live(pipeline(5, "acme/api", "main")));
        store.apply(StoreCommand::live(healing(1)));
        store.apply(StoreCommand::Snapshot {
            category: Category::Pipeline,
            epoch: 0,
            items: vec![pipeline(5, "acme/api", "old"), pipeline(4, "acme/api", "main")],
        });

        assert_eq!(ids(&view.snapshot(Category::Pipeline)), vec!["5", "4"]);
        assert_eq!(ids(&view.snapshot(Category::Healing)), vec!["1"]);
        assert!(view.snapshot(Category::Security).is_empty());
    }

    #[test]
    fn stale_epoch_snapshot_is_discarded() {
        let (mut store, handle, view) = store();
        let dispatched = handle.epoch().current();
        handle.epoch().advance();

        let applied = store.apply(StoreCommand::Snapshot {
            category: Category::Pipeline,
            epoch: dispatched,
            items: vec![pipeline(1, "acme/api", "main")],
        });
        assert!(!applied);
        assert!(view.snapshot(Category::Pipeline).is_empty());
    }

    #[test]
    fn repeated_live_id_is_rejected_and_acknowledged() {
        let (mut store, _handle, view) = store();
        assert!(store.apply(StoreCommand::live(pipeline(3, "acme/api", "main"))));

        let (ack, mut accepted) = oneshot::channel();
        let applied = store.apply(StoreCommand::Live {
            event: pipeline(3, "acme/api", "main"),
            ack: Some(ack),
        });
        assert!(!applied);
        assert_eq!(accepted.try_recv(), Ok(false));
        assert_eq!(view.snapshot(Category::Pipeline).len(), 1);
    }

    #[test]
    fn reset_clears_one_category() {
        let (mut store, _handle, view) = store();
        store.apply(StoreCommand::live(pipeline(1, "acme/api", "main")));
        store.apply(StoreCommand::live(healing(2)));
        store.apply(StoreCommand::Reset(Category::Pipeline));
        assert!(view.snapshot(Category::Pipeline).is_empty());
        assert_eq!(view.snapshot(Category::Healing).len(), 1);
    }

    #[test]
    fn filtered_scopes_by_repo_and_branch() {
        let (mut store, _handle, view) = store();
        store.apply(StoreCommand::live(pipeline(1, "acme/api", "main")));
        store.apply(StoreCommand::live(pipeline(2, "acme/web", "main")));
        store.apply(StoreCommand::live(pipeline(3, "acme/api", "dev")));

        let api = view.filtered(Category::Pipeline, Some("acme/api"), None);
        assert_eq!(ids(&api), vec!["3", "1"]);
        let api_main = view.filtered(Category::Pipeline, Some("acme/api"), Some("main"));
        assert_eq!(ids(&api_main), vec!["1"]);
    }

    #[tokio::test]
    async fn spawned_store_publishes_changes() {
        let (store, handle, mut view) = store();
        let task = store.spawn();

        assert!(handle.push_live(pipeline(1, "acme/api", "main")).await.unwrap());
        let published = view.changed(Category::Pipeline).await.unwrap();
        assert_eq!(ids(&published), vec!["1"]);

        assert!(!handle.push_live(pipeline(1, "acme/api", "dev")).await.unwrap());
        assert_eq!(ids(&view.snapshot(Category::Pipeline)), vec!["1"]);

        drop(handle);
        task.await.unwrap();
    }
}
