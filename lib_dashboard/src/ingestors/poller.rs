//! # Poll Scheduler
//!
//! Self-scheduling refresh of REST snapshots. On every tick (and on every
//! out-of-band [`PollScheduler::refresh_now`]) each registered
//! [`SnapshotSource`] is fetched in its own task, so a slow endpoint never
//! delays the others or the next tick.
//!
//! `start()` moves the poll [`Epoch`] to a fresh generation and the tick loop
//! tags every fetch it dispatches with that generation. `stop()` advances
//! the epoch again, so anything the stopped loop dispatched, even a tick
//! that raced with the stop, is discarded instead of merged.
//!
//! A failed fetch is logged and skipped. The previous snapshot stays in
//! place and the next tick tries again.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::core::store::{Epoch, StoreCommand, StoreHandle};
use crate::model::{Category, DashboardStats, Event, KnowledgeSnapshot};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),

    /// Non-2xx answer. Treated as "no data" for this cycle.
    #[error("server answered with status {0}")]
    Status(u16),

    #[error("could not decode response: {0}")]
    Decode(String),
}

/// Result of one successful fetch.
#[derive(Debug, Clone)]
pub enum Snapshot {
    Events { category: Category, items: Vec<Event> },
    Stats(DashboardStats),
    Knowledge(KnowledgeSnapshot),
}

impl Snapshot {
    fn into_command(self, epoch: u64) -> StoreCommand {
        match self {
            Snapshot::Events { category, items } => StoreCommand::Snapshot { category, epoch, items },
            Snapshot::Stats(stats) => StoreCommand::Stats { epoch, stats },
            Snapshot::Knowledge(snapshot) => StoreCommand::Knowledge { epoch, snapshot },
        }
    }
}

/// One REST endpoint polled by the scheduler.
pub trait SnapshotSource: Send + Sync + 'static {
    /// Short label used in log lines.
    fn name(&self) -> &str;

    fn fetch(&self) -> BoxFuture<'static, Result<Snapshot, FetchError>>;
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct PollScheduler {
    sources: Arc<Mutex<Vec<Arc<dyn SnapshotSource>>>>,
    store: StoreHandle,
    epoch: Epoch,
    refresh: Arc<Notify>,
    running: Mutex<Option<Running>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PollScheduler {
    pub fn new(sources: Vec<Arc<dyn SnapshotSource>>, store: StoreHandle) -> Self {
        let epoch = store.epoch().clone();
        Self {
            sources: Arc::new(Mutex::new(sources)),
            store,
            epoch,
            refresh: Arc::new(Notify::new()),
            running: Mutex::new(None),
        }
    }

    /// Begins periodic refresh. The first tick fires immediately. Returns
    /// `false` if the scheduler is already running.
    pub fn start(&self, interval: Duration) -> bool {
        let mut running = lock(&self.running);
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return false;
        }

        let generation = self.epoch.advance();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(tick_loop(
            Arc::clone(&self.sources),
            self.store.clone(),
            self.epoch.clone(),
            generation,
            Arc::clone(&self.refresh),
            interval,
            cancel.clone(),
        ));
        log::info!(
            "Poll scheduler started, interval {}ms, generation {}",
            interval.as_millis(),
            generation
        );
        *running = Some(Running { cancel, handle });
        true
    }

    /// Stops the tick loop and invalidates every in-flight fetch.
    pub fn stop(&self) {
        self.epoch.advance();
        if let Some(running) = lock(&self.running).take() {
            running.cancel.cancel();
            log::info!("Poll scheduler stopped");
        }
    }

    /// Requests an immediate tick without waiting for the interval.
    pub fn refresh_now(&self) {
        self.refresh.notify_one();
    }

    /// Handle that triggers [`PollScheduler::refresh_now`] when notified.
    pub fn refresh_trigger(&self) -> Arc<Notify> {
        Arc::clone(&self.refresh)
    }

    pub fn set_sources(&self, sources: Vec<Arc<dyn SnapshotSource>>) {
        *lock(&self.sources) = sources;
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running)
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Points the scheduler at new sources, e.g. after the branch filter
    /// changed: stops the current cycle, clears `reset` categories so no
    /// entry from the old scope survives, then starts again.
    pub async fn retarget(
        &self,
        sources: Vec<Arc<dyn SnapshotSource>>,
        reset: &[Category],
        interval: Duration,
    ) {
        self.stop();
        for category in reset {
            if let Err(e) = self.store.reset(*category).await {
                log::error!("Could not reset {} events: {}", category, e);
            }
        }
        self.set_sources(sources);
        self.start(interval);
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        if let Some(running) = lock(&self.running).take() {
            running.cancel.cancel();
        }
    }
}

async fn tick_loop(
    sources: Arc<Mutex<Vec<Arc<dyn SnapshotSource>>>>,
    store: StoreHandle,
    epoch: Epoch,
    generation: u64,
    refresh: Arc<Notify>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            _ = refresh.notified() => log::debug!("Out-of-band refresh requested"),
        }

        let batch: Vec<_> = lock(&sources).clone();
        for source in batch {
            tokio::spawn(fetch_one(source, store.clone(), epoch.clone(), generation));
        }
    }
}

async fn fetch_one(source: Arc<dyn SnapshotSource>, store: StoreHandle, epoch: Epoch, dispatched: u64) {
    match source.fetch().await {
        Ok(snapshot) => {
            if epoch.current() != dispatched {
                log::debug!("Discarding {} result from stopped cycle {}", source.name(), dispatched);
                return;
            }
            if let Err(e) = store.send(snapshot.into_command(dispatched)).await {
                log::error!("Could not deliver {} snapshot: {}", source.name(), e);
            }
        }
        Err(e) => {
            log::warn!("Poll of {} failed: {}. Keeping previous data.", source.name(), e);
        }
    }
}
