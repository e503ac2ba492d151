//! # Connection Manager
//!
//! Owns the single push-channel session of the process and keeps it alive.
//!
//! ## Lifecycle
//! - `connect()` starts the session loop unless one is already running, so
//!   concurrent callers share one session.
//! - The loop opens a channel through its [`Connector`], feeds every inbound
//!   frame to the [`TopicRouter`], and when the channel fails or closes waits
//!   `reconnect_delay` before the next attempt. It never gives up on its own.
//! - `disconnect()` cancels the pending reconnect timer and tears the session
//!   down. It is idempotent.
//!
//! Every attempt, including one whose connector panics while building the
//! channel, ends in a state transition followed by a scheduled retry.
//!
//! The latest state is kept on a `watch` channel for readers that only care
//! about "now". Transitions are also published on a `broadcast` channel, so
//! a listener sees CONNECTING even when the attempt fails right after.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::router::{RouteError, RouteOutcome, TopicRouter};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("invalid push endpoint '{0}'")]
    InvalidUrl(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("handshake rejected: {0}")]
    Handshake(String),

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("channel closed by peer")]
    Closed,

    #[error("broker error: {0}")]
    Broker(String),

    #[error("connector panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Inbound text frames of one open session.
pub type FrameStream = BoxStream<'static, Result<String, ConnectionError>>;

/// Opens push-channel sessions. The returned stream ends (or yields an
/// error) when the session is lost.
pub trait Connector: Send + Sync + 'static {
    fn open(&self) -> BoxFuture<'static, Result<FrameStream, ConnectionError>>;
}

/// Queued transitions per state listener before it starts lagging.
const TRANSITION_QUEUE: usize = 64;

/// Publishes connection state: the current value and every transition.
struct StatePublisher {
    current: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<ConnectionState>,
}

impl StatePublisher {
    fn new() -> Self {
        let (current, _) = watch::channel(ConnectionState::Disconnected);
        let (transitions, _) = broadcast::channel(TRANSITION_QUEUE);
        Self { current, transitions }
    }

    /// Records `state`. Repeating the current state is not a transition.
    fn set(&self, state: ConnectionState) {
        let changed = self.current.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
        if changed {
            // No listener registered is fine.
            let _ = self.transitions.send(state);
        }
    }
}

struct ActiveSession {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    router: Arc<TopicRouter>,
    reconnect_delay: Duration,
    state: Arc<StatePublisher>,
    session: Mutex<Option<ActiveSession>>,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        router: Arc<TopicRouter>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            connector,
            router,
            reconnect_delay,
            state: Arc::new(StatePublisher::new()),
            session: Mutex::new(None),
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the session loop. Returns `false` if one is already running.
    pub fn connect(&self) -> bool {
        let mut session = self.lock_session();
        if session.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            log::debug!("Push channel already active, connect() ignored");
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_session_loop(
            Arc::clone(&self.connector),
            Arc::clone(&self.router),
            Arc::clone(&self.state),
            self.reconnect_delay,
            cancel.clone(),
        ));
        *session = Some(ActiveSession { cancel, handle });
        true
    }

    /// Stops the session loop and any pending reconnect. Safe to call when
    /// nothing is running.
    pub async fn disconnect(&self) {
        let active = self.lock_session().take();
        if let Some(active) = active {
            active.cancel.cancel();
            if let Err(e) = active.handle.await {
                log::error!("Push session task ended abnormally: {}", e);
            }
            log::info!("Push channel disconnected");
        }
        self.state.set(ConnectionState::Disconnected);
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.state.current.borrow()
    }

    /// Latest state only; intermediate transitions may be skipped.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.current.subscribe()
    }

    /// Every transition from now on, in order.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<ConnectionState> {
        self.state.transitions.subscribe()
    }

    /// Calls `callback` on every state transition, in order, until the
    /// manager is dropped or the returned task is aborted.
    pub fn on_state_change<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: Fn(ConnectionState) + Send + 'static,
    {
        let mut rx = self.subscribe_transitions();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(state) => callback(state),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("State listener fell behind, {} transition(s) skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn is_running(&self) -> bool {
        self.lock_session()
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(active) = self.lock_session().take() {
            active.cancel.cancel();
        }
    }
}

enum SessionEnd {
    Cancelled,
    Closed,
    Failed(ConnectionError),
}

async fn run_session_loop(
    connector: Arc<dyn Connector>,
    router: Arc<TopicRouter>,
    state: Arc<StatePublisher>,
    reconnect_delay: Duration,
    cancel: CancellationToken,
) {
    let set_state = |s: ConnectionState| state.set(s);

    loop {
        set_state(ConnectionState::Connecting);
        log::info!("Opening push channel");

        let attempt_connector = Arc::clone(&connector);
        let attempt = AssertUnwindSafe(async move { attempt_connector.open().await }).catch_unwind();
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = attempt => result,
        };

        match opened {
            Ok(Ok(frames)) => {
                set_state(ConnectionState::Connected);
                log::info!("Push channel connected");
                match pump(frames, &router, &cancel).await {
                    SessionEnd::Cancelled => break,
                    SessionEnd::Closed => {
                        log::warn!("Push channel closed by remote host");
                        set_state(ConnectionState::Disconnected);
                    }
                    SessionEnd::Failed(e) => {
                        log::error!("Push channel failed: {}", e);
                        set_state(ConnectionState::Error);
                    }
                }
            }
            Ok(Err(e)) => {
                log::error!("Failed to open push channel: {}", e);
                set_state(ConnectionState::Error);
            }
            Err(panic) => {
                let e = ConnectionError::Panicked(panic_message(panic.as_ref()));
                log::error!("Failed to open push channel: {}", e);
                set_state(ConnectionState::Error);
            }
        }

        log::info!("Reconnecting in {}ms", reconnect_delay.as_millis());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }

    set_state(ConnectionState::Disconnected);
}

async fn pump(mut frames: FrameStream, router: &TopicRouter, cancel: &CancellationToken) -> SessionEnd {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            next = frames.next() => next,
        };

        match next {
            Some(Ok(raw)) => match router.route(&raw).await {
                Ok(RouteOutcome::BrokerError(message)) => {
                    return SessionEnd::Failed(ConnectionError::Broker(message));
                }
                Ok(_) => {}
                Err(RouteError::Store(e)) => {
                    return SessionEnd::Failed(ConnectionError::Transport(e.to_string()));
                }
                Err(e) => log::warn!("Dropping inbound frame: {}", e),
            },
            Some(Err(e)) => return SessionEnd::Failed(e),
            None => return SessionEnd::Closed,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
