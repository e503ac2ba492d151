//! # Topic Router
//!
//! Turns raw push frames into typed [`Event`]s. For every `MESSAGE` frame the
//! router:
//!
//! 1. maps the `destination` header to a [`Category`];
//! 2. decodes the JSON body into that category's payload;
//! 3. forwards the event to the store, awaiting queue space so that
//!    per-topic arrival order is preserved;
//! 4. hands it to the listeners registered for its repository, unless the
//!    store already held its id.
//!
//! Malformed frames produce a [`RouteError`] and change nothing.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Notify;

use crate::core::registry::SubscriptionRegistry;
use crate::core::store::{StoreError, StoreHandle};
use crate::ingestors::stomp::{StompCommand, StompError, StompFrame};
use crate::model::{Category, Event, EventId, EventPayload};

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("malformed frame: {0}")]
    Frame(#[from] StompError),

    #[error("MESSAGE frame without a destination header")]
    MissingDestination,

    #[error("no category is bound to destination '{0}'")]
    UnknownDestination(String),

    #[error("invalid {category} payload: {source}")]
    Payload {
        category: Category,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// An event was stored and offered to `listeners` resource listeners.
    Routed {
        category: Category,
        id: EventId,
        listeners: usize,
    },
    /// The store already held this id; listeners were not notified.
    Duplicate { category: Category, id: EventId },
    Heartbeat,
    /// A well-formed frame that carries no event (`RECEIPT`, `CONNECTED`).
    Ignored(StompCommand),
    /// The broker reported an error; the session is no longer usable.
    BrokerError(String),
}

pub struct TopicRouter {
    store: StoreHandle,
    registry: SubscriptionRegistry,
    refresh_triggers: Vec<(Category, Arc<Notify>)>,
}

impl TopicRouter {
    pub fn new(store: StoreHandle, registry: SubscriptionRegistry) -> Self {
        Self {
            store,
            registry,
            refresh_triggers: Vec::new(),
        }
    }

    /// Wakes `trigger` whenever an event of `category` is routed. Used to ask
    /// the poller for an out-of-band snapshot, e.g. re-reading healing
    /// sessions after a live healing update.
    pub fn with_refresh_trigger(mut self, category: Category, trigger: Arc<Notify>) -> Self {
        self.refresh_triggers.push((category, trigger));
        self
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub async fn route(&self, raw: &str) -> Result<RouteOutcome, RouteError> {
        let Some(frame) = StompFrame::decode(raw)? else {
            return Ok(RouteOutcome::Heartbeat);
        };

        match frame.command {
            StompCommand::Message => {}
            StompCommand::Error => {
                let message = frame
                    .get("message")
                    .map(str::to_string)
                    .unwrap_or_else(|| frame.body.clone());
                return Ok(RouteOutcome::BrokerError(message));
            }
            other => return Ok(RouteOutcome::Ignored(other)),
        }

        let destination = frame.get("destination").ok_or(RouteError::MissingDestination)?;
        let category = Category::from_topic(destination)
            .ok_or_else(|| RouteError::UnknownDestination(destination.to_string()))?;
        let payload = EventPayload::from_json(category, &frame.body)
            .map_err(|source| RouteError::Payload { category, source })?;

        let event = Event::new(payload);
        let id = event.id.clone();
        let key = event.resource_key.clone();
        let accepted = self.store.push_live(event.clone()).await?;

        // Status updates reuse their session id, so a duplicate still asks
        // for a fresh snapshot.
        for (_, trigger) in self.refresh_triggers.iter().filter(|(c, _)| *c == category) {
            trigger.notify_one();
        }

        if !accepted {
            log::debug!("Skipping listeners for repeated {} event {}", category, id);
            return Ok(RouteOutcome::Duplicate { category, id });
        }

        let listeners = match key {
            Some(key) => self.registry.dispatch(&key, &Arc::new(event)),
            None => 0,
        };

        log::debug!("Routed {} event {} to {} listener(s)", category, id, listeners);
        Ok(RouteOutcome::Routed {
            category,
            id,
            listeners,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::SyncSettings;
    use crate::core::store::{Epoch, EventStore};

    fn message(destination: &str, body: &str) -> String {
        StompFrame::new(StompCommand::Message)
            .header("destination", destination)
            .header("subscription", "sub-0")
            .body(body)
            .encode()
    }

    fn router() -> (TopicRouter, EventStore, crate::core::StoreView) {
        let (store, handle, view) = EventStore::new(&SyncSettings::default(), Epoch::new());
        (TopicRouter::new(handle, SubscriptionRegistry::new(8)), store, view)
    }

    #[tokio::test]
    async fn routes_message_to_store_and_listener() {
        let (router, store, view) = router();
        let task = store.spawn();
        let mut sub = router.registry().subscribe("acme/api");
        let mut changes = view.watch(Category::Pipeline);

        let outcome = router
            .route(&message(
                "/topic/pipeline-events",
                r#"{"id":42,"repoName":"acme/api","branch":"main","status":"FAILED"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RouteOutcome::Routed {
                category: Category::Pipeline,
                id: EventId::from(42),
                listeners: 1
            }
        );
        assert_eq!(sub.recv().await.unwrap().id.as_str(), "42");

        changes.changed().await.unwrap();
        assert_eq!(view.snapshot(Category::Pipeline)[0].id.as_str(), "42");

        drop(router);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn repeated_message_reaches_listeners_once() {
        let (router, store, _view) = router();
        let _task = store.spawn();
        let mut sub = router.registry().subscribe("acme/api");
        let frame = message(
            "/topic/pipeline-events",
            r#"{"id":9,"repoName":"acme/api","branch":"main","status":"RUNNING"}"#,
        );

        let first = router.route(&frame).await.unwrap();
        assert!(matches!(first, RouteOutcome::Routed { listeners: 1, .. }));
        let second = router.route(&frame).await.unwrap();
        assert_eq!(
            second,
            RouteOutcome::Duplicate {
                category: Category::Pipeline,
                id: EventId::from(9)
            }
        );

        assert_eq!(sub.recv().await.unwrap().id.as_str(), "9");
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn malformed_frames_leave_state_untouched() {
        let (router, store, view) = router();

        let bad_json = router.route(&message("/topic/pipeline-events", "{not json")).await;
        assert!(matches!(bad_json, Err(RouteError::Payload { .. })));

        let no_id = router
            .route(&message("/topic/security-events", r#"{"repoName":"acme/api","critical":1}"#))
            .await;
        assert!(matches!(no_id, Err(RouteError::Payload { category: Category::Security, .. })));

        let unknown = router.route(&message("/topic/other", "{}")).await;
        assert!(matches!(unknown, Err(RouteError::UnknownDestination(_))));

        let garbage = router.route("NOT A FRAME\n\n\0").await;
        assert!(matches!(garbage, Err(RouteError::Frame(_))));

        // Drain whatever reached the queue before inspecting the view.
        drop(router);
        store.spawn().await.unwrap();
        assert!(view.snapshot(Category::Pipeline).is_empty());
        assert!(view.snapshot(Category::Security).is_empty());
    }

    #[tokio::test]
    async fn heartbeat_error_and_receipt_frames() {
        let (router, _store, _view) = router();
        assert_eq!(router.route("\n").await.unwrap(), RouteOutcome::Heartbeat);

        let receipt = StompFrame::new(StompCommand::Receipt).header("receipt-id", "1").encode();
        assert_eq!(
            router.route(&receipt).await.unwrap(),
            RouteOutcome::Ignored(StompCommand::Receipt)
        );

        let error = StompFrame::new(StompCommand::Error)
            .header("message", "session closed")
            .encode();
        assert_eq!(
            router.route(&error).await.unwrap(),
            RouteOutcome::BrokerError("session closed".to_string())
        );
    }

    #[tokio::test]
    async fn healing_event_wakes_refresh_trigger() {
        let (store, handle, _view) = EventStore::new(&SyncSettings::default(), Epoch::new());
        let _task = store.spawn();
        let trigger = Arc::new(Notify::new());
        let router = TopicRouter::new(handle, SubscriptionRegistry::new(8))
            .with_refresh_trigger(Category::Healing, Arc::clone(&trigger));

        router
            .route(&message("/topic/healing-events", r#"{"sessionId":7,"healingStatus":"APPLIED"}"#))
            .await
            .unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), trigger.notified())
            .await
            .unwrap();
    }
}
