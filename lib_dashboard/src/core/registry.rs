//! # Subscription Registry
//!
//! Maps a resource key (repository full name) to the listeners interested in
//! it. A listener is the receiving end of a bounded queue; dispatch never
//! blocks, and a listener whose queue is full misses that event rather than
//! stalling the router.
//!
//! A key is present only while it has at least one listener.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::model::Event;

pub type ListenerId = u64;

#[derive(Debug)]
struct Listener {
    id: ListenerId,
    tx: mpsc::Sender<Arc<Event>>,
}

#[derive(Debug, Default)]
struct Table {
    next_id: ListenerId,
    by_key: HashMap<String, Vec<Listener>>,
}

#[derive(Debug, Clone)]
pub struct SubscriptionRegistry {
    table: Arc<Mutex<Table>>,
    queue_size: usize,
}

impl SubscriptionRegistry {
    pub fn new(queue_size: usize) -> Self {
        Self {
            table: Arc::new(Mutex::new(Table::default())),
            queue_size: queue_size.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new listener for `key`. Dropping the returned
    /// [`Subscription`] removes it again.
    pub fn subscribe(&self, key: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.queue_size);
        let mut table = self.lock();
        table.next_id += 1;
        let id = table.next_id;
        table
            .by_key
            .entry(key.to_string())
            .or_default()
            .push(Listener { id, tx });
        log::debug!("Listener {} subscribed to {}", id, key);

        Subscription {
            key: key.to_string(),
            id,
            rx,
            registry: Some(self.clone()),
        }
    }

    /// Removes one listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, key: &str, id: ListenerId) -> bool {
        let mut table = self.lock();
        let Some(listeners) = table.by_key.get_mut(key) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            table.by_key.remove(key);
            log::debug!("Last listener left {}", key);
        }
        removed
    }

    /// Delivers `event` to every listener of `key` and returns how many
    /// accepted it. Listeners whose receiver is gone are pruned.
    pub fn dispatch(&self, key: &str, event: &Arc<Event>) -> usize {
        let mut table = self.lock();
        let Some(listeners) = table.by_key.get_mut(key) else {
            return 0;
        };

        let mut delivered = 0;
        listeners.retain(|l| match l.tx.try_send(Arc::clone(event)) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                log::warn!("Listener {} on {} is lagging, dropped event {}", l.id, key, event.id);
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });

        if listeners.is_empty() {
            table.by_key.remove(key);
        }
        delivered
    }

    pub fn listener_count(&self, key: &str) -> usize {
        self.lock().by_key.get(key).map_or(0, Vec::len)
    }

    /// Number of keys with at least one listener.
    pub fn key_count(&self) -> usize {
        self.lock().by_key.len()
    }
}

/// A live registration returned by [`SubscriptionRegistry::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    key: String,
    id: ListenerId,
    rx: mpsc::Receiver<Arc<Event>>,
    registry: Option<SubscriptionRegistry>,
}

impl Subscription {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Waits for the next event for this key. Returns `None` once the
    /// subscription has been removed.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        self.rx.try_recv().ok()
    }

    /// Removes the listener. Calling it more than once is harmless.
    pub fn unsubscribe(&mut self) {
        if let Some(registry) = self.registry.take() {
            registry.unsubscribe(&self.key, self.id);
            self.rx.close();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
