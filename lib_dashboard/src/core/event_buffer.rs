//! # Event Buffer
//!
//! Holds one category's events in two parts:
//!
//! - the **live** list, fed by push delivery through [`EventBuffer::prepend`];
//! - the **historical** list, the most recent REST snapshot, replaced
//!   wholesale by [`EventBuffer::replace_historical`].
//!
//! Readers only ever see the merged view: live entries first (newest first),
//! then historical entries whose id is not already live, capped at the
//! buffer capacity. On an id collision the live entry wins.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::model::{Category, Event, EventId};

/// Combines a live and a historical list into one ordered, id-unique list of
/// at most `capacity` entries. Live entries come first and win collisions.
pub fn merge(live: &[Event], historical: &[Event], capacity: usize) -> Vec<Event> {
    let mut seen: HashSet<&EventId> = HashSet::with_capacity(capacity);
    live.iter()
        .chain(historical.iter())
        .filter(|e| seen.insert(&e.id))
        .take(capacity)
        .cloned()
        .collect()
}

#[derive(Debug)]
pub struct EventBuffer {
    category: Category,
    capacity: usize,
    live: VecDeque<Event>,
    live_ids: HashSet<EventId>,
    historical: Vec<Event>,
}

impl EventBuffer {
    pub fn new(category: Category, capacity: usize) -> Self {
        Self {
            category,
            capacity,
            live: VecDeque::with_capacity(capacity),
            live_ids: HashSet::with_capacity(capacity),
            historical: Vec::new(),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Inserts a live event at the head.
    ///
    /// An id that is already live is kept where it is and the new copy is
    /// dropped; returns `false` in that case. The live list is trimmed from
    /// the tail once it exceeds the capacity.
    pub fn prepend(&mut self, event: Event) -> bool {
        if self.live_ids.contains(&event.id) {
            return false;
        }
        self.live_ids.insert(event.id.clone());
        self.live.push_front(event);
        while self.live.len() > self.capacity {
            if let Some(evicted) = self.live.pop_back() {
                self.live_ids.remove(&evicted.id);
            }
        }
        true
    }

    /// Replaces the historical part with a freshly fetched snapshot.
    pub fn replace_historical(&mut self, snapshot: Vec<Event>) {
        self.historical = snapshot;
    }

    /// Drops both live and historical entries.
    pub fn reset(&mut self) {
        self.live.clear();
        self.live_ids.clear();
        self.historical.clear();
    }

    /// Number of entries in the merged view.
    pub fn len(&self) -> usize {
        self.view().len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty() && self.historical.is_empty()
    }

    /// The merged, capacity-bounded view readers are allowed to see.
    pub fn view(&self) -> Vec<Event> {
        let (front, back) = self.live.as_slices();
        if back.is_empty() {
            merge(front, &self.historical, self.capacity)
        } else {
            let live: Vec<Event> = self.live.iter().cloned().collect();
            merge(&live, &self.historical, self.capacity)
        }
    }

    pub fn snapshot(&self) -> Arc<[Event]> {
        self.view().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventPayload, PipelineEvent};

    fn pipeline(id: i64, branch: &str) -> Event {
        let payload: PipelineEvent =
            serde_json::from_value(serde_json::json!({"id": id, "repoName": "acme/api", "branch": branch}))
                .unwrap();
        Event::new(EventPayload::Pipeline(payload))
    }

    fn ids(events: &[Event]) -> Vec<String> {
        events.iter().map(|e| e.id.to_string()).collect()
    }

    fn branch_of(e: &Event) -> Option<&str> {
        e.payload.branch()
    }

    #[test]
    fn prepend_is_newest_first_and_bounded() {
        let mut buf = EventBuffer::new(Category::Pipeline, 3);
        for id in 1..=5 {
            assert!(buf.prepend(pipeline(id, "main")));
        }
        assert_eq!(ids(&buf.view()), vec!["5", "4", "3"]);
    }

    #[test]
    fn prepend_keeps_first_seen_entry() {
        let mut buf = EventBuffer::new(Category::Pipeline, 10);
        buf.prepend(pipeline(1, "first"));
        buf.prepend(pipeline(2, "main"));
        assert!(!buf.prepend(pipeline(1, "second")));
        let view = buf.view();
        assert_eq!(ids(&view), vec!["2", "1"]);
        assert_eq!(branch_of(&view[1]), Some("first"));
    }

    #[test]
    fn evicted_id_can_be_inserted_again() {
        let mut buf = EventBuffer::new(Category::Pipeline, 1);
        buf.prepend(pipeline(1, "main"));
        buf.prepend(pipeline(2, "main"));
        assert!(buf.prepend(pipeline(1, "main")));
        assert_eq!(ids(&buf.view()), vec!["1"]);
    }

    #[test]
    fn merge_prefers_live_payload_and_caps_length() {
        let live = vec![pipeline(3, "live"), pipeline(2, "live")];
        let historical = vec![pipeline(2, "rest"), pipeline(1, "rest"), pipeline(0, "rest")];
        let merged = merge(&live, &historical, 3);
        assert_eq!(ids(&merged), vec!["3", "2", "1"]);
        assert_eq!(branch_of(&merged[1]), Some("live"));
    }

    #[test]
    fn merge_deduplicates_within_a_single_list() {
        let historical = vec![pipeline(1, "a"), pipeline(1, "b")];
        let merged = merge(&[], &historical, 10);
        assert_eq!(merged.len(), 1);
        assert_eq!(branch_of(&merged[0]), Some("a"));
    }

    #[test]
    fn snapshot_replacement_keeps_live_entries() {
        let mut buf = EventBuffer::new(Category::Pipeline, 50);
        buf.prepend(pipeline(9, "live"));
        buf.replace_historical(vec![pipeline(8, "rest"), pipeline(9, "rest")]);
        assert_eq!(ids(&buf.view()), vec!["9", "8"]);
        buf.replace_historical(vec![pipeline(7, "rest")]);
        assert_eq!(ids(&buf.view()), vec!["9", "7"]);
        buf.reset();
        assert!(buf.is_empty());
        assert_eq!(buf.len(), 0);
    }
}
