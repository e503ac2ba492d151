//! # lib_dashboard
//!
//! Live-sync core of the pipeline healing dashboard. The crate keeps the
//! operator's view of pipeline runs, healing sessions and security scans
//! current by merging two freshness paths:
//!
//! - **push**: a long-lived STOMP subscription (`ingestors::connection`,
//!   `ingestors::ws_stomp`) whose frames are decoded and fanned out by the
//!   `core::router::TopicRouter`;
//! - **poll**: periodic REST snapshots (`ingestors::poller`,
//!   `retrieve::dashboard_api`) merged into the same buffers.
//!
//! Both paths write through a single reconciliation task
//! (`core::store::EventStore`) that owns the capacity-bounded, id-deduplicated
//! `core::event_buffer::EventBuffer`s and publishes immutable snapshots.
//! The `diff` module renders proposed file changes as line-level edit scripts.
//!
//! Modules are gated by cargo features the same way across the workspace:
//! `stream` (buffers, router, manager, scheduler), `retrieve` (REST client),
//! `transport` (WebSocket push channel). `model`, `diff` and `configs` are
//! always available.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod configs;
pub mod diff;
pub mod model;

#[cfg(feature = "stream")]
pub mod core;
#[cfg(feature = "stream")]
pub mod ingestors;
#[cfg(feature = "retrieve")]
pub mod retrieve;

// --- Public API Re-exports ---
pub use configs::SyncSettings;
pub use diff::{compute_diff, DiffKind, DiffLine, DiffSummary};
pub use model::{Category, Event, EventId, EventPayload};

#[cfg(feature = "stream")]
pub use crate::core::{EventStore, StoreHandle, StoreView, SubscriptionRegistry, TopicRouter};
#[cfg(feature = "stream")]
pub use ingestors::{ConnectionManager, ConnectionState, PollScheduler};
