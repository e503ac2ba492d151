//! # Core Reconciliation Module
//!
//! The components that own and distribute dashboard state:
//!
//! - **`event_buffer`**: capacity-bounded, newest-first, id-deduplicated lists
//!   per category, combining live entries with the last REST snapshot.
//! - **`registry`**: per-resource listener table. Each listener is a bounded
//!   queue; the key entry disappears with its last listener.
//! - **`store`**: the single task that owns every buffer. Push and poll paths
//!   send it commands; readers get immutable snapshots through `watch`
//!   channels, so a half-applied merge is never observable.
//! - **`router`**: decodes inbound push frames into typed events, forwards
//!   them to the store and fans them out to resource listeners.

/// Bounded, deduplicated event lists.
pub mod event_buffer;
/// Resource-scoped listener table.
pub mod registry;
/// Reconciliation task and its read/write handles.
pub mod store;
/// Push frame decoding and fan-out.
pub mod router;

// --- Public API Re-exports ---
pub use event_buffer::{merge, EventBuffer};
pub use registry::{Subscription, SubscriptionRegistry};
pub use router::{RouteError, RouteOutcome, TopicRouter};
pub use store::{Epoch, EventStore, StoreCommand, StoreError, StoreHandle, StoreView};
