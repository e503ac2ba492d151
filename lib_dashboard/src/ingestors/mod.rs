//! # Data Ingestors Module
//!
//! The two freshness paths that feed the event store.
//!
//! - **`connection`**: the `ConnectionManager`, owner of the single push
//!   session, with its reconnect loop and observable state.
//! - **`stomp`**: STOMP 1.2 frame codec used on the push channel.
//! - **`ws_stomp`** (feature `transport`): the WebSocket connector that
//!   performs the STOMP handshake and topic subscriptions.
//! - **`poller`**: the self-scheduling `PollScheduler` and the
//!   `SnapshotSource` seam it polls through.
//! - **`sources`** (feature `retrieve`): REST-backed snapshot sources.

/// Push session lifecycle and reconnect policy.
pub mod connection;
/// Periodic REST snapshot refresh.
pub mod poller;
/// STOMP frame encoding and decoding.
pub mod stomp;

/// REST-backed snapshot sources.
#[cfg(feature = "retrieve")]
pub mod sources;
/// STOMP-over-WebSocket connector.
#[cfg(feature = "transport")]
pub mod ws_stomp;

// --- Public API Re-exports ---
pub use connection::{ConnectionError, ConnectionManager, ConnectionState, Connector, FrameStream};
pub use poller::{FetchError, PollScheduler, Snapshot, SnapshotSource};
pub use stomp::{StompCommand, StompError, StompFrame};

#[cfg(feature = "retrieve")]
pub use sources::{dashboard_sources, Scope};
#[cfg(feature = "transport")]
pub use ws_stomp::WsStompConnector;
