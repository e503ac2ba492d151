//! # Configuration
//!
//! Runtime settings of the live-sync engine. Binaries layer these from
//! defaults, a JSON file and environment/CLI overrides; the library only
//! needs the resolved values.

/// Resolved settings consumed by the store, connection manager and poller.
pub mod settings;

pub use settings::{SettingsError, SyncSettings};
