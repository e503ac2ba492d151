//! # Data Retrieval Module
//!
//! HTTP access to the dashboard backend.
//!
//! - **`http_client`**: a generic `ApiClient` built on `reqwest` and
//!   `reqwest-middleware`, retrying transient failures with exponential
//!   backoff and normalizing responses into an `ApiResponse`.
//! - **`dashboard_api`**: the typed endpoints the dashboard reads (events,
//!   healing sessions, security scans, statistics, knowledge base, fix plans,
//!   branches), mapping every failure onto a `FetchError`.

/// Generic HTTP client with retry middleware.
pub mod http_client;
/// Typed dashboard REST endpoints.
pub mod dashboard_api;

pub use dashboard_api::DashboardApi;
pub use http_client::{ApiClient, ApiResponse};
