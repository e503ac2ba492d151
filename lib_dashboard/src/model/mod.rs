//! # Dashboard Data Model
//!
//! Typed shapes for everything the dashboard receives from its collaborators:
//! push events (pipeline runs, healing sessions, security findings), REST
//! statistics, knowledge-base patterns and AI fix plans.
//!
//! Payloads are validated at the boundary into tagged enums instead of being
//! carried around as untyped JSON. Every optional field degrades to a safe
//! default so that a missing value never turns into an error downstream.

/// Push/poll events and the `Event` envelope stored in buffers.
pub mod events;
/// Fix plans and file changes consumed by the diff engine.
pub mod fixplan;
/// Healing session detail, audit trail and operator action answers.
pub mod healing;
/// Dashboard and knowledge-base statistics plus derived summaries.
pub mod stats;

pub use events::{
    Category, Event, EventId, EventPayload, FailureType, HealingEvent, HealingStatus,
    MissingPipelineId, PipelineEvent, PipelineStatus, ScanStatus, SecurityScan, Severity,
    UnknownCategory,
};
pub use fixplan::{ConfidenceBand, FileAction, FileChange, FixPlan};
pub use healing::{AuditAction, AuditEntry, HealingSessionDetail, RegenerateOutcome, SessionActionAck};
pub use stats::{
    DashboardStats, FailurePattern, FailureTypeCount, KnowledgeSnapshot, KnowledgeStats,
    SecurityStats, SeveritySummary,
};

use serde::{Deserialize, Deserializer};

/// Deserializes `null` the same way as an absent field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
