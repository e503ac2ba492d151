use serde::{Deserialize, Serialize};

use super::null_as_default;
use super::{EventId, FailureType, HealingStatus};

/// Full record of one healing session, as returned by the session detail
/// endpoint. Richer than the [`HealingEvent`](super::HealingEvent) listing:
/// it carries the root cause, the attempt number and the operator feedback
/// that produced a regenerated fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealingSessionDetail {
    pub id: EventId,
    #[serde(default)]
    pub failure_type: Option<FailureType>,
    #[serde(default)]
    pub failure_summary: Option<String>,
    #[serde(default)]
    pub root_cause: Option<String>,
    #[serde(default)]
    pub fix_type: Option<String>,
    #[serde(default)]
    pub fix_explanation: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub confidence_score: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: HealingStatus,
    #[serde(default)]
    pub fix_branch: Option<String>,
    #[serde(default)]
    pub fix_commit_sha: Option<String>,
    #[serde(default = "first_attempt", deserialize_with = "attempt_or_first")]
    pub attempt_number: u32,
    #[serde(default)]
    pub user_feedback: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<String>,
}

fn first_attempt() -> u32 {
    1
}

fn attempt_or_first<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or_else(first_attempt))
}

/// Step recorded in a session's audit trail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    SessionCreated,
    FailureDetected,
    Classified,
    AnalysisStarted,
    AnalysisCompleted,
    FixGenerated,
    FixApproved,
    FixRejected,
    FixCommitted,
    FixApplied,
    FixRegenerated,
    PipelineRetried,
    PipelinePassed,
    PipelineFailed,
    Escalated,
    SecurityScanCompleted,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One row of a session's audit trail, oldest first.
///
/// The healing engine names the author `actor` and the text `notes`; older
/// producers use `performedBy` and `details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    #[serde(default)]
    pub id: Option<EventId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub action: AuditAction,
    #[serde(default, alias = "performedBy")]
    pub actor: Option<String>,
    #[serde(default, alias = "details")]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Backend acknowledgement of an approve or reject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionActionAck {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub session_id: Option<EventId>,
}

/// Answer to a regenerate request: the new session that will carry the
/// next fix attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateOutcome {
    #[serde(default)]
    pub status: String,
    pub new_session_id: EventId,
    #[serde(default)]
    pub parent_session_id: Option<EventId>,
    #[serde(default)]
    pub attempt_number: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_detail_defaults_to_first_attempt() {
        let detail: HealingSessionDetail = serde_json::from_str(
            r#"{"id":4,"status":"PENDING_APPROVAL","rootCause":"missing import","attemptNumber":null}"#,
        )
        .unwrap();
        assert_eq!(detail.id, EventId::from(4));
        assert_eq!(detail.status, HealingStatus::PendingApproval);
        assert_eq!(detail.attempt_number, 1);
        assert_eq!(detail.root_cause.as_deref(), Some("missing import"));
    }

    #[test]
    fn audit_entries_accept_both_field_spellings() {
        let entries: Vec<AuditEntry> = serde_json::from_str(
            r#"[
                {"id":1,"action":"FIX_GENERATED","actor":"AI","notes":"2 files","createdAt":"2025-01-01T00:00:00Z"},
                {"action":"FIX_APPROVED","performedBy":"dev@acme.io","details":"looks good"},
                {"action":"SOMETHING_NEW"}
            ]"#,
        )
        .unwrap();
        assert_eq!(entries[0].action, AuditAction::FixGenerated);
        assert_eq!(entries[0].notes.as_deref(), Some("2 files"));
        assert_eq!(entries[1].actor.as_deref(), Some("dev@acme.io"));
        assert_eq!(entries[1].notes.as_deref(), Some("looks good"));
        assert_eq!(entries[2].action, AuditAction::Unknown);
    }
}
