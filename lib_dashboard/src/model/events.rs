use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use super::null_as_default;

/// Identity of an event within its category.
///
/// The backend emits numeric ids for persisted records; other producers may
/// send strings. Both are normalized to their decimal/string form so that a
/// live message and a REST record for the same row compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for EventId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Signed(i64),
            Unsigned(u64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Signed(n) => Self(n.to_string()),
            RawId::Unsigned(n) => Self(n.to_string()),
            RawId::Text(s) => Self(s),
        })
    }
}

/// The three event streams the dashboard tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Pipeline,
    Healing,
    Security,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown event category '{0}'")]
pub struct UnknownCategory(pub String);

impl Category {
    pub const ALL: [Category; 3] = [Category::Pipeline, Category::Healing, Category::Security];

    /// Push-channel destination carrying this category.
    pub fn topic(self) -> &'static str {
        match self {
            Category::Pipeline => "/topic/pipeline-events",
            Category::Healing => "/topic/healing-events",
            Category::Security => "/topic/security-events",
        }
    }

    pub fn from_topic(destination: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.topic() == destination)
    }

    /// Buffer capacity used when no override is configured.
    pub fn default_capacity(self) -> usize {
        match self {
            Category::Pipeline | Category::Healing => 50,
            Category::Security => 200,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Pipeline => "pipeline",
            Category::Healing => "healing",
            Category::Security => "security",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pipeline" | "pipeline-events" => Ok(Category::Pipeline),
            "healing" | "healing-events" | "healing-sessions" => Ok(Category::Healing),
            "security" | "security-events" | "security-scans" => Ok(Category::Security),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    Queued,
    Running,
    Success,
    Failed,
    Healing,
    Healed,
    Escalated,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealingStatus {
    Analyzing,
    FixGenerated,
    PendingApproval,
    Approved,
    Rejected,
    Applying,
    Applied,
    PipelineRetried,
    PipelinePassed,
    PipelineFailedAgain,
    Escalated,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureType {
    BuildCompile,
    TestFailure,
    DependencyConflict,
    Infrastructure,
    DockerFailure,
    #[default]
    #[serde(other)]
    Unknown,
}

impl FailureType {
    /// Wire spelling, as used in query strings.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureType::BuildCompile => "BUILD_COMPILE",
            FailureType::TestFailure => "TEST_FAILURE",
            FailureType::DependencyConflict => "DEPENDENCY_CONFLICT",
            FailureType::Infrastructure => "INFRASTRUCTURE",
            FailureType::DockerFailure => "DOCKER_FAILURE",
            FailureType::Unknown => "UNKNOWN",
        }
    }
}

/// Finding severity, ordered from most to least urgent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    #[default]
    #[serde(other)]
    Info,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    #[default]
    Open,
    Suppressed,
    Fixed,
    Ignored,
    FalsePositive,
    #[serde(other)]
    Unknown,
}

/// A CI run as seen on the push channel or the REST listing.
///
/// Persisted records carry the row `id`. The normalizer's push message has
/// no `id` and names the run by `workflowRunId` instead, which is then used
/// as the identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "PipelineRecord")]
pub struct PipelineEvent {
    pub id: EventId,
    pub repo_name: Option<String>,
    pub branch: Option<String>,
    pub commit_sha: Option<String>,
    pub status: PipelineStatus,
    pub failure_type: Option<FailureType>,
    pub workflow_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_run_id: Option<EventId>,
    pub created_at: Option<String>,
}

#[derive(Debug, Error)]
#[error("pipeline event carries neither 'id' nor 'workflowRunId'")]
pub struct MissingPipelineId;

/// Wire shape of [`PipelineEvent`] before an identity is chosen.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipelineRecord {
    #[serde(default)]
    id: Option<EventId>,
    #[serde(default)]
    repo_name: Option<String>,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    commit_sha: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    status: PipelineStatus,
    #[serde(default)]
    failure_type: Option<FailureType>,
    #[serde(default)]
    workflow_name: Option<String>,
    #[serde(default)]
    workflow_run_id: Option<EventId>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    triggered_at: Option<String>,
}

impl TryFrom<PipelineRecord> for PipelineEvent {
    type Error = MissingPipelineId;

    fn try_from(r: PipelineRecord) -> Result<Self, Self::Error> {
        let id = r.id.or_else(|| r.workflow_run_id.clone()).ok_or(MissingPipelineId)?;
        Ok(Self {
            id,
            repo_name: r.repo_name,
            branch: r.branch,
            commit_sha: r.commit_sha,
            status: r.status,
            failure_type: r.failure_type,
            workflow_name: r.workflow_name,
            workflow_run_id: r.workflow_run_id,
            created_at: r.created_at.or(r.triggered_at),
        })
    }
}

/// A healing session as seen on the push channel or the REST listing.
///
/// The push producer names some fields differently from the REST listing
/// (`sessionId`, `healingStatus`, `confidence`, `summary`); both spellings
/// are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealingEvent {
    #[serde(alias = "sessionId")]
    pub id: EventId,
    #[serde(default)]
    pub repo_name: Option<String>,
    #[serde(default, alias = "healingStatus", deserialize_with = "null_as_default")]
    pub status: HealingStatus,
    #[serde(default)]
    pub failure_type: Option<FailureType>,
    #[serde(default, alias = "summary")]
    pub failure_summary: Option<String>,
    #[serde(default)]
    pub fix_explanation: Option<String>,
    #[serde(default, alias = "confidence", deserialize_with = "null_as_default")]
    pub confidence_score: f64,
    #[serde(default)]
    pub fix_branch: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityScan {
    pub id: EventId,
    #[serde(default)]
    pub repo_name: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub commit_sha: Option<String>,
    #[serde(default)]
    pub scan_provider: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub severity: Severity,
    #[serde(default)]
    pub vulnerability_id: Option<String>,
    #[serde(default)]
    pub vulnerability_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub line_number: Option<u32>,
    #[serde(default)]
    pub remediation: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: ScanStatus,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Category-specific body of an [`Event`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "category", content = "data", rename_all = "lowercase")]
pub enum EventPayload {
    Pipeline(PipelineEvent),
    Healing(HealingEvent),
    Security(SecurityScan),
}

impl EventPayload {
    /// Decodes a JSON body received for `category`.
    pub fn from_json(category: Category, body: &str) -> serde_json::Result<Self> {
        Ok(match category {
            Category::Pipeline => EventPayload::Pipeline(serde_json::from_str(body)?),
            Category::Healing => EventPayload::Healing(serde_json::from_str(body)?),
            Category::Security => EventPayload::Security(serde_json::from_str(body)?),
        })
    }

    pub fn category(&self) -> Category {
        match self {
            EventPayload::Pipeline(_) => Category::Pipeline,
            EventPayload::Healing(_) => Category::Healing,
            EventPayload::Security(_) => Category::Security,
        }
    }

    pub fn id(&self) -> &EventId {
        match self {
            EventPayload::Pipeline(e) => &e.id,
            EventPayload::Healing(e) => &e.id,
            EventPayload::Security(e) => &e.id,
        }
    }

    pub fn repo_name(&self) -> Option<&str> {
        let name = match self {
            EventPayload::Pipeline(e) => e.repo_name.as_deref(),
            EventPayload::Healing(e) => e.repo_name.as_deref(),
            EventPayload::Security(e) => e.repo_name.as_deref(),
        };
        name.filter(|n| !n.is_empty())
    }

    /// Healing sessions carry no branch of their own.
    pub fn branch(&self) -> Option<&str> {
        match self {
            EventPayload::Pipeline(e) => e.branch.as_deref(),
            EventPayload::Healing(_) => None,
            EventPayload::Security(e) => e.branch.as_deref(),
        }
    }
}

/// Envelope stored in an event buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub category: Category,
    /// Repository full name (`owner/repo`) used to scope listener fan-out.
    pub resource_key: Option<String>,
    pub payload: EventPayload,
    pub received_at: DateTime<Utc>,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self::received_at(payload, Utc::now())
    }

    pub fn received_at(payload: EventPayload, received_at: DateTime<Utc>) -> Self {
        Self {
            id: payload.id().clone(),
            category: payload.category(),
            resource_key: payload.repo_name().map(str::to_string),
            payload,
            received_at,
        }
    }

    /// Matches the repository either by full name or by its short name, the
    /// way per-repository pages filter the global feed.
    pub fn belongs_to_repo(&self, repo_full_name: &str) -> bool {
        let Some(key) = self.resource_key.as_deref() else {
            return false;
        };
        let short = repo_full_name.rsplit('/').next().unwrap_or(repo_full_name);
        key == repo_full_name || key == short
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_string_ids_compare_equal() {
        let a: EventId = serde_json::from_str("42").unwrap();
        let b: EventId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, EventId::from(42));
    }

    #[test]
    fn healing_push_message_uses_producer_field_names() {
        let body = r#"{"sessionId":7,"pipelineEventId":3,"repoName":"acme/api",
            "failureType":"TEST_FAILURE","healingStatus":"PENDING_APPROVAL",
            "confidence":0.82,"fixBranch":"","summary":"flaky test"}"#;
        let payload = EventPayload::from_json(Category::Healing, body).unwrap();
        let EventPayload::Healing(h) = &payload else {
            panic!("expected healing payload");
        };
        assert_eq!(h.id, EventId::from(7));
        assert_eq!(h.status, HealingStatus::PendingApproval);
        assert_eq!(h.failure_type, Some(FailureType::TestFailure));
        assert!((h.confidence_score - 0.82).abs() < f64::EPSILON);
        assert_eq!(h.failure_summary.as_deref(), Some("flaky test"));
        assert_eq!(payload.repo_name(), Some("acme/api"));
    }

    #[test]
    fn missing_and_null_fields_fall_back_to_defaults() {
        let body = r#"{"id":1,"status":null,"confidenceScore":null}"#;
        let EventPayload::Healing(h) = EventPayload::from_json(Category::Healing, body).unwrap() else {
            panic!("expected healing payload");
        };
        assert_eq!(h.status, HealingStatus::Unknown);
        assert_eq!(h.confidence_score, 0.0);
        assert!(h.repo_name.is_none());
    }

    #[test]
    fn unknown_enum_values_do_not_fail_decoding() {
        let body = r#"{"id":"x","severity":"APOCALYPTIC","status":"WHATEVER"}"#;
        let EventPayload::Security(s) = EventPayload::from_json(Category::Security, body).unwrap() else {
            panic!("expected security payload");
        };
        assert_eq!(s.severity, Severity::Info);
        assert_eq!(s.status, ScanStatus::Unknown);
    }

    #[test]
    fn normalizer_pipeline_message_is_keyed_by_workflow_run() {
        let body = r#"{"repoUrl":"https://github.com/acme/api","repoName":"acme/api",
            "branch":"main","commitSha":"abc123","provider":"GITHUB","status":"FAILED",
            "workflowRunId":9001,"workflowName":"CI","triggeredAt":"2025-01-01T00:00:00Z"}"#;
        let EventPayload::Pipeline(p) = EventPayload::from_json(Category::Pipeline, body).unwrap() else {
            panic!("expected pipeline payload");
        };
        assert_eq!(p.id, EventId::from(9001));
        assert_eq!(p.status, PipelineStatus::Failed);
        assert_eq!(p.created_at.as_deref(), Some("2025-01-01T00:00:00Z"));
    }

    #[test]
    fn pipeline_row_id_wins_over_workflow_run() {
        let body = r#"{"id":12,"workflowRunId":9001,"repoName":"acme/api"}"#;
        let EventPayload::Pipeline(p) = EventPayload::from_json(Category::Pipeline, body).unwrap() else {
            panic!("expected pipeline payload");
        };
        assert_eq!(p.id, EventId::from(12));
        assert_eq!(p.workflow_run_id, Some(EventId::from(9001)));

        let anonymous = EventPayload::from_json(Category::Pipeline, r#"{"repoName":"acme/api"}"#);
        assert!(anonymous.is_err());
    }

    #[test]
    fn empty_repo_name_is_not_a_resource_key() {
        let payload = EventPayload::from_json(Category::Pipeline, r#"{"id":1,"repoName":""}"#).unwrap();
        assert!(Event::new(payload).resource_key.is_none());
    }

    #[test]
    fn repo_match_accepts_full_and_short_names() {
        let payload =
            EventPayload::from_json(Category::Pipeline, r#"{"id":1,"repoName":"backend"}"#).unwrap();
        let event = Event::new(payload);
        assert!(event.belongs_to_repo("acme/backend"));
        assert!(!event.belongs_to_repo("acme/frontend"));
    }

    #[test]
    fn topics_round_trip_to_categories() {
        for c in Category::ALL {
            assert_eq!(Category::from_topic(c.topic()), Some(c));
        }
        assert_eq!(Category::from_topic("/topic/unknown"), None);
        assert_eq!("Security".parse::<Category>(), Ok(Category::Security));
    }
}
