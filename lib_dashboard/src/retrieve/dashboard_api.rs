//! # Dashboard API
//!
//! Typed access to the backend's REST endpoints. Every call resolves to a
//! [`FetchError`] on failure so callers can treat any of them as "no data
//! for now": a non-2xx answer becomes [`FetchError::Status`], a network
//! failure [`FetchError::Transport`]. A `null` or empty list body is an empty
//! list, never an error.
//!
//! Besides the polled listings this covers the operator side of a healing
//! session: its detail record, its audit trail, and the approve, reject and
//! regenerate actions relayed to the healing engine.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::configs::SyncSettings;
use crate::ingestors::poller::FetchError;
use crate::model::{
    AuditEntry, DashboardStats, EventId, FailurePattern, FailureType, FixPlan, HealingEvent,
    HealingSessionDetail, KnowledgeStats, PipelineEvent, RegenerateOutcome, SecurityScan,
    SecurityStats, SessionActionAck,
};
use crate::retrieve::http_client::{ApiClient, ApiResponse};

type Query<'a> = Vec<(&'a str, String)>;

fn scope<'a>(repo: Option<&str>, branch: Option<&str>) -> Query<'a> {
    let mut query = Vec::new();
    if let Some(repo) = repo.filter(|r| !r.is_empty()) {
        query.push(("repo", repo.to_string()));
    }
    if let Some(branch) = branch.filter(|b| !b.is_empty()) {
        query.push(("branch", branch.to_string()));
    }
    query
}

#[derive(Serialize)]
struct RegenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    feedback: Option<&'a str>,
}

/// Non-2xx answers become [`FetchError::Status`]. A `Retry-After` hint is
/// logged so throttling by the backend is visible.
fn into_result<T>(method: &str, path: &str, response: ApiResponse<T>) -> Result<Option<T>, FetchError> {
    if response.success {
        return Ok(response.data);
    }
    if let Some(wait) = response.retry_after() {
        log::warn!(
            "{} {} answered {}, server asks to retry after {}s",
            method,
            path,
            response.status,
            wait.as_secs()
        );
    }
    log::debug!(
        "{} {} answered {}: {}",
        method,
        path,
        response.status,
        response.error_body.as_deref().unwrap_or("")
    );
    Err(FetchError::Status(response.status))
}

fn required<T>(path: &str, data: Option<T>) -> Result<T, FetchError> {
    data.ok_or_else(|| FetchError::Decode(format!("{} returned an empty body", path)))
}

#[derive(Clone)]
pub struct DashboardApi {
    client: Arc<ApiClient>,
}

impl DashboardApi {
    pub fn new(settings: &SyncSettings) -> anyhow::Result<Self> {
        let client = ApiClient::new(
            &settings.api_base_url,
            settings.api_token.clone(),
            Duration::from_secs(10),
        )?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: ApiClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<Option<T>, FetchError> {
        let response: ApiResponse<T> = self
            .client
            .get(path, query)
            .await
            .map_err(|e| classify(&e))?;
        into_result("GET", path, response)
    }

    async fn post_action<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let response: ApiResponse<T> = self.client.post(path).await.map_err(|e| classify(&e))?;
        required(path, into_result("POST", path, response)?)
    }

    async fn fetch_list<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<T>, FetchError> {
        let list: Option<Option<Vec<T>>> = self.fetch(path, query).await?;
        Ok(list.flatten().unwrap_or_default())
    }

    pub async fn dashboard_stats(&self, repo: Option<&str>) -> Result<Option<DashboardStats>, FetchError> {
        self.fetch("api/dashboard/stats", &scope(repo, None)).await
    }

    pub async fn pipeline_events(
        &self,
        repo: Option<&str>,
        branch: Option<&str>,
    ) -> Result<Vec<PipelineEvent>, FetchError> {
        self.fetch_list("api/dashboard/pipeline-events", &scope(repo, branch)).await
    }

    pub async fn healing_sessions(&self, repo: Option<&str>) -> Result<Vec<HealingEvent>, FetchError> {
        self.fetch_list("api/dashboard/healing-sessions", &scope(repo, None)).await
    }

    pub async fn security_scans(
        &self,
        repo: Option<&str>,
        branch: Option<&str>,
    ) -> Result<Vec<SecurityScan>, FetchError> {
        self.fetch_list("api/security/scans", &scope(repo, branch)).await
    }

    pub async fn security_stats(&self, repo: Option<&str>) -> Result<Option<SecurityStats>, FetchError> {
        self.fetch("api/security/stats", &scope(repo, None)).await
    }

    /// Branch names of `repo_full_name` (`owner/repo`).
    pub async fn branches(&self, repo_full_name: &str) -> Result<Vec<String>, FetchError> {
        let path = format!("api/dashboard/repos/{}/branches", repo_full_name.trim_matches('/'));
        self.fetch_list(&path, &[]).await
    }

    pub async fn knowledge_stats(&self) -> Result<Option<KnowledgeStats>, FetchError> {
        self.fetch("api/knowledge/stats", &[]).await
    }

    pub async fn knowledge_patterns(&self, failure_type: Option<FailureType>) -> Result<Vec<FailurePattern>, FetchError> {
        let query: Query<'_> = failure_type
            .map(|ft| vec![("failureType", ft.as_str().to_string())])
            .unwrap_or_default();
        self.fetch_list("api/knowledge/patterns", &query).await
    }

    /// Proposed fix for a healing session. `None` when the engine has no
    /// plan (204) for it.
    pub async fn fix_plan(&self, session_id: &EventId) -> Result<Option<FixPlan>, FetchError> {
        let path = format!("api/healing/sessions/{}/fix-plan", session_id);
        self.fetch(&path, &[]).await
    }

    /// Detail record of one healing session. An unknown id is
    /// `FetchError::Status(404)`.
    pub async fn healing_session(&self, session_id: &EventId) -> Result<HealingSessionDetail, FetchError> {
        let path = format!("api/healing/sessions/{}", session_id);
        let detail = self.fetch(&path, &[]).await?;
        required(&path, detail)
    }

    /// Audit trail of a session, oldest entry first.
    pub async fn audit_log(&self, session_id: &EventId) -> Result<Vec<AuditEntry>, FetchError> {
        let path = format!("api/healing/sessions/{}/audit-log", session_id);
        self.fetch_list(&path, &[]).await
    }

    /// Approves the proposed fix; the engine then applies it.
    pub async fn approve_session(&self, session_id: &EventId) -> Result<SessionActionAck, FetchError> {
        log::info!("Approving healing session {}", session_id);
        self.post_action(&format!("api/healing/sessions/{}/approve", session_id)).await
    }

    pub async fn reject_session(&self, session_id: &EventId) -> Result<SessionActionAck, FetchError> {
        log::info!("Rejecting healing session {}", session_id);
        self.post_action(&format!("api/healing/sessions/{}/reject", session_id)).await
    }

    /// Rejects the current fix and asks for a new one, optionally steered by
    /// operator `feedback`. Blank feedback is not sent.
    pub async fn regenerate_session(
        &self,
        session_id: &EventId,
        feedback: Option<&str>,
    ) -> Result<RegenerateOutcome, FetchError> {
        let path = format!("api/healing/sessions/{}/regenerate", session_id);
        let body = RegenerateRequest {
            feedback: feedback.map(str::trim).filter(|f| !f.is_empty()),
        };
        log::info!("Regenerating fix for healing session {}", session_id);
        let response: ApiResponse<RegenerateOutcome> = self
            .client
            .request_json(Method::POST, &path, &body)
            .await
            .map_err(|e| classify(&e))?;
        required(&path, into_result("POST", &path, response)?)
    }

    /// Findings recorded for one commit. `sha` may be an abbreviated prefix.
    pub async fn security_scans_by_commit(&self, sha: &str) -> Result<Vec<SecurityScan>, FetchError> {
        let path = format!("api/security/scans/commit/{}", sha.trim());
        self.fetch_list(&path, &[]).await
    }
}

fn classify(err: &anyhow::Error) -> FetchError {
    let is_decode = err
        .chain()
        .any(|cause| cause.downcast_ref::<serde_json::Error>().is_some());
    if is_decode {
        FetchError::Decode(format!("{:#}", err))
    } else {
        FetchError::Transport(format!("{:#}", err))
    }
}
