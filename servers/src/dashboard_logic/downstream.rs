use crate::dashboard_logic::config::Config;
use crate::dashboard_logic::engine::AppState;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use lib_dashboard::ingestors::FetchError;
use lib_dashboard::model::{
    ConfidenceBand, EventPayload, FileAction, FixPlan, SeveritySummary,
};
use lib_dashboard::{Category, DiffLine, DiffSummary, EventId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

static NEXT_CLIENT_ID: AtomicUsize = AtomicUsize::new(1);

#[derive(Debug, Default, Deserialize)]
pub struct ScopeQuery {
    repo: Option<String>,
    branch: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RegenerateBody {
    feedback: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileDiffView<'a> {
    file_path: &'a str,
    action: FileAction,
    badge: &'static str,
    summary: DiffSummary,
    lines: Vec<DiffLine>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FixPlanView<'a> {
    plan: &'a FixPlan,
    confidence_band: ConfidenceBand,
    confidence_percent: u8,
    files: Vec<FileDiffView<'a>>,
}

pub fn router(state: AppState, cors_origin: Option<&str>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/state", get(state_handler))
        .route("/api/events/{category}", get(events_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/knowledge", get(knowledge_handler))
        .route("/api/security/summary", get(security_summary_handler))
        .route("/api/fix-plan/{session_id}", get(fix_plan_handler))
        .route("/api/healing/{session_id}", get(session_handler))
        .route("/api/healing/{session_id}/audit-log", get(audit_log_handler))
        .route("/api/healing/{session_id}/approve", post(approve_handler))
        .route("/api/healing/{session_id}/reject", post(reject_handler))
        .route("/api/healing/{session_id}/regenerate", post(regenerate_handler))
        .route("/api/security/commits/{sha}", get(commit_scans_handler))
        .route("/ws/repos/{owner}/{repo}", get(ws_handler))
        .layer(cors_layer(cors_origin))
        .with_state(state)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);
    match origin {
        None | Some("*") => layer.allow_origin(Any),
        Some(origin) => match HeaderValue::from_str(origin) {
            Ok(value) => layer.allow_origin(value),
            Err(_) => {
                log::warn!("Invalid CORS origin '{}', allowing any origin", origin);
                layer.allow_origin(Any)
            }
        },
    }
}

pub async fn run(
    config: Config,
    app_state: AppState,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = router(app_state, config.cors_origin.as_deref());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port()));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("Dashboard server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.recv().await.ok();
            log::info!("Dashboard server shutting down.");
        })
        .await?;
    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn state_handler(State(state): State<AppState>) -> impl IntoResponse {
    let counts: serde_json::Map<String, serde_json::Value> = Category::ALL
        .iter()
        .map(|c| (c.to_string(), json!(state.view.snapshot(*c).len())))
        .collect();
    Json(json!({
        "connection": state.connection.current_state(),
        "polling": state.poller.is_running(),
        "events": counts,
        "watchedRepos": state.registry.key_count(),
    }))
}

async fn events_handler(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(scope): Query<ScopeQuery>,
) -> Response {
    match category.parse::<Category>() {
        Ok(category) => {
            let events = state
                .view
                .filtered(category, scope.repo.as_deref(), scope.branch.as_deref());
            Json(events).into_response()
        }
        Err(e) => (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.view.stats())
}

async fn knowledge_handler(State(state): State<AppState>) -> impl IntoResponse {
    let knowledge = state.view.knowledge();
    let fast_path_rate = knowledge.as_ref().map(|k| k.fast_path_rate());
    Json(json!({
        "knowledge": knowledge,
        "fastPathRate": fast_path_rate,
    }))
}

async fn security_summary_handler(
    State(state): State<AppState>,
    Query(scope): Query<ScopeQuery>,
) -> impl IntoResponse {
    let events = state
        .view
        .filtered(Category::Security, scope.repo.as_deref(), scope.branch.as_deref());
    let summary = SeveritySummary::from_scans(events.iter().filter_map(|e| match &e.payload {
        EventPayload::Security(scan) => Some(scan),
        _ => None,
    }));
    Json(json!({
        "summary": summary,
        "total": summary.total(),
    }))
}

async fn fix_plan_handler(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    match state.api.fix_plan(&EventId::new(session_id.clone())).await {
        Ok(Some(plan)) => {
            let files = plan
                .file_changes
                .iter()
                .map(|change| {
                    let lines = change.diff();
                    FileDiffView {
                        file_path: &change.file_path,
                        action: change.action,
                        badge: change.action.badge(),
                        summary: DiffSummary::of(&lines),
                        lines,
                    }
                })
                .collect();
            let view = FixPlanView {
                plan: &plan,
                confidence_band: plan.confidence_band(),
                confidence_percent: plan.confidence_percent(),
                files,
            };
            Json(view).into_response()
        }
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => upstream_error("Fix plan", &session_id, e),
    }
}

/// Maps a backend failure to the answer given to the dashboard client.
fn upstream_error(what: &str, id: &str, e: FetchError) -> Response {
    match e {
        FetchError::Status(404) => StatusCode::NOT_FOUND.into_response(),
        FetchError::Status(400) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response()
        }
        e => {
            log::warn!("{} for {} unavailable: {}", what, id, e);
            (StatusCode::BAD_GATEWAY, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

async fn session_handler(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    match state.api.healing_session(&EventId::new(session_id.clone())).await {
        Ok(detail) => Json(detail).into_response(),
        Err(e) => upstream_error("Healing session", &session_id, e),
    }
}

async fn audit_log_handler(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    match state.api.audit_log(&EventId::new(session_id.clone())).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => upstream_error("Audit log", &session_id, e),
    }
}

async fn approve_handler(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    match state.api.approve_session(&EventId::new(session_id.clone())).await {
        Ok(ack) => {
            state.poller.refresh_now();
            Json(ack).into_response()
        }
        Err(e) => upstream_error("Approval", &session_id, e),
    }
}

async fn reject_handler(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    match state.api.reject_session(&EventId::new(session_id.clone())).await {
        Ok(ack) => {
            state.poller.refresh_now();
            Json(ack).into_response()
        }
        Err(e) => upstream_error("Rejection", &session_id, e),
    }
}

/// The body is optional; an empty body regenerates without feedback.
async fn regenerate_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Response {
    let request: RegenerateBody = if body.iter().all(u8::is_ascii_whitespace) {
        RegenerateBody::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response();
            }
        }
    };

    let id = EventId::new(session_id.clone());
    match state.api.regenerate_session(&id, request.feedback.as_deref()).await {
        Ok(outcome) => {
            state.poller.refresh_now();
            Json(outcome).into_response()
        }
        Err(e) => upstream_error("Regeneration", &session_id, e),
    }
}

async fn commit_scans_handler(State(state): State<AppState>, Path(sha): Path<String>) -> Response {
    match state.api.security_scans_by_commit(&sha).await {
        Ok(scans) => Json(scans).into_response(),
        Err(e) => upstream_error("Commit scans", &sha, e),
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
) -> impl IntoResponse {
    let key = format!("{}/{}", owner, repo);
    ws.on_upgrade(move |socket| handle_socket(socket, state, key))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, key: String) {
    let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
    let mut subscription = state.registry.subscribe(&key);
    log::info!("Client {} watching {}", client_id, key);

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            event = subscription.recv() => {
                let Some(event) = event else { break };
                match serde_json::to_string(event.as_ref()) {
                    Ok(json_str) => {
                        if socket.send(Message::Text(json_str.into())).await.is_err() {
                            break; // client disconnected
                        }
                    }
                    Err(e) => log::error!("Failed to serialize event {}: {}", event.id, e),
                }
            }
        }
    }

    subscription.unsubscribe();
    log::info!("Client {} stopped watching {}", client_id, key);
}
