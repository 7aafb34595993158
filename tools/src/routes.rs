//! HTTP routes.
//!
//! Analytics endpoints quietly drop traffic that is not a browser on the
//! real host; they never tell a bot why.

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Multipart, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use payout_core::{
    account::AccountProfile,
    analytics::{TrackEvent, VisitorContext},
    eligibility::{evaluate_with_policy, payout_stage_note, Verdict},
    error::DeskError,
    import::{run_import, ImportState, UploadFile},
    input::EvaluationRequest,
    types::Money,
    visitor::{self, ClientKind},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/track", post(track))
        .route("/api/admin-stats", get(admin_stats))
        .route("/api/log-ip", get(log_ip))
        .route("/api/ping", get(ping))
        .route("/api/upload-tradovate", post(upload_tradovate))
        .route("/api/evaluate", post(evaluate))
        .route("/api/accounts", get(accounts))
        .with_state(state)
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Who is calling, from request headers.
struct Caller {
    ip: String,
    user_agent: String,
    host: String,
}

impl Caller {
    fn from_request(headers: &HeaderMap, remote: Option<ConnectInfo<SocketAddr>>) -> Self {
        let header_str = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string()
        };
        let forwarded = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok());
        let remote = remote.map(|ConnectInfo(addr)| addr.ip().to_string());
        Self {
            ip: visitor::client_ip(forwarded, remote.as_deref()),
            user_agent: header_str(header::USER_AGENT),
            host: header_str(header::HOST),
        }
    }
}

// ── Analytics ──────────────────────────────────────

async fn track(
    State(state): State<Arc<AppState>>,
    remote: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let caller = Caller::from_request(&headers, remote);
    if !state.settings.is_real_host(&caller.host) || !visitor::is_browser(&caller.user_agent) {
        return StatusCode::NO_CONTENT.into_response();
    }

    let event: TrackEvent = serde_json::from_str(&body).unwrap_or_default();
    let visitor = VisitorContext::from_request(&caller.ip, &caller.user_agent);
    let now = state.now();

    let mut store = state.analytics.lock().await;
    match store.record_event(&visitor, event, now) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(DeskError::MissingField { .. }) => {
            error_response(StatusCode::BAD_REQUEST, "Missing sessionId or event")
        }
        Err(e) => {
            log::warn!("track: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to record event")
        }
    }
}

async fn admin_stats(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let caller = Caller::from_request(&headers, None);
    if !state.settings.is_real_host(&caller.host) {
        return error_response(StatusCode::FORBIDDEN, "Forbidden");
    }
    if let Some(expected) = state.settings.admin_token.as_deref() {
        let presented = headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if presented != Some(expected) {
            log::warn!("admin-stats: rejected request without a valid token");
            return error_response(StatusCode::FORBIDDEN, "Forbidden");
        }
    }

    let summary = state.analytics.lock().await.summarize(state.now());
    Json(summary).into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LogIpResponse {
    ok: bool,
    #[serde(rename = "type")]
    kind: ClientKind,
    ip: String,
    user_agent: String,
}

async fn log_ip(
    remote: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Json<LogIpResponse> {
    let caller = Caller::from_request(&headers, remote);
    let kind = visitor::classify(&caller.user_agent);
    log::info!("[{kind}] IP: {}", caller.ip);
    Json(LogIpResponse {
        ok: true,
        kind,
        ip: caller.ip,
        user_agent: caller.user_agent,
    })
}

#[derive(Debug, Deserialize)]
struct PingQuery {
    session: Option<String>,
}

async fn ping(
    State(state): State<Arc<AppState>>,
    remote: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Query(query): Query<PingQuery>,
) -> Response {
    let caller = Caller::from_request(&headers, remote);
    let session = query.session.filter(|s| !s.is_empty());
    let session = match session {
        Some(s) if state.settings.is_real_host(&caller.host)
            && visitor::is_browser(&caller.user_agent) => s,
        _ => return Json(json!({ "ok": true, "type": "IGNORED" })).into_response(),
    };

    let ended = state
        .presence
        .lock()
        .await
        .heartbeat(&session, &caller.ip, state.now());
    for visit in ended {
        log::info!("[HUMAN] {} stayed for {}", visit.ip, visit.duration_label());
    }
    Json(json!({ "ok": true })).into_response()
}

// ── Trade import relay ─────────────────────────────

async fn upload_tradovate(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Response {
    let mut file: Option<UploadFile> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("file") {
                    continue;
                }
                let file_name = field.file_name().unwrap_or("trades.csv").to_string();
                match field.bytes().await {
                    Ok(bytes) => {
                        file = Some(UploadFile { file_name, bytes: bytes.to_vec() });
                        break;
                    }
                    Err(e) => {
                        log::warn!("upload: failed to read file field: {e}");
                        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to parse form");
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                log::warn!("upload: form parse error: {e}");
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to parse form");
            }
        }
    }

    let Some(file) = file else {
        return error_response(StatusCode::BAD_REQUEST, "CSV file missing");
    };
    let Some(importer) = state.importer.clone() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Import service not configured");
    };

    let job_id = uuid::Uuid::new_v4();
    log::info!(
        "upload: job {job_id} relaying {} ({} bytes)",
        file.file_name,
        file.bytes.len()
    );

    let run = run_import(
        importer.as_ref(),
        state.sleeper.as_ref(),
        &state.settings.poll,
        &file,
    )
    .await;

    log::info!(
        "upload: job {job_id} finished after {} status checks: {:?}",
        run.status_checks,
        run.state
    );

    match run.state {
        ImportState::Completed { import_id } => Json(json!({
            "ok": true,
            "importId": import_id,
            "trades": run.trades,
        }))
        .into_response(),
        ImportState::TimedOut { import_id, .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Import timed out", "importId": import_id })),
        )
            .into_response(),
        ImportState::Failed { reason } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Import failed", "details": reason })),
        )
            .into_response(),
        other => {
            log::error!("upload: job {job_id} stopped in non-terminal state {other:?}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
        }
    }
}

// ── Payout eligibility ─────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvaluationResponse {
    #[serde(flatten)]
    verdict: Verdict,
    summary: Vec<String>,
    stage_note: String,
}

async fn evaluate(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: EvaluationRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            log::debug!("evaluate: rejected body: {e}");
            return error_response(StatusCode::BAD_REQUEST, &format!("Invalid request: {e}"));
        }
    };
    let (profile, input) = match request.into_input(&state.config.accounts) {
        Ok(parsed) => parsed,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    let verdict = evaluate_with_policy(&state.config.policy, &profile, &input);
    log::info!(
        "evaluate: {} payout #{} eligible={} failed={}",
        profile.size_id.id(),
        input.payout_number,
        verdict.eligible,
        verdict.failed_rules().count()
    );
    Json(EvaluationResponse {
        summary: verdict.summary_lines(),
        stage_note: payout_stage_note(
            &state.config.policy,
            input.payout_number,
            input.is_live_program,
        ),
        verdict,
    })
    .into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountRow {
    #[serde(flatten)]
    profile: AccountProfile,
    label: &'static str,
    drawdown_allowance: Money,
    safety_net_amount: Money,
}

async fn accounts(State(state): State<Arc<AppState>>) -> Json<Vec<AccountRow>> {
    let rows = state
        .config
        .accounts
        .profiles()
        .iter()
        .map(|p| AccountRow {
            label: p.size_id.label(),
            drawdown_allowance: p.drawdown_allowance(),
            safety_net_amount: p.safety_net_amount(),
            profile: p.clone(),
        })
        .collect();
    Json(rows)
}
