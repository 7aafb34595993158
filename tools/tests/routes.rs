use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use desk_server::{build_app, routes::ADMIN_TOKEN_HEADER, settings::ServerSettings, state::AppState};
use payout_core::{
    clock::{Clock, ManualClock, Sleeper},
    config::PolicyConfig,
    error::DeskResult,
    import::{ImportStatus, PollPolicy, TradeImportApi, UploadFile, UploadReceipt},
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

const HOST: &str = "desk.example.com";
const TOKEN: &str = "s3cret";
const CHROME: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
const BOUNDARY: &str = "deskboundary42";

/// Completes on the first status check, remembers what it was sent.
#[derive(Default)]
struct FakeImporter {
    complete: bool,
    uploaded: Mutex<Vec<String>>,
}

#[async_trait]
impl TradeImportApi for FakeImporter {
    async fn upload(&self, file: &UploadFile) -> DeskResult<UploadReceipt> {
        self.uploaded.lock().unwrap().push(file.file_name.clone());
        Ok(serde_json::from_value(json!({ "success": true, "import_id": "imp-9" }))?)
    }

    async fn status(&self, _import_id: &str) -> DeskResult<ImportStatus> {
        let status = if self.complete { "completed" } else { "queued" };
        Ok(ImportStatus { status: status.to_string() })
    }

    async fn export_csv(&self) -> DeskResult<String> {
        Ok("symbol,pnl\nMNQ,88.00\n".to_string())
    }
}

fn settings() -> ServerSettings {
    ServerSettings {
        real_host: Some(HOST.to_string()),
        admin_token: Some(TOKEN.to_string()),
        poll: PollPolicy {
            interval: Duration::from_millis(1_500),
            max_attempts: 3,
        },
        ..ServerSettings::default()
    }
}

fn app_with(importer: Option<Arc<dyn TradeImportApi>>) -> (Router, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_at(1_000_000));
    let state = AppState::new(settings(), PolicyConfig::standard(), importer)
        .with_clock(clock.clone() as Arc<dyn Clock>, clock.clone() as Arc<dyn Sleeper>);
    (build_app(Arc::new(state)), clock)
}

fn app() -> Router {
    app_with(None).0
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

fn json_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).expect("json body")
}

fn track_request(user_agent: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/track")
        .header(header::HOST, HOST)
        .header(header::USER_AGENT, user_agent)
        .header("x-forwarded-for", "203.0.113.7")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn stats_request(host: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri("/api/admin-stats").header(header::HOST, host);
    if let Some(token) = token {
        builder = builder.header(ADMIN_TOKEN_HEADER, token);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn browser_events_show_up_in_admin_stats() {
    let app = app();
    let (status, _) = send(
        &app,
        track_request(CHROME, json!({ "sessionId": "s1", "event": "page_view" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(
        &app,
        track_request(CHROME, json!({ "sessionId": "s1", "event": "affiliate_click" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, stats_request(HOST, Some(TOKEN))).await;
    assert_eq!(status, StatusCode::OK);
    let stats = json_body(&body);
    assert_eq!(stats["totals"]["totalSessions"], 1);
    assert_eq!(stats["totals"]["activeSessions"], 1);
    assert_eq!(stats["totals"]["affiliateClicks"], 1);
    assert_eq!(stats["breakdowns"]["browsers"]["Chrome"], 1);
    assert_eq!(stats["recentEvents"][0]["event"], "affiliate_click");
    assert_eq!(stats["recentSessions"][0]["ipHash"].as_str().unwrap().len(), 8);
}

#[tokio::test]
async fn bots_are_silently_ignored() {
    let app = app();
    let (status, _) = send(
        &app,
        track_request("curl/8.4.0", json!({ "sessionId": "s1", "event": "page_view" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(&app, stats_request(HOST, Some(TOKEN))).await;
    assert_eq!(json_body(&body)["totals"]["totalSessions"], 0);
}

#[tokio::test]
async fn track_without_session_is_bad_request() {
    let (status, body) = send(&app(), track_request(CHROME, json!({ "event": "page_view" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error"], "Missing sessionId or event");
}

#[tokio::test]
async fn admin_stats_requires_host_and_token() {
    let app = app();
    for request in [
        stats_request("preview.example.com", Some(TOKEN)),
        stats_request(HOST, None),
        stats_request(HOST, Some("wrong")),
    ] {
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json_body(&body)["error"], "Forbidden");
    }
}

#[tokio::test]
async fn log_ip_reports_classification() {
    let request = Request::builder()
        .uri("/api/log-ip")
        .header(header::USER_AGENT, "ELB-HealthChecker/2.0")
        .header("x-forwarded-for", "10.1.2.3, 10.0.0.1")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json_body(&body),
        json!({ "ok": true, "type": "HEALTH_CHECK", "ip": "10.1.2.3", "userAgent": "ELB-HealthChecker/2.0" })
    );
}

#[tokio::test]
async fn ping_ignores_non_browsers_and_missing_sessions() {
    let app = app();
    let bot = Request::builder()
        .uri("/api/ping?session=abc")
        .header(header::HOST, HOST)
        .header(header::USER_AGENT, "node-fetch/1.0")
        .body(Body::empty())
        .unwrap();
    let (_, body) = send(&app, bot).await;
    assert_eq!(json_body(&body), json!({ "ok": true, "type": "IGNORED" }));

    let no_session = Request::builder()
        .uri("/api/ping")
        .header(header::HOST, HOST)
        .header(header::USER_AGENT, CHROME)
        .body(Body::empty())
        .unwrap();
    let (_, body) = send(&app, no_session).await;
    assert_eq!(json_body(&body)["type"], "IGNORED");

    let human = Request::builder()
        .uri("/api/ping?session=abc")
        .header(header::HOST, HOST)
        .header(header::USER_AGENT, CHROME)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, human).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({ "ok": true }));
}

fn evaluate_request(body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/evaluate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn evaluate_returns_verdict_and_summary() {
    let (status, body) = send(
        &app(),
        evaluate_request(json!({
            "accountSize": "50K",
            "hasActivePa": true,
            "payoutNumber": 2,
            "currentBalance": 52600,
            "highestSingleDayProfit": 600,
            "tradingDays": 8,
            "profitDaysOver50": 5,
            "requestedPayout": 500
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let verdict = json_body(&body);
    assert_eq!(verdict["account"], "50k");
    assert_eq!(verdict["eligible"], true);
    assert_eq!(verdict["reasons"].as_array().unwrap().len(), 8);
    assert_eq!(verdict["summary"][0], "Should user get a payout? → YES");
    assert!(verdict["stageNote"].as_str().unwrap().starts_with("First 3 payouts"));
    assert_eq!(verdict["computed"]["safetyNetRequired"], true);
}

#[tokio::test]
async fn evaluate_rejects_unknown_account() {
    let (status, body) = send(
        &app(),
        evaluate_request(json!({ "accountSize": "75k", "hasActivePa": true })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error"], "Unknown account size '75k'");
}

#[tokio::test]
async fn evaluate_accepts_string_typed_counts() {
    let (status, body) = send(
        &app(),
        evaluate_request(json!({
            "accountSize": "50k",
            "hasActivePa": true,
            "payoutNumber": "2",
            "currentBalance": "52600",
            "highestSingleDayProfit": "600",
            "tradingDays": "8",
            "profitDaysOver50": "5",
            "requestedPayout": "500"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["eligible"], true);
}

#[tokio::test]
async fn evaluate_rejects_malformed_bodies_as_json() {
    let app = app();
    let malformed = Request::builder()
        .method(Method::POST)
        .uri("/api/evaluate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json_body(&body)["error"].as_str().unwrap().starts_with("Invalid request"));

    let (status, body) = send(
        &app,
        evaluate_request(json!({ "accountSize": "50k", "hasActivePa": true, "tradingDays": "eight" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json_body(&body)["error"].as_str().unwrap().contains("eight"));
}

#[tokio::test]
async fn evaluate_stage_note_follows_live_program() {
    let (status, body) = send(
        &app(),
        evaluate_request(json!({
            "accountSize": "50k",
            "hasActivePa": true,
            "isLiveProgram": true,
            "payoutNumber": 1
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let verdict = json_body(&body);
    assert_eq!(verdict["computed"]["safetyNetRequired"], false);
    assert!(verdict["stageNote"].as_str().unwrap().starts_with("Live program"));
}

#[tokio::test]
async fn accounts_lists_every_tier() {
    let request = Request::builder().uri("/api/accounts").body(Body::empty()).unwrap();
    let (status, body) = send(&app(), request).await;
    assert_eq!(status, StatusCode::OK);
    let rows = json_body(&body);
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 7);
    assert_eq!(rows[0]["sizeId"], "25k");
    assert_eq!(rows[0]["label"], "25K");
    assert_eq!(rows[0]["drawdownAllowance"], 1500.0);
    assert_eq!(rows[0]["safetyNetAmount"], 1600.0);
}

fn upload_request(field_name: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field_name}\"; filename=\"tradovate.csv\"\r\n\
         Content-Type: text/csv\r\n\r\n\
         Account,Symbol\r\n1,MNQ\r\n\
         \r\n--{BOUNDARY}--\r\n"
    );
    Request::builder()
        .method(Method::POST)
        .uri("/api/upload-tradovate")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn upload_relays_file_and_returns_trades() {
    let importer = Arc::new(FakeImporter { complete: true, ..FakeImporter::default() });
    let (app, clock) = app_with(Some(importer.clone() as Arc<dyn TradeImportApi>));

    let (status, body) = send(&app, upload_request("file")).await;
    assert_eq!(status, StatusCode::OK);
    let reply = json_body(&body);
    assert_eq!(reply["ok"], true);
    assert_eq!(reply["importId"], "imp-9");
    assert_eq!(reply["trades"], json!([{ "symbol": "MNQ", "pnl": "88.00" }]));
    assert_eq!(importer.uploaded.lock().unwrap().as_slice(), ["tradovate.csv"]);
    assert_eq!(clock.sleep_count(), 1);
}

#[tokio::test]
async fn upload_times_out_without_waiting() {
    let importer = Arc::new(FakeImporter::default());
    let (app, clock) = app_with(Some(importer as Arc<dyn TradeImportApi>));

    let (status, body) = send(&app, upload_request("file")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(&body), json!({ "error": "Import timed out", "importId": "imp-9" }));
    assert_eq!(clock.sleep_count(), 3);
    assert_eq!(clock.now_millis(), 1_000_000 + 3 * 1_500);
}

#[tokio::test]
async fn upload_without_file_field_is_bad_request() {
    let importer = Arc::new(FakeImporter::default());
    let (app, _) = app_with(Some(importer as Arc<dyn TradeImportApi>));
    let (status, body) = send(&app, upload_request("attachment")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error"], "CSV file missing");
}

#[tokio::test]
async fn upload_without_import_service_is_unavailable() {
    let (status, body) = send(&app(), upload_request("file")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(&body)["error"], "Import service not configured");
}
