//! desk-server: payout desk HTTP server and command-line checker.
//!
//! Usage:
//!   desk-server --data-dir ./data
//!   desk-server --check request.json

use anyhow::Result;
use desk_server::{
    build_app,
    settings::ServerSettings,
    state::AppState,
    tradesviz::TradesVizClient,
};
use payout_core::{
    config::PolicyConfig,
    eligibility::{evaluate_with_policy, payout_stage_note, Verdict},
    import::TradeImportApi,
    input::EvaluationRequest,
};
use std::env;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let data_dir = flag_value(&args, "--data-dir");
    let check = flag_value(&args, "--check");

    let config = load_config(data_dir)?;

    if let Some(path) = check {
        return run_check(&config, path);
    }

    serve(config).await
}

fn load_config(data_dir: Option<&str>) -> Result<PolicyConfig> {
    match data_dir {
        Some(dir) => PolicyConfig::load(dir),
        None if Path::new("./data").is_dir() => PolicyConfig::load("./data"),
        None => {
            log::warn!("No data directory found; using built-in account tiers");
            Ok(PolicyConfig::standard())
        }
    }
}

fn run_check(config: &PolicyConfig, path: &str) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
    let request: EvaluationRequest = serde_json::from_str(&content)?;
    let (profile, input) = request.into_input(&config.accounts)?;
    let verdict = evaluate_with_policy(&config.policy, &profile, &input);

    println!("=== PAYOUT CHECK ===");
    println!("  account:        {}", profile.size_id.label());
    println!("  payout number:  {}", input.payout_number);
    println!("  balance:        ${:.2}", input.current_balance);
    println!("  requested:      ${:.2}", input.requested_payout_amount);
    let stage = payout_stage_note(&config.policy, input.payout_number, input.is_live_program);
    println!("  {stage}");
    println!();
    print_verdict(&verdict);
    Ok(())
}

fn print_verdict(verdict: &Verdict) {
    println!("=== CHECKLIST ===");
    for check in &verdict.reasons {
        let mark = if check.pass { "OK  " } else { "FAIL" };
        println!("  [{mark}] {}", check.label);
    }

    let c = &verdict.computed;
    println!();
    println!("=== THRESHOLDS ===");
    println!("  safety net:         {}", if c.safety_net_required { "required" } else { "lifted" });
    println!("  safety net amount:  ${:.2}", c.safety_net_amount);
    println!("  min balance:        ${:.2}", c.min_balance_to_request);
    println!("  total profit:       ${:.2}", c.total_profit);
    match c.max_payout_cap {
        Some(cap) => println!("  payout cap:         ${cap:.2}"),
        None => println!("  payout cap:         none"),
    }
    if let Some(range) = c.allowed_payout_range {
        println!("  allowed payout:     ${:.2} – ${:.2}", range.min, range.max);
    }

    println!();
    println!("=== DECISION ===");
    for line in verdict.summary_lines() {
        println!("  {line}");
    }
    if !verdict.advice.is_empty() {
        println!();
        println!("=== WHAT TO FIX ===");
        for tip in &verdict.advice {
            println!("  - {tip}");
        }
    }
}

async fn serve(config: PolicyConfig) -> Result<()> {
    let settings = ServerSettings::from_env()?;

    let importer: Option<Arc<dyn TradeImportApi>> = match settings.tradesviz_api_key.as_deref() {
        Some(key) => Some(Arc::new(TradesVizClient::new(&settings.tradesviz_base_url, key)?)),
        None => {
            log::warn!("TRADESVIZ_API_KEY not set; trade uploads are disabled");
            None
        }
    };

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address: {e}"))?;

    match settings.real_host.as_deref() {
        Some(host) => log::info!("Counting analytics for host {host} only"),
        None => log::info!("DESK_REAL_HOST not set; counting analytics for every host"),
    }

    let state = Arc::new(AppState::new(settings, config, importer));
    let app = build_app(state);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {addr}: {e}"))?;
    log::info!("Listening on http://{addr}");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {e}");
            }
            log::info!("Shutting down");
        })
        .await?;

    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
