//! Trade import relay: hand a broker CSV to the import service,
//! wait for it to finish processing, and pull back the enriched export.
//!
//! STATES:
//!   Submitted → Polling(1) → … → Polling(max) → TimedOut
//!                  └──────── "completed" ───────→ Completed
//!   any non-terminal state ── transport error ──→ Failed
//!
//! Waiting goes through a `Sleeper`, never a direct timer, so the full
//! poll schedule runs instantly under a manual clock.

use crate::{
    clock::Sleeper,
    error::{DeskError, DeskResult},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 15;

/// One row of the export, keyed by CSV header.
pub type TradeRow = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Response to an upload. The service reports ids as numbers or strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadReceipt {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub import_id: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl UploadReceipt {
    pub fn import_id(&self) -> Option<String> {
        match self.import_id.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportStatus {
    #[serde(default)]
    pub status: String,
}

impl ImportStatus {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }
}

/// The third-party import service.
#[async_trait]
pub trait TradeImportApi: Send + Sync {
    async fn upload(&self, file: &UploadFile) -> DeskResult<UploadReceipt>;
    async fn status(&self, import_id: &str) -> DeskResult<ImportStatus>;
    async fn export_csv(&self) -> DeskResult<String>;
}

#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ImportState {
    Submitted { import_id: String },
    Polling { import_id: String, attempt: u32 },
    Completed { import_id: String },
    TimedOut { import_id: String, attempts: u32 },
    Failed { reason: String },
}

impl ImportState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImportState::Completed { .. } | ImportState::TimedOut { .. } | ImportState::Failed { .. }
        )
    }

    pub fn import_id(&self) -> Option<&str> {
        match self {
            ImportState::Submitted { import_id }
            | ImportState::Polling { import_id, .. }
            | ImportState::Completed { import_id }
            | ImportState::TimedOut { import_id, .. } => Some(import_id.as_str()),
            ImportState::Failed { .. } => None,
        }
    }
}

/// Bounded-retry state machine for a single import.
#[derive(Debug, Clone)]
pub struct ImportJob {
    state: ImportState,
    max_attempts: u32,
}

impl ImportJob {
    /// Start from the upload response. A receipt without success or id fails.
    pub fn from_receipt(receipt: &UploadReceipt, policy: &PollPolicy) -> Self {
        let state = match receipt.import_id() {
            Some(import_id) if receipt.success => ImportState::Submitted { import_id },
            _ => ImportState::Failed {
                reason: format!(
                    "upload rejected: {}",
                    serde_json::to_string(receipt).unwrap_or_default()
                ),
            },
        };
        Self {
            state,
            max_attempts: policy.max_attempts,
        }
    }

    pub fn state(&self) -> &ImportState {
        &self.state
    }

    /// Move to the next poll attempt, returning the id to query.
    /// Returns None once terminal; exhausting attempts moves to TimedOut.
    pub fn next_poll(&mut self) -> Option<String> {
        let (import_id, attempt) = match &self.state {
            ImportState::Submitted { import_id } => (import_id.clone(), 0),
            ImportState::Polling { import_id, attempt } => (import_id.clone(), *attempt),
            _ => return None,
        };
        if attempt >= self.max_attempts {
            self.state = ImportState::TimedOut { import_id, attempts: attempt };
            return None;
        }
        self.state = ImportState::Polling {
            import_id: import_id.clone(),
            attempt: attempt + 1,
        };
        Some(import_id)
    }

    pub fn on_status(&mut self, status: &ImportStatus) {
        if let ImportState::Polling { import_id, .. } = &self.state {
            if status.is_completed() {
                self.state = ImportState::Completed { import_id: import_id.clone() };
            }
        }
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        if !matches!(self.state, ImportState::Failed { .. }) {
            self.state = ImportState::Failed { reason: reason.into() };
        }
    }
}

/// Outcome of a full relay run.
#[derive(Debug, Clone)]
pub struct ImportRun {
    pub state: ImportState,
    pub status_checks: u32,
    pub trades: Vec<TradeRow>,
}

/// Upload, poll until done or out of attempts, then fetch and parse the export.
pub async fn run_import<A, S>(
    api: &A,
    sleeper: &S,
    policy: &PollPolicy,
    file: &UploadFile,
) -> ImportRun
where
    A: TradeImportApi + ?Sized,
    S: Sleeper + ?Sized,
{
    let receipt = match api.upload(file).await {
        Ok(r) => r,
        Err(e) => {
            log::warn!("import: upload of {} failed: {e}", file.file_name);
            return ImportRun {
                state: ImportState::Failed { reason: e.to_string() },
                status_checks: 0,
                trades: Vec::new(),
            };
        }
    };

    let mut job = ImportJob::from_receipt(&receipt, policy);
    if let ImportState::Submitted { import_id } = job.state() {
        log::info!("import: {} accepted as {import_id}", file.file_name);
    }

    let mut status_checks = 0;
    while let Some(import_id) = job.next_poll() {
        sleeper.sleep(policy.interval).await;
        status_checks += 1;
        match api.status(&import_id).await {
            Ok(status) => {
                log::debug!("import: status check #{status_checks} for {import_id}: {}", status.status);
                job.on_status(&status);
                if job.state().is_terminal() {
                    break;
                }
            }
            Err(e) => {
                log::warn!("import: status check for {import_id} failed: {e}");
                job.fail(e.to_string());
            }
        }
    }

    let mut trades = Vec::new();
    if let ImportState::Completed { import_id } = job.state().clone() {
        match api.export_csv().await.and_then(|csv| parse_trade_csv(&csv)) {
            Ok(rows) => {
                log::info!("import: {import_id} exported {} trades", rows.len());
                trades = rows;
            }
            Err(e) => {
                log::warn!("import: export for {import_id} failed: {e}");
                job.fail(e.to_string());
            }
        }
    } else if let ImportState::TimedOut { import_id, attempts } = job.state() {
        log::warn!("import: {import_id} not completed after {attempts} checks");
    }

    ImportRun {
        state: job.state().clone(),
        status_checks,
        trades,
    }
}

/// Parse the export into rows keyed by header. Blank lines are skipped,
/// short rows keep only the columns they have, extra cells are dropped.
pub fn parse_trade_csv(content: &str) -> DeskResult<Vec<TradeRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(DeskError::ImportService("export has no header row".to_string()));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let row: TradeRow = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}
