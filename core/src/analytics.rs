//! Visitor analytics: session counters and a rolling event buffer.
//!
//! Everything lives in process memory and resets on restart. The
//! server owns one store for its lifetime and hands it to handlers;
//! nothing here is global.

use crate::{
    error::{DeskError, DeskResult},
    types::{Millis, SessionId},
    visitor,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};

/// Events kept in the rolling buffer.
pub const RECENT_EVENT_CAP: usize = 100;
/// A session counts as active if seen within this window.
pub const ACTIVE_WINDOW_MS: Millis = 25_000;
pub const SUMMARY_SESSION_LIMIT: usize = 20;
pub const SUMMARY_EVENT_LIMIT: usize = 30;
/// A heartbeat session ends after this much silence.
pub const PRESENCE_IDLE_MS: Millis = 20_000;

/// Body posted by the tracking script.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEvent {
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub data: Value,
    /// Client timestamp; the server clock is used when absent or invalid.
    #[serde(default)]
    pub ts: Option<f64>,
}

/// What the server knows about the caller, derived from headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitorContext {
    pub ip_hash: String,
    pub device: String,
    pub browser: String,
}

impl VisitorContext {
    pub fn from_request(ip: &str, user_agent: &str) -> Self {
        Self {
            ip_hash: visitor::hash_ip(ip),
            device:  visitor::device(user_agent).to_string(),
            browser: visitor::browser(user_agent).to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub ip_hash: String,
    pub first_seen: Millis,
    pub last_seen: Millis,
    pub device: String,
    pub browser: String,
    pub referrer: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordedEvent {
    pub ts: Millis,
    pub session_id: SessionId,
    pub event: String,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub total_sessions: u64,
    pub active_sessions: usize,
    pub avg_duration_sec: u64,
    pub affiliate_clicks: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Breakdowns {
    pub devices: BTreeMap<String, u64>,
    pub browsers: BTreeMap<String, u64>,
    pub accounts: BTreeMap<String, u64>,
    pub referrers: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub now: Millis,
    pub totals: Totals,
    pub breakdowns: Breakdowns,
    pub recent_sessions: Vec<SessionRecord>,
    pub recent_events: Vec<RecordedEvent>,
}

/// The contract the tracking endpoints need from a store.
pub trait AnalyticsStore: Send {
    fn record_event(
        &mut self,
        visitor: &VisitorContext,
        event: TrackEvent,
        now: Millis,
    ) -> DeskResult<()>;

    /// Up to `limit` events, newest first.
    fn list_recent(&self, limit: usize) -> Vec<RecordedEvent>;

    fn summarize(&self, now: Millis) -> AnalyticsSummary;
}

#[derive(Debug)]
pub struct InMemoryAnalyticsStore {
    sessions: BTreeMap<SessionId, SessionRecord>,
    total_sessions: u64,
    affiliate_clicks: u64,
    breakdowns: Breakdowns,
    recent: VecDeque<RecordedEvent>,
}

impl Default for InMemoryAnalyticsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAnalyticsStore {
    pub fn new() -> Self {
        let devices = ["mobile", "desktop", "unknown"]
            .into_iter()
            .map(|d| (d.to_string(), 0))
            .collect();
        Self {
            sessions: BTreeMap::new(),
            total_sessions: 0,
            affiliate_clicks: 0,
            breakdowns: Breakdowns {
                devices,
                ..Breakdowns::default()
            },
            recent: VecDeque::with_capacity(RECENT_EVENT_CAP),
        }
    }

    pub fn session(&self, session_id: &str) -> Option<&SessionRecord> {
        self.sessions.get(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

fn bump(map: &mut BTreeMap<String, u64>, key: &str) {
    let key = if key.is_empty() { "unknown" } else { key };
    *map.entry(key.to_string()).or_insert(0) += 1;
}

fn non_empty_str<'a>(data: &'a Value, field: &str) -> Option<&'a str> {
    data.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

impl AnalyticsStore for InMemoryAnalyticsStore {
    fn record_event(
        &mut self,
        visitor: &VisitorContext,
        event: TrackEvent,
        now: Millis,
    ) -> DeskResult<()> {
        let session_id = event
            .session_id
            .filter(|s| !s.is_empty())
            .ok_or(DeskError::MissingField { field: "sessionId" })?;
        let name = event
            .event
            .filter(|s| !s.is_empty())
            .ok_or(DeskError::MissingField { field: "event" })?;
        let data = if event.data.is_null() {
            Value::Object(Default::default())
        } else {
            event.data
        };
        let ts = event
            .ts
            .filter(|t| t.is_finite() && *t > 0.0)
            .map(|t| t as Millis)
            .unwrap_or(now);

        match self.sessions.get_mut(&session_id) {
            Some(session) => session.last_seen = ts,
            None => {
                let referrer = non_empty_str(&data, "referrerDomain")
                    .unwrap_or("direct")
                    .to_string();
                self.total_sessions += 1;
                bump(&mut self.breakdowns.devices, &visitor.device);
                bump(&mut self.breakdowns.browsers, &visitor.browser);
                bump(&mut self.breakdowns.referrers, &referrer);
                log::debug!(
                    "analytics: new session {session_id} device={} browser={} referrer={referrer}",
                    visitor.device,
                    visitor.browser
                );
                self.sessions.insert(
                    session_id.clone(),
                    SessionRecord {
                        session_id: session_id.clone(),
                        ip_hash: visitor.ip_hash.clone(),
                        first_seen: ts,
                        last_seen: ts,
                        device: visitor.device.clone(),
                        browser: visitor.browser.clone(),
                        referrer,
                        duration_ms: 0,
                    },
                );
            }
        }

        match name.as_str() {
            "account_select" => {
                if let Some(account) = non_empty_str(&data, "account") {
                    bump(&mut self.breakdowns.accounts, account);
                }
            }
            "affiliate_click" => self.affiliate_clicks += 1,
            "session_end" => {
                let duration = data.get("durationMs").and_then(Value::as_f64);
                if let (Some(ms), Some(session)) = (duration, self.sessions.get_mut(&session_id)) {
                    session.duration_ms = ms.max(0.0) as u64;
                }
            }
            _ => {}
        }

        self.recent.push_back(RecordedEvent {
            ts,
            session_id,
            event: name,
            data,
        });
        while self.recent.len() > RECENT_EVENT_CAP {
            self.recent.pop_front();
        }
        Ok(())
    }

    fn list_recent(&self, limit: usize) -> Vec<RecordedEvent> {
        self.recent.iter().rev().take(limit).cloned().collect()
    }

    fn summarize(&self, now: Millis) -> AnalyticsSummary {
        let active_cutoff = now.saturating_sub(ACTIVE_WINDOW_MS);
        let active_sessions = self
            .sessions
            .values()
            .filter(|s| s.last_seen >= active_cutoff)
            .count();

        let durations: Vec<u64> = self
            .sessions
            .values()
            .map(|s| s.duration_ms)
            .filter(|d| *d > 0)
            .collect();
        let avg_duration_sec = if durations.is_empty() {
            0
        } else {
            let total: u64 = durations.iter().sum();
            (total as f64 / durations.len() as f64 / 1000.0).round() as u64
        };

        let mut recent_sessions: Vec<SessionRecord> = self.sessions.values().cloned().collect();
        recent_sessions.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        recent_sessions.truncate(SUMMARY_SESSION_LIMIT);

        AnalyticsSummary {
            now,
            totals: Totals {
                total_sessions: self.total_sessions,
                active_sessions,
                avg_duration_sec,
                affiliate_clicks: self.affiliate_clicks,
            },
            breakdowns: self.breakdowns.clone(),
            recent_sessions,
            recent_events: self.list_recent(SUMMARY_EVENT_LIMIT),
        }
    }
}

// ── Heartbeat presence ─────────────────────────────

#[derive(Debug, Clone)]
struct Presence {
    ip: String,
    start: Millis,
    last: Millis,
}

/// A heartbeat session that went quiet and was swept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndedVisit {
    pub session_id: SessionId,
    pub ip: String,
    pub duration_ms: u64,
}

impl EndedVisit {
    /// e.g. "3m 7s"
    pub fn duration_label(&self) -> String {
        let secs = self.duration_ms / 1000;
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// Tracks live visits from periodic pings and ends the idle ones.
#[derive(Debug)]
pub struct PresenceTracker {
    sessions: BTreeMap<SessionId, Presence>,
    idle_after_ms: Millis,
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(PRESENCE_IDLE_MS)
    }
}

impl PresenceTracker {
    pub fn new(idle_after_ms: Millis) -> Self {
        Self {
            sessions: BTreeMap::new(),
            idle_after_ms,
        }
    }

    /// Touch `session_id`, then end every visit idle past the threshold.
    pub fn heartbeat(&mut self, session_id: &str, ip: &str, now: Millis) -> Vec<EndedVisit> {
        self.sessions
            .entry(session_id.to_string())
            .and_modify(|p| p.last = now)
            .or_insert_with(|| Presence {
                ip: ip.to_string(),
                start: now,
                last: now,
            });

        let idle: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, p)| now.saturating_sub(p.last) > self.idle_after_ms)
            .map(|(id, _)| id.clone())
            .collect();

        idle.into_iter()
            .filter_map(|id| {
                self.sessions.remove(&id).map(|p| EndedVisit {
                    session_id: id,
                    ip: p.ip,
                    duration_ms: p.last.saturating_sub(p.start),
                })
            })
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.sessions.len()
    }
}
