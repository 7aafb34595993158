use payout_core::{
    analytics::{
        AnalyticsStore, InMemoryAnalyticsStore, PresenceTracker, TrackEvent, VisitorContext,
        RECENT_EVENT_CAP, SUMMARY_EVENT_LIMIT, SUMMARY_SESSION_LIMIT,
    },
    error::DeskError,
};
use serde_json::json;

const CHROME_DESKTOP: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
const SAFARI_IPHONE: &str =
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Version/17.0 Mobile/15E148 Safari/604.1";

fn event(session: &str, name: &str, data: serde_json::Value) -> TrackEvent {
    TrackEvent {
        session_id: Some(session.to_string()),
        event: Some(name.to_string()),
        data,
        ts: None,
    }
}

fn desktop() -> VisitorContext {
    VisitorContext::from_request("203.0.113.7", CHROME_DESKTOP)
}

#[test]
fn first_event_opens_a_session_and_bumps_counters() {
    let mut store = InMemoryAnalyticsStore::new();
    store
        .record_event(&desktop(), event("s1", "page_view", json!({ "referrerDomain": "reddit.com" })), 1_000)
        .unwrap();
    store
        .record_event(&desktop(), event("s1", "page_view", json!({})), 4_000)
        .unwrap();

    let session = store.session("s1").expect("session created");
    assert_eq!(session.first_seen, 1_000);
    assert_eq!(session.last_seen, 4_000);
    assert_eq!(session.device, "desktop");
    assert_eq!(session.browser, "Chrome");
    assert_eq!(session.referrer, "reddit.com");
    assert_eq!(session.ip_hash.len(), 8);

    let summary = store.summarize(5_000);
    assert_eq!(summary.totals.total_sessions, 1);
    assert_eq!(summary.breakdowns.devices["desktop"], 1);
    assert_eq!(summary.breakdowns.devices["mobile"], 0);
    assert_eq!(summary.breakdowns.browsers["Chrome"], 1);
    assert_eq!(summary.breakdowns.referrers["reddit.com"], 1);
}

#[test]
fn referrer_defaults_to_direct() {
    let mut store = InMemoryAnalyticsStore::new();
    let mobile = VisitorContext::from_request("198.51.100.2", SAFARI_IPHONE);
    store.record_event(&mobile, event("m1", "page_view", serde_json::Value::Null), 10).unwrap();
    let summary = store.summarize(10);
    assert_eq!(summary.breakdowns.referrers["direct"], 1);
    assert_eq!(summary.breakdowns.devices["mobile"], 1);
    assert_eq!(summary.breakdowns.browsers["Safari"], 1);
}

#[test]
fn event_specific_counters() {
    let mut store = InMemoryAnalyticsStore::new();
    let v = desktop();
    store.record_event(&v, event("s1", "account_select", json!({ "account": "50K" })), 1).unwrap();
    store.record_event(&v, event("s1", "account_select", json!({ "account": "50K" })), 2).unwrap();
    store.record_event(&v, event("s1", "account_select", json!({})), 3).unwrap();
    store.record_event(&v, event("s1", "affiliate_click", json!({})), 4).unwrap();
    store.record_event(&v, event("s1", "session_end", json!({ "durationMs": 42_000 })), 5).unwrap();

    assert_eq!(store.session("s1").unwrap().duration_ms, 42_000);
    let summary = store.summarize(10);
    assert_eq!(summary.breakdowns.accounts.len(), 1);
    assert_eq!(summary.breakdowns.accounts["50K"], 2);
    assert_eq!(summary.totals.affiliate_clicks, 1);
    assert_eq!(summary.totals.avg_duration_sec, 42);
}

#[test]
fn missing_session_or_event_is_rejected() {
    let mut store = InMemoryAnalyticsStore::new();
    let no_session = TrackEvent { event: Some("page_view".into()), ..TrackEvent::default() };
    let no_event = TrackEvent { session_id: Some("s1".into()), ..TrackEvent::default() };

    assert!(matches!(
        store.record_event(&desktop(), no_session, 1),
        Err(DeskError::MissingField { field: "sessionId" })
    ));
    assert!(matches!(
        store.record_event(&desktop(), no_event, 1),
        Err(DeskError::MissingField { field: "event" })
    ));
    assert_eq!(store.session_count(), 0);
    assert!(store.list_recent(10).is_empty());
}

#[test]
fn client_timestamp_is_used_when_valid() {
    let mut store = InMemoryAnalyticsStore::new();
    let mut e = event("s1", "page_view", json!({}));
    e.ts = Some(123_456.0);
    store.record_event(&desktop(), e, 999_999).unwrap();
    assert_eq!(store.list_recent(1)[0].ts, 123_456);

    let mut bad = event("s1", "page_view", json!({}));
    bad.ts = Some(-5.0);
    store.record_event(&desktop(), bad, 999_999).unwrap();
    assert_eq!(store.list_recent(1)[0].ts, 999_999);
}

#[test]
fn event_buffer_keeps_the_latest_hundred() {
    let mut store = InMemoryAnalyticsStore::new();
    for i in 0..(RECENT_EVENT_CAP as u64 + 25) {
        store
            .record_event(&desktop(), event("s1", &format!("e{i}"), json!({})), i)
            .unwrap();
    }
    let all = store.list_recent(usize::MAX);
    assert_eq!(all.len(), RECENT_EVENT_CAP);
    assert_eq!(all[0].event, "e124");
    assert_eq!(all.last().unwrap().event, "e25");

    let summary = store.summarize(200);
    assert_eq!(summary.recent_events.len(), SUMMARY_EVENT_LIMIT);
    assert_eq!(summary.recent_events[0].event, "e124");
}

#[test]
fn summary_windows_and_ordering() {
    let mut store = InMemoryAnalyticsStore::new();
    for i in 0..30u64 {
        store
            .record_event(&desktop(), event(&format!("s{i:02}"), "page_view", json!({})), i * 1_000)
            .unwrap();
    }
    // now = 50s: sessions last seen at ≥ 25s are active (s25..s29).
    let summary = store.summarize(50_000);
    assert_eq!(summary.totals.total_sessions, 30);
    assert_eq!(summary.totals.active_sessions, 5);
    assert_eq!(summary.totals.avg_duration_sec, 0);
    assert_eq!(summary.recent_sessions.len(), SUMMARY_SESSION_LIMIT);
    assert_eq!(summary.recent_sessions[0].session_id, "s29");
    assert!(summary
        .recent_sessions
        .windows(2)
        .all(|w| w[0].last_seen >= w[1].last_seen));
}

#[test]
fn average_duration_ignores_sessions_without_one() {
    let mut store = InMemoryAnalyticsStore::new();
    let v = desktop();
    store.record_event(&v, event("a", "session_end", json!({ "durationMs": 10_000 })), 1).unwrap();
    store.record_event(&v, event("b", "session_end", json!({ "durationMs": 21_000 })), 1).unwrap();
    store.record_event(&v, event("c", "page_view", json!({})), 1).unwrap();
    // (10s + 21s) / 2 = 15.5s → 16
    assert_eq!(store.summarize(2).totals.avg_duration_sec, 16);
}

#[test]
fn presence_sweeps_idle_visits() {
    let mut tracker = PresenceTracker::default();
    assert!(tracker.heartbeat("a", "10.0.0.1", 0).is_empty());
    assert!(tracker.heartbeat("a", "10.0.0.1", 65_000 - 20_000).is_empty());
    assert!(tracker.heartbeat("b", "10.0.0.2", 50_000).is_empty());

    // "a" last seen at 45s; at 65.001s it has been idle > 20s.
    let ended = tracker.heartbeat("b", "10.0.0.2", 65_001);
    assert_eq!(ended.len(), 1);
    assert_eq!(ended[0].session_id, "a");
    assert_eq!(ended[0].ip, "10.0.0.1");
    assert_eq!(ended[0].duration_ms, 45_000);
    assert_eq!(ended[0].duration_label(), "0m 45s");
    assert_eq!(tracker.live_count(), 1);
}

#[test]
fn presence_keeps_visits_at_exactly_the_threshold() {
    let mut tracker = PresenceTracker::new(20_000);
    tracker.heartbeat("a", "10.0.0.1", 0);
    assert!(tracker.heartbeat("b", "10.0.0.2", 20_000).is_empty());
    assert_eq!(tracker.live_count(), 2);
}
