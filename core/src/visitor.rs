//! Visitor heuristics: where a request comes from and what sent it.
//!
//! These are substring checks on request headers, nothing more.
//! They decide which traffic is worth counting; they are not security.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

const BROWSER_MARKERS: [&str; 6] = ["Chrome", "Firefox", "Safari", "Edge", "Mobile", "Mozilla"];
const PLATFORM_MARKERS: [&str; 4] = ["Vercel", "node-fetch", "Next.js", "curl"];
const HEALTH_CHECK_MARKERS: [&str; 4] = ["Health", "ELB", "Monitor", "Uptime"];
const MOBILE_MARKERS: [&str; 4] = ["mobile", "android", "iphone", "ipad"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientKind {
    Human,
    VercelEdge,
    HealthCheck,
    Other,
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClientKind::Human       => "HUMAN",
            ClientKind::VercelEdge  => "VERCEL_EDGE",
            ClientKind::HealthCheck => "HEALTH_CHECK",
            ClientKind::Other       => "OTHER",
        };
        f.write_str(s)
    }
}

/// First entry of `X-Forwarded-For`, else the socket address.
pub fn client_ip(forwarded_for: Option<&str>, remote: Option<&str>) -> String {
    forwarded_for
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or(remote.filter(|v| !v.is_empty()))
        .unwrap_or("unknown")
        .to_string()
}

/// Short, non-reversible tag for an address: first 8 hex chars of SHA-256.
pub fn hash_ip(ip: &str) -> String {
    let digest = Sha256::digest(ip.as_bytes());
    digest
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect()
}

pub fn is_browser(user_agent: &str) -> bool {
    BROWSER_MARKERS.iter().any(|m| user_agent.contains(m))
}

pub fn classify(user_agent: &str) -> ClientKind {
    if is_browser(user_agent) {
        ClientKind::Human
    } else if PLATFORM_MARKERS.iter().any(|m| user_agent.contains(m)) {
        ClientKind::VercelEdge
    } else if HEALTH_CHECK_MARKERS.iter().any(|m| user_agent.contains(m)) {
        ClientKind::HealthCheck
    } else {
        ClientKind::Other
    }
}

/// "mobile", "desktop" or "unknown".
pub fn device(user_agent: &str) -> &'static str {
    let ua = user_agent.to_ascii_lowercase();
    if MOBILE_MARKERS.iter().any(|m| ua.contains(m)) {
        "mobile"
    } else if ua.is_empty() {
        "unknown"
    } else {
        "desktop"
    }
}

pub fn browser(user_agent: &str) -> &'static str {
    let ua = user_agent.to_ascii_lowercase();
    // Edge and Chrome both carry "Chrome"; Chrome and Safari both carry "Safari".
    if ua.contains("firefox") {
        "Firefox"
    } else if ua.contains("edg/") {
        "Edge"
    } else if ua.contains("chrome") {
        "Chrome"
    } else if ua.contains("safari") {
        "Safari"
    } else if ua.is_empty() {
        "Unknown"
    } else {
        "Other"
    }
}
