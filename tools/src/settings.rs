//! Server settings, read from the environment.
//!
//!   DESK_HOST              bind address            (default 127.0.0.1)
//!   DESK_PORT              bind port               (default 8080)
//!   DESK_REAL_HOST         only count traffic for this Host header
//!   DESK_ADMIN_TOKEN       shared secret for /api/admin-stats
//!   TRADESVIZ_API_KEY      import service token; uploads disabled when unset
//!   TRADESVIZ_BASE_URL     import service root     (default https://api.tradesviz.com)
//!   DESK_POLL_INTERVAL_MS  wait between status checks
//!   DESK_POLL_ATTEMPTS     status checks before giving up

use payout_core::import::PollPolicy;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TRADESVIZ_URL: &str = "https://api.tradesviz.com";

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// When set, analytics ignore requests for any other Host.
    pub real_host: Option<String>,
    pub admin_token: Option<String>,
    pub tradesviz_api_key: Option<String>,
    pub tradesviz_base_url: String,
    pub poll: PollPolicy,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            real_host: None,
            admin_token: None,
            tradesviz_api_key: None,
            tradesviz_base_url: DEFAULT_TRADESVIZ_URL.to_string(),
            poll: PollPolicy::default(),
        }
    }
}

impl ServerSettings {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let port = match env_var("DESK_PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|e| anyhow::anyhow!("DESK_PORT '{raw}' is not a port: {e}"))?,
            None => defaults.port,
        };
        let interval = match env_var("DESK_POLL_INTERVAL_MS") {
            Some(raw) => Duration::from_millis(
                raw.parse()
                    .map_err(|e| anyhow::anyhow!("DESK_POLL_INTERVAL_MS '{raw}': {e}"))?,
            ),
            None => defaults.poll.interval,
        };
        let max_attempts = match env_var("DESK_POLL_ATTEMPTS") {
            Some(raw) => raw
                .parse()
                .map_err(|e| anyhow::anyhow!("DESK_POLL_ATTEMPTS '{raw}': {e}"))?,
            None => defaults.poll.max_attempts,
        };

        Ok(Self {
            host: env_var("DESK_HOST").unwrap_or(defaults.host),
            port,
            real_host: env_var("DESK_REAL_HOST"),
            admin_token: env_var("DESK_ADMIN_TOKEN"),
            tradesviz_api_key: env_var("TRADESVIZ_API_KEY"),
            tradesviz_base_url: env_var("TRADESVIZ_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.tradesviz_base_url),
            poll: PollPolicy { interval, max_attempts },
        })
    }

    /// True if `host` is the one analytics should count.
    pub fn is_real_host(&self, host: &str) -> bool {
        self.real_host.as_deref().map_or(true, |real| real == host)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
