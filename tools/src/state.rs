//! Shared application state passed to all route handlers.

use crate::settings::ServerSettings;
use async_trait::async_trait;
use payout_core::{
    analytics::{AnalyticsStore, InMemoryAnalyticsStore, PresenceTracker},
    clock::{Clock, Sleeper, SystemClock},
    config::PolicyConfig,
    import::TradeImportApi,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub struct AppState {
    pub settings: ServerSettings,
    pub config: PolicyConfig,
    pub analytics: Mutex<Box<dyn AnalyticsStore>>,
    pub presence: Mutex<PresenceTracker>,
    pub clock: Arc<dyn Clock>,
    pub sleeper: Arc<dyn Sleeper>,
    /// None when no import service key is configured.
    pub importer: Option<Arc<dyn TradeImportApi>>,
}

impl AppState {
    /// Production wiring: wall clock, tokio timers, in-memory analytics.
    pub fn new(
        settings: ServerSettings,
        config: PolicyConfig,
        importer: Option<Arc<dyn TradeImportApi>>,
    ) -> Self {
        Self {
            settings,
            config,
            analytics: Mutex::new(Box::new(InMemoryAnalyticsStore::new())),
            presence: Mutex::new(PresenceTracker::default()),
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
            importer,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>, sleeper: Arc<dyn Sleeper>) -> Self {
        self.clock = clock;
        self.sleeper = sleeper;
        self
    }

    pub fn now(&self) -> u64 {
        self.clock.now_millis()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
