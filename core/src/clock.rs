//! Time sources: wall clock for the server, manual clock for tests.
//!
//! RULE: Nothing outside this module reads the system time directly.
//! Stores take `now` as an argument; the import relay waits through
//! a `Sleeper`, so tests can run the whole poll schedule instantly.

use crate::types::Millis;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> Millis;
}

/// Waits between polls of a remote service.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> Millis {
        chrono::Utc::now().timestamp_millis().max(0) as Millis
    }
}

/// A clock that only moves when told to. Sleeping advances it.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
    sleeps: AtomicU64,
}

impl ManualClock {
    pub fn starting_at(now: Millis) -> Self {
        Self {
            now: AtomicU64::new(now),
            sleeps: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) -> Millis {
        let by = by.as_millis() as u64;
        self.now.fetch_add(by, Ordering::SeqCst) + by
    }

    pub fn set(&self, now: Millis) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// How many times `sleep` has been awaited.
    pub fn sleep_count(&self) -> u64 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> Millis {
        self.now.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sleeper for ManualClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        self.advance(duration);
    }
}
