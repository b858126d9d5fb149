//! Injected wall-clock and sleep capability.
//!
//! The poll loop and retry orchestrator wait for an external, unobservable
//! event within a bound; injecting the clock lets tests simulate elapsed
//! time instead of depending on real wall-clock delay.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Local};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[async_trait]
pub trait Clock: Send + Sync {
    /// The current local wall-clock instant. Local because the feed renders
    /// completion times in the viewer's local 12-hour clock.
    fn now(&self) -> DateTime<Local>;

    /// Suspend for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Production clock: `chrono::Local` + `tokio::time::sleep`.
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Deterministic clock for tests: `sleep` advances a virtual instant and
/// never suspends, so timing properties are exact.
#[derive(Clone)]
pub struct SimClock {
    now: Arc<Mutex<DateTime<Local>>>,
}

impl SimClock {
    pub fn starting_at(start: DateTime<Local>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Advance the virtual clock without sleeping.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().expect("sim clock poisoned");
        *now += ChronoDuration::from_std(duration).expect("duration out of range");
    }
}

#[async_trait]
impl Clock for SimClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().expect("sim clock poisoned")
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
