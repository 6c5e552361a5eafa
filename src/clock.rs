//! Time sources.
//!
//! `SystemClock` follows real time. `ManualClock` only moves when advanced, which
//! is what the headless driver and the tests use to keep timers deterministic.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime};

pub trait Clock: Send + Sync {
    /// Current monotonic instant.
    fn now(&self) -> Instant;

    /// Wall-clock milliseconds since the UNIX epoch.
    fn unix_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> i64 {
        system_unix_millis()
    }
}

/// Clock advanced explicitly by the caller.
pub struct ManualClock {
    state: Mutex<(Instant, i64)>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new((Instant::now(), system_unix_millis())),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.0 += duration;
        state.1 += duration.as_millis() as i64;
    }

    pub fn advance_secs(&self, seconds: f32) {
        self.advance(Duration::from_secs_f32(seconds.max(0.0)));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).0
    }

    fn unix_millis(&self) -> i64 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).1
    }
}

fn system_unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
