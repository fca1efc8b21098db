//! Monotonic time source
//!
//! Timestamps are microseconds since an application-wide anchor, so they fit in
//! an `AtomicU64`, never go backwards and ignore wall-clock adjustments.
//! `0` is reserved to mean "never stamped".

use std::sync::OnceLock;
use std::time::Instant;

#[cfg(any(test, feature = "mock"))]
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Global anchor point for monotonic time
static APP_START: OnceLock<Instant> = OnceLock::new();

/// Microseconds since app start, never `0`
pub fn monotonic_micros() -> u64 {
    let start = APP_START.get_or_init(Instant::now);
    (start.elapsed().as_micros() as u64).max(1)
}

/// Milliseconds since app start
pub fn monotonic_millis() -> u64 {
    monotonic_micros() / 1000
}

/// Time source shared by the actuation writer and the motor controller
pub trait Clock: Send + Sync {
    fn now_micros(&self) -> u64;
}

/// Process-wide monotonic clock
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now_micros(&self) -> u64 {
        monotonic_micros()
    }
}

/// Manually driven clock for deterministic watchdog tests
///
/// Clones share the same time.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

#[cfg(any(test, feature = "mock"))]
impl ManualClock {
    pub fn new(start_micros: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_micros)),
        }
    }

    pub fn set_micros(&self, micros: u64) {
        self.now.store(micros, Ordering::SeqCst);
    }

    pub fn advance(&self, by: std::time::Duration) {
        self.now.fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "mock"))]
impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
