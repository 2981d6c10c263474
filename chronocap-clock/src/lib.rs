//! Clock abstraction for chronocap.
//!
//! Provides a trait for reading wall-clock time at second and millisecond
//! granularity, with both real and mock implementations to enable
//! deterministic testing of interval bookkeeping and merge timing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Trait for reading the current Unix time.
pub trait Clock: Send + Sync {
    /// Returns the current time as Unix seconds since epoch.
    fn now_unix_sec(&self) -> u64;

    /// Returns the current time as Unix milliseconds since epoch.
    ///
    /// Used for timing merge passes; second granularity is too coarse for
    /// a merge that usually completes in well under a second.
    fn now_unix_msec(&self) -> u64;
}

/// Real system clock implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_sec(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before Unix epoch")
            .as_secs()
    }

    fn now_unix_msec(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before Unix epoch")
            .as_millis() as u64
    }
}

/// Mock clock for testing.
///
/// Starts at a fixed timestamp and can be advanced explicitly.
#[derive(Debug)]
pub struct MockClock {
    msec: AtomicU64,
}

impl MockClock {
    /// Create a mock clock fixed at the given Unix second.
    pub fn new(timestamp_sec: u64) -> Self {
        Self {
            msec: AtomicU64::new(timestamp_sec * 1000),
        }
    }

    /// Create a mock clock fixed at the given Unix millisecond.
    pub fn at_msec(timestamp_msec: u64) -> Self {
        Self {
            msec: AtomicU64::new(timestamp_msec),
        }
    }

    /// Advance the clock by the given number of milliseconds.
    pub fn advance_msec(&self, delta: u64) {
        self.msec.fetch_add(delta, Ordering::SeqCst);
    }

    /// Advance the clock by the given number of seconds.
    pub fn advance_sec(&self, delta: u64) {
        self.advance_msec(delta * 1000);
    }
}

impl Clock for MockClock {
    fn now_unix_sec(&self) -> u64 {
        self.msec.load(Ordering::SeqCst) / 1000
    }

    fn now_unix_msec(&self) -> u64 {
        self.msec.load(Ordering::SeqCst)
    }
}
