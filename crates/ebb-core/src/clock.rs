//! Clock implementations: wall time for production, a settable clock for tests.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use crate::constants::SECONDS_PER_WEEK;
use crate::traits::Clock;

/// Wall-clock time from the system, via chrono.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        Utc::now().timestamp().max(0) as u64
    }
}

/// A clock that only moves when told to.
///
/// Share it behind an `Arc` to drive a ledger through simulated weeks.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self { now: AtomicU64::new(now) }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: u64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }

    pub fn advance_weeks(&self, weeks: u64) {
        self.advance(weeks * SECONDS_PER_WEEK);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
