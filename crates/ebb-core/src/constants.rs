//! Protocol constants. All amounts are in base units (1 EBB = 10^8 units).

use crate::types::Week;

/// Base units per whole token.
pub const COIN: u64 = 100_000_000;

/// Length of one ledger week in seconds.
pub const SECONDS_PER_WEEK: u64 = 7 * 24 * 60 * 60;

/// Highest representable week index.
pub const MAX_WEEK: Week = Week::MAX;

/// Shortest lock duration, in weeks.
pub const MIN_LOCK_WEEKS: u16 = 1;

/// Longest lock duration, in weeks.
pub const MAX_LOCK_WEEKS: u16 = 52;

/// Denominator of the early-exit penalty: `principal * weeks / PENALTY_WEEKS`.
pub const PENALTY_WEEKS: u64 = 52;

/// Default floor for a new lock.
pub const DEFAULT_MIN_LOCK_AMOUNT: u64 = COIN;

/// Default ledger epoch (Unix seconds). Week 0 starts here.
pub const DEFAULT_EPOCH_START: u64 = 0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_is_seven_days() {
        assert_eq!(SECONDS_PER_WEEK, 604_800);
    }

    #[test]
    fn lock_range_is_sane() {
        assert!(MIN_LOCK_WEEKS >= 1);
        assert!(MIN_LOCK_WEEKS <= MAX_LOCK_WEEKS);
        assert_eq!(PENALTY_WEEKS, MAX_LOCK_WEEKS as u64);
    }
}
