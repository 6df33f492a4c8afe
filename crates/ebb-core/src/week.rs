//! Conversion between Unix timestamps and ledger week indices.
//!
//! Week `n` spans `[epoch_start + n * SECONDS_PER_WEEK, epoch_start + (n + 1) * SECONDS_PER_WEEK)`.
//! Indices past [`MAX_WEEK`] are an error, never a wrap.

use crate::constants::{MAX_WEEK, SECONDS_PER_WEEK};
use crate::error::ArithmeticError;
use crate::types::Week;

/// The week containing `timestamp`.
///
/// # Errors
///
/// - [`ArithmeticError::BeforeEpoch`] if `timestamp < epoch_start`
/// - [`ArithmeticError::WeekOverflow`] if the index exceeds [`MAX_WEEK`]
pub fn week_at(timestamp: u64, epoch_start: u64) -> Result<Week, ArithmeticError> {
    let elapsed = timestamp
        .checked_sub(epoch_start)
        .ok_or(ArithmeticError::BeforeEpoch { timestamp, epoch_start })?;
    let week = elapsed / SECONDS_PER_WEEK;
    if week > MAX_WEEK as u64 {
        return Err(ArithmeticError::WeekOverflow(week));
    }
    Ok(week as Week)
}

/// First second of `week`.
pub fn week_start(week: Week, epoch_start: u64) -> u64 {
    epoch_start.saturating_add(week as u64 * SECONDS_PER_WEEK)
}

/// `week + weeks`, failing past the horizon.
pub fn checked_week_add(week: Week, weeks: u16) -> Result<Week, ArithmeticError> {
    week.checked_add(weeks)
        .ok_or(ArithmeticError::WeekOverflow(week as u64 + weeks as u64))
}
