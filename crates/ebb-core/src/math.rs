//! Integer pro-rata helpers.
//!
//! Shares are always rounded toward the pool: the sum of shares handed out
//! never exceeds the amount being divided.

use crate::constants::PENALTY_WEEKS;

/// `amount * part / whole`, rounded down.
///
/// `part` is clamped to `whole`, so the result never exceeds `amount`.
/// Returns 0 when any operand is zero. Exact while `whole < 2^64`; above
/// that both operands are scaled down (numerator floored, denominator
/// ceiled) so the u128 product cannot overflow and the share can only
/// round down.
pub fn pro_rata(amount: u64, part: u128, whole: u128) -> u64 {
    if amount == 0 || part == 0 || whole == 0 {
        return 0;
    }
    let mut part = part.min(whole);
    let mut whole = whole;
    let bits = 128 - whole.leading_zeros();
    if bits > 64 {
        let shift = bits - 64;
        let mask = (1u128 << shift) - 1;
        part >>= shift;
        whole = (whole >> shift) + u128::from(whole & mask != 0);
    }
    // amount < 2^64 and part <= whole <= 2^64, so the product fits.
    (amount as u128 * part / whole) as u64
}

/// Early-exit penalty on `principal` with `weeks` of lock left.
pub fn early_exit_penalty(principal: u64, weeks: u16) -> u64 {
    pro_rata(principal, weeks as u128, PENALTY_WEEKS as u128)
}
