//! Core ledger types: weeks, accounts, lock positions, weight snapshots.
//!
//! Amounts are `u64` base units. Weights are `amount * weeks` and carried as
//! `u128`, as are global totals.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{DEFAULT_EPOCH_START, DEFAULT_MIN_LOCK_AMOUNT};

/// Week index counted from the ledger epoch.
pub type Week = u16;

/// A 32-byte account identifier.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    /// The zero account.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create an AccountId from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive a stable account id from a human-readable label (BLAKE3 of the label).
    ///
    /// Used by configuration files and simulation scenarios, where accounts
    /// are named rather than keyed.
    pub fn from_label(label: &str) -> Self {
        Self(blake3::hash(label.as_bytes()).into())
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for AccountId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl From<[u8; 32]> for AccountId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Privileged roles checked by the composition layer before admin operations.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Reconfigures the ledger and names the penalty receiver.
    Admin,
    /// Withdraws accrued early-exit penalties.
    PenaltyManager,
    /// Withdraws funds from the reward reservoir.
    RewardManager,
}

/// A single account's lock. At most one is active per account.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct LockPosition {
    /// Principal held by the lock vault. Zero once claimed.
    pub locked_amount: u64,
    /// Week from which the current duration counts.
    pub lock_start_week: Week,
    /// Configured duration in weeks.
    pub lock_weeks: u16,
    /// Auto-locked positions keep a frozen weight and never expire.
    pub auto_lock: bool,
    /// Unix timestamp of the lock's creation.
    pub lock_timestamp: u64,
}

impl LockPosition {
    pub fn is_active(&self) -> bool {
        self.locked_amount > 0
    }

    /// Week at which a decaying lock reaches zero weight.
    pub fn unlock_week(&self) -> Week {
        self.lock_start_week.saturating_add(self.lock_weeks)
    }

    /// Whether a decaying lock has reached its unlock week. Auto-locks never expire.
    pub fn is_expired(&self, current: Week) -> bool {
        !self.auto_lock && current >= self.unlock_week()
    }

    /// Weeks of weight left at `current`. Auto-locks report their configured duration.
    pub fn remaining_weeks(&self, current: Week) -> u16 {
        if self.auto_lock {
            self.lock_weeks
        } else {
            self.unlock_week().saturating_sub(current)
        }
    }

    /// Weight this position carries at `current`.
    pub fn weight(&self, current: Week) -> u128 {
        if !self.is_active() {
            return 0;
        }
        self.locked_amount as u128 * self.remaining_weeks(current) as u128
    }

    pub fn status(&self, current: Week) -> LockStatus {
        if self.auto_lock {
            LockStatus::AutoLocked
        } else if self.is_expired(current) {
            LockStatus::Claimable
        } else {
            LockStatus::Locked
        }
    }
}

/// A point in an account's weight history.
///
/// Between two snapshots weight is derived: a decaying snapshot loses
/// `locked_amount` weight per week, an auto-lock snapshot holds steady.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct WeightSnapshot {
    pub week: Week,
    /// Principal that decays from this week on (zero once the lock expires).
    pub locked_amount: u64,
    pub weight: u128,
    /// Principal held in auto-lock; non-zero marks a frozen-weight snapshot.
    pub auto_lock_amount: u64,
}

impl WeightSnapshot {
    /// The snapshot `position` contributes at `week`.
    ///
    /// Inactive and expired positions contribute nothing.
    pub fn of(position: &LockPosition, week: Week) -> Self {
        if !position.is_active() || position.is_expired(week) {
            return Self::zero(week);
        }
        Self {
            week,
            locked_amount: position.locked_amount,
            weight: position.weight(week),
            auto_lock_amount: if position.auto_lock { position.locked_amount } else { 0 },
        }
    }

    pub fn zero(week: Week) -> Self {
        Self { week, ..Self::default() }
    }

    pub fn is_auto_lock(&self) -> bool {
        self.auto_lock_amount > 0
    }
}

/// Global totals at one week.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct AggregatePoint {
    pub locked_amount: u128,
    pub weight: u128,
    pub auto_lock_amount: u128,
}

impl AggregatePoint {
    /// Weight lost per week: principal that is not auto-locked.
    pub fn decay_rate(&self) -> u128 {
        self.locked_amount.saturating_sub(self.auto_lock_amount)
    }

    /// Swap one account's contribution `old` for `new`.
    pub fn replace(&mut self, old: &WeightSnapshot, new: &WeightSnapshot) {
        self.locked_amount = self
            .locked_amount
            .saturating_sub(old.locked_amount as u128)
            .saturating_add(new.locked_amount as u128);
        self.weight = self.weight.saturating_sub(old.weight).saturating_add(new.weight);
        self.auto_lock_amount = self
            .auto_lock_amount
            .saturating_sub(old.auto_lock_amount as u128)
            .saturating_add(new.auto_lock_amount as u128);
    }
}

/// Coarse state of an active lock.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    /// Decaying, inside its lock window.
    Locked,
    /// Frozen weight; exits only through an early claim.
    AutoLocked,
    /// Past its unlock week; principal can be claimed in full.
    Claimable,
}

/// Lock metadata as reported to callers.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockInfo {
    pub position: LockPosition,
    pub status: LockStatus,
    /// `None` for auto-locks.
    pub unlock_week: Option<Week>,
    pub remaining_weeks: u16,
    pub current_weight: u128,
}

impl LockInfo {
    pub fn new(position: LockPosition, current: Week) -> Self {
        Self {
            position,
            status: position.status(current),
            unlock_week: (!position.auto_lock).then(|| position.unlock_week()),
            remaining_weeks: position.remaining_weeks(current),
            current_weight: position.weight(current),
        }
    }
}

/// Engine-facing ledger parameters.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct LockParams {
    /// Unix seconds at which week 0 starts.
    pub epoch_start: u64,
    /// Smallest amount accepted by a new lock.
    pub min_lock_amount: u64,
}

impl Default for LockParams {
    fn default() -> Self {
        Self {
            epoch_start: DEFAULT_EPOCH_START,
            min_lock_amount: DEFAULT_MIN_LOCK_AMOUNT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::COIN;

    fn decaying(amount: u64, start: Week, weeks: u16) -> LockPosition {
        LockPosition {
            locked_amount: amount,
            lock_start_week: start,
            lock_weeks: weeks,
            auto_lock: false,
            lock_timestamp: 0,
        }
    }

    #[test]
    fn account_id_hex_roundtrip() {
        let id = AccountId([0xAB; 32]);
        let text = id.to_string();
        assert_eq!(text.len(), 64);
        assert_eq!(text.parse::<AccountId>().unwrap(), id);
    }

    #[test]
    fn account_id_from_label_is_stable() {
        assert_eq!(AccountId::from_label("alice"), AccountId::from_label("alice"));
        assert_ne!(AccountId::from_label("alice"), AccountId::from_label("bob"));
        assert!(!AccountId::from_label("alice").is_zero());
    }

    #[test]
    fn account_id_rejects_bad_hex() {
        assert!("zz".parse::<AccountId>().is_err());
        assert!("abcd".parse::<AccountId>().is_err());
    }

    #[test]
    fn decaying_weight_counts_down() {
        let p = decaying(100, 10, 4);
        assert_eq!(p.unlock_week(), 14);
        assert_eq!(p.weight(10), 400);
        assert_eq!(p.weight(11), 300);
        assert_eq!(p.weight(14), 0);
        assert_eq!(p.weight(20), 0);
        assert!(!p.is_expired(13));
        assert!(p.is_expired(14));
    }

    #[test]
    fn auto_lock_weight_is_frozen() {
        let p = LockPosition { auto_lock: true, ..decaying(100, 10, 4) };
        assert_eq!(p.weight(10), 400);
        assert_eq!(p.weight(500), 400);
        assert!(!p.is_expired(u16::MAX));
        assert_eq!(p.status(500), LockStatus::AutoLocked);
    }

    #[test]
    fn snapshot_of_expired_lock_is_zero() {
        let p = decaying(100, 0, 4);
        assert_eq!(WeightSnapshot::of(&p, 4), WeightSnapshot::zero(4));
        let s = WeightSnapshot::of(&p, 1);
        assert_eq!(s.locked_amount, 100);
        assert_eq!(s.weight, 300);
        assert!(!s.is_auto_lock());
    }

    #[test]
    fn aggregate_replace_swaps_contribution() {
        let mut point = AggregatePoint::default();
        let a = WeightSnapshot::of(&decaying(100 * COIN, 0, 4), 0);
        point.replace(&WeightSnapshot::zero(0), &a);
        assert_eq!(point.locked_amount, (100 * COIN) as u128);
        assert_eq!(point.weight, (400 * COIN) as u128);
        assert_eq!(point.decay_rate(), (100 * COIN) as u128);

        point.replace(&a, &WeightSnapshot::zero(0));
        assert_eq!(point, AggregatePoint::default());
    }

    #[test]
    fn lock_info_reports_status() {
        let info = LockInfo::new(decaying(50, 2, 3), 6);
        assert_eq!(info.status, LockStatus::Claimable);
        assert_eq!(info.unlock_week, Some(5));
        assert_eq!(info.remaining_weeks, 0);
        assert_eq!(info.current_weight, 0);
    }

    #[test]
    fn role_serializes_snake_case() {
        let json = serde_json::to_string(&Role::PenaltyManager).unwrap();
        assert_eq!(json, "\"penalty_manager\"");
    }
}
