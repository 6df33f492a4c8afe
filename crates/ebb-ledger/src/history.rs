//! Per-account weight history.
//!
//! An ordered, append-only log of [`WeightSnapshot`]s with one entry per week
//! in which the account's lock actually changed. Only the newest entry is
//! mutable, and only while its week is the current week.

use ebb_core::types::{Week, WeightSnapshot};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct AccountHistory {
    snapshots: Vec<WeightSnapshot>,
}

impl AccountHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `snapshot`, overwriting the newest entry if it belongs to the same week.
    ///
    /// Snapshots must arrive in non-decreasing week order.
    pub fn record(&mut self, snapshot: WeightSnapshot) {
        if let Some(last) = self.snapshots.last_mut() {
            if last.week == snapshot.week {
                *last = snapshot;
                return;
            }
            debug_assert!(last.week < snapshot.week, "history out of order");
        }
        self.snapshots.push(snapshot);
    }

    /// The snapshot in force at `week`: the one with the largest week `<= week`.
    pub fn snapshot_at(&self, week: Week) -> Option<&WeightSnapshot> {
        let idx = self.snapshots.partition_point(|s| s.week <= week);
        idx.checked_sub(1).map(|i| &self.snapshots[i])
    }

    /// Weight at `week`, derived from the snapshot in force.
    ///
    /// Exact-week and auto-lock snapshots report their stored weight. A
    /// decaying snapshot loses `locked_amount` per elapsed week, floored at 0.
    pub fn weight_at(&self, week: Week) -> u128 {
        let Some(s) = self.snapshot_at(week) else {
            return 0;
        };
        if s.week == week || s.is_auto_lock() {
            return s.weight;
        }
        let elapsed = (week - s.week) as u128;
        s.weight.saturating_sub(s.locked_amount as u128 * elapsed)
    }

    pub fn first_week(&self) -> Option<Week> {
        self.snapshots.first().map(|s| s.week)
    }

    pub fn latest(&self) -> Option<&WeightSnapshot> {
        self.snapshots.last()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WeightSnapshot> {
        self.snapshots.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decaying(week: Week, amount: u64, weeks: u16) -> WeightSnapshot {
        WeightSnapshot {
            week,
            locked_amount: amount,
            weight: amount as u128 * weeks as u128,
            auto_lock_amount: 0,
        }
    }

    #[test]
    fn empty_history_has_no_weight() {
        let h = AccountHistory::new();
        assert_eq!(h.weight_at(0), 0);
        assert_eq!(h.weight_at(100), 0);
        assert!(h.first_week().is_none());
    }

    #[test]
    fn weight_before_first_snapshot_is_zero() {
        let mut h = AccountHistory::new();
        h.record(decaying(5, 100, 4));
        assert_eq!(h.weight_at(4), 0);
        assert_eq!(h.weight_at(5), 400);
    }

    #[test]
    fn decaying_snapshot_counts_down_to_zero() {
        let mut h = AccountHistory::new();
        h.record(decaying(0, 100, 4));
        assert_eq!(h.weight_at(0), 400);
        assert_eq!(h.weight_at(1), 300);
        assert_eq!(h.weight_at(3), 100);
        assert_eq!(h.weight_at(4), 0);
        assert_eq!(h.weight_at(60), 0);
    }

    #[test]
    fn auto_lock_snapshot_holds_weight() {
        let mut h = AccountHistory::new();
        h.record(WeightSnapshot { week: 2, locked_amount: 100, weight: 1200, auto_lock_amount: 100 });
        assert_eq!(h.weight_at(2), 1200);
        assert_eq!(h.weight_at(40), 1200);
    }

    #[test]
    fn same_week_overwrites_newest_entry() {
        let mut h = AccountHistory::new();
        h.record(decaying(3, 100, 4));
        h.record(decaying(3, 150, 4));
        assert_eq!(h.len(), 1);
        assert_eq!(h.weight_at(3), 600);
        h.record(decaying(4, 150, 10));
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn lookup_uses_latest_snapshot_not_after_target() {
        let mut h = AccountHistory::new();
        h.record(decaying(0, 100, 4));
        h.record(decaying(2, 300, 10));
        h.record(WeightSnapshot::zero(6));
        assert_eq!(h.weight_at(1), 300);
        assert_eq!(h.weight_at(2), 3000);
        assert_eq!(h.weight_at(5), 2100);
        assert_eq!(h.weight_at(6), 0);
        assert_eq!(h.weight_at(9), 0);
        assert_eq!(h.first_week(), Some(0));
        assert_eq!(h.latest().unwrap().week, 6);
    }
}
