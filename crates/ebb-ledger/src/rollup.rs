//! Global weight rollup.
//!
//! Keeps week-indexed totals (locked principal, weight, auto-locked principal)
//! committed up to a frontier week, plus a schedule of non-auto principal that
//! leaves the weight pool at each future week. Advancing one week costs O(1)
//! regardless of how many positions exist:
//!
//! ```text
//! weight[w+1] = weight[w] - (locked[w] - auto[w])
//! locked[w+1] = locked[w] - unlocks[w+1]
//! ```
//!
//! The decay rate is re-derived from the point at every step, so crossing a
//! scheduled unlock lowers it for all later weeks.
//!
//! [`Rollup::project`] evaluates that recurrence past the frontier without
//! touching state; [`Rollup::commit`] runs the same recurrence and stores it.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use ebb_core::types::{AggregatePoint, Week, WeightSnapshot};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct Rollup {
    /// Committed totals indexed by week. The last entry is the frontier.
    totals: Vec<AggregatePoint>,
    /// Non-auto principal whose weight reaches zero at each week.
    unlocks: BTreeMap<Week, u128>,
}

impl Default for Rollup {
    fn default() -> Self {
        Self {
            totals: vec![AggregatePoint::default()],
            unlocks: BTreeMap::new(),
        }
    }
}

impl Rollup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from stored totals (week 0 through the frontier) and unlocks.
    ///
    /// `None` if `totals` is empty.
    pub fn from_parts(totals: Vec<AggregatePoint>, unlocks: BTreeMap<Week, u128>) -> Option<Self> {
        if totals.is_empty() {
            return None;
        }
        Some(Self { totals, unlocks })
    }

    /// Every committed point, indexed by week.
    pub fn totals(&self) -> &[AggregatePoint] {
        &self.totals
    }

    /// Every scheduled unlock in week order.
    pub fn unlocks(&self) -> impl Iterator<Item = (Week, u128)> + '_ {
        self.unlocks.iter().map(|(w, a)| (*w, *a))
    }

    /// Last committed week.
    pub fn frontier(&self) -> Week {
        (self.totals.len() - 1) as Week
    }

    /// Stored totals at `week`, or `None` past the frontier.
    pub fn committed(&self, week: Week) -> Option<&AggregatePoint> {
        self.totals.get(week as usize)
    }

    /// Principal scheduled to stop decaying at `week`.
    pub fn scheduled_unlock(&self, week: Week) -> u128 {
        self.unlocks.get(&week).copied().unwrap_or(0)
    }

    /// Totals one week after `point`, arriving at `next`.
    fn step(&self, point: &AggregatePoint, next: Week) -> AggregatePoint {
        let mut out = *point;
        out.weight = out.weight.saturating_sub(point.decay_rate());
        if let Some(&amount) = self.unlocks.get(&next) {
            out.locked_amount = out.locked_amount.saturating_sub(amount);
        }
        out
    }

    /// Totals at `week`: stored at or before the frontier, projected after it.
    ///
    /// Pure: projecting never changes what later queries return.
    pub fn project(&self, week: Week) -> AggregatePoint {
        if let Some(point) = self.committed(week) {
            return *point;
        }
        let mut point = self.totals[self.totals.len() - 1];
        for next in (self.frontier() + 1)..=week {
            point = self.step(&point, next);
            // Nothing left to decay and nothing left to unlock: the rest is flat.
            let pending = self.unlocks.range((Excluded(next), Unbounded)).next();
            if point.decay_rate() == 0 && pending.is_none() {
                break;
            }
        }
        point
    }

    /// Advance the frontier to `week`, storing every intermediate point.
    ///
    /// Returns the number of weeks committed; a frontier already at or past
    /// `week` is left alone.
    pub fn commit(&mut self, week: Week) -> usize {
        let from = self.frontier();
        while self.frontier() < week {
            let next = self.frontier() + 1;
            let point = self.step(&self.totals[self.totals.len() - 1], next);
            self.totals.push(point);
        }
        (self.frontier() - from) as usize
    }

    /// Swap one account's contribution at the frontier week.
    pub fn replace(&mut self, old: &WeightSnapshot, new: &WeightSnapshot) {
        let last = self.totals.len() - 1;
        self.totals[last].replace(old, new);
    }

    /// Schedule `amount` of principal to leave the pool at `week`.
    pub fn schedule_unlock(&mut self, week: Week, amount: u64) {
        debug_assert!(week > self.frontier(), "unlock scheduled behind the frontier");
        *self.unlocks.entry(week).or_default() += amount as u128;
    }

    /// Withdraw a previously scheduled unlock.
    pub fn cancel_unlock(&mut self, week: Week, amount: u64) {
        debug_assert!(week > self.frontier(), "unlock cancelled behind the frontier");
        if let Some(entry) = self.unlocks.get_mut(&week) {
            *entry = entry.saturating_sub(amount as u128);
            if *entry == 0 {
                self.unlocks.remove(&week);
            }
        }
    }

    /// Put the frontier back at `week` with totals `point`, dropping later weeks.
    pub(crate) fn restore_frontier(&mut self, week: Week, point: AggregatePoint) {
        self.totals.truncate(week as usize + 1);
        let last = self.totals.len() - 1;
        self.totals[last] = point;
    }

    /// Overwrite the unlock scheduled at `week`.
    pub(crate) fn set_unlock(&mut self, week: Week, amount: u128) {
        if amount == 0 {
            self.unlocks.remove(&week);
        } else {
            self.unlocks.insert(week, amount);
        }
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

    fn auto(week: Week, amount: u64, weeks: u16) -> WeightSnapshot {
        WeightSnapshot { auto_lock_amount: amount, ..decaying(week, amount, weeks) }
    }

    /// One lock of 100 for 4 weeks at week 0.
    fn single_lock() -> Rollup {
        let mut r = Rollup::new();
        r.replace(&WeightSnapshot::zero(0), &decaying(0, 100, 4));
        r.schedule_unlock(4, 100);
        r
    }

    #[test]
    fn projection_decays_and_unlocks() {
        let r = single_lock();
        assert_eq!(r.project(0).weight, 400);
        assert_eq!(r.project(1).weight, 300);
        assert_eq!(r.project(3).weight, 100);
        let at_unlock = r.project(4);
        assert_eq!(at_unlock.weight, 0);
        assert_eq!(at_unlock.locked_amount, 0);
        assert_eq!(r.project(30), AggregatePoint::default());
    }

    #[test]
    fn projection_is_pure() {
        let r = single_lock();
        let before = r.clone();
        let _ = r.project(1000);
        assert_eq!(r, before);
        assert_eq!(r.frontier(), 0);
    }

    #[test]
    fn commit_matches_projection() {
        let r = single_lock();
        let mut committed = r.clone();
        assert_eq!(committed.commit(10), 10);
        for week in 0..=10 {
            assert_eq!(committed.committed(week), Some(&r.project(week)), "week {week}");
        }
        assert_eq!(committed.commit(10), 0);
        assert_eq!(committed.commit(3), 0);
    }

    #[test]
    fn unlock_lowers_decay_rate_for_remaining_locks() {
        let mut r = Rollup::new();
        r.replace(&WeightSnapshot::zero(0), &decaying(0, 100, 2));
        r.schedule_unlock(2, 100);
        r.replace(&WeightSnapshot::zero(0), &decaying(0, 10, 5));
        r.schedule_unlock(5, 10);

        // 200 + 50 at week 0; rate 110 until week 2, then 10.
        assert_eq!(r.project(0).weight, 250);
        assert_eq!(r.project(1).weight, 140);
        assert_eq!(r.project(2).weight, 30);
        assert_eq!(r.project(2).locked_amount, 10);
        assert_eq!(r.project(3).weight, 20);
        assert_eq!(r.project(5).weight, 0);
        assert_eq!(r.project(5).locked_amount, 0);
    }

    #[test]
    fn auto_lock_weight_does_not_decay() {
        let mut r = Rollup::new();
        r.replace(&WeightSnapshot::zero(0), &auto(0, 100, 10));
        assert_eq!(r.project(0).weight, 1000);
        assert_eq!(r.project(500).weight, 1000);
        assert_eq!(r.project(500).auto_lock_amount, 100);
    }

    #[test]
    fn cancelled_unlock_is_removed() {
        let mut r = single_lock();
        r.cancel_unlock(4, 100);
        assert_eq!(r.scheduled_unlock(4), 0);
        r.schedule_unlock(7, 40);
        r.cancel_unlock(7, 10);
        assert_eq!(r.scheduled_unlock(7), 30);
    }

    #[test]
    fn restore_frontier_drops_later_weeks() {
        let mut r = single_lock();
        let original = r.clone();
        let point = *r.committed(0).unwrap();
        r.commit(3);
        r.replace(&decaying(3, 100, 1), &WeightSnapshot::zero(3));
        r.set_unlock(4, 0);
        r.restore_frontier(0, point);
        r.set_unlock(4, 100);
        assert_eq!(r, original);
    }

    #[test]
    fn rebuilt_rollup_matches() {
        let mut r = single_lock();
        r.commit(2);
        let rebuilt = Rollup::from_parts(r.totals().to_vec(), r.unlocks().collect()).unwrap();
        assert_eq!(rebuilt, r);
        assert!(Rollup::from_parts(Vec::new(), BTreeMap::new()).is_none());
    }

    #[test]
    fn replace_applies_at_frontier_only() {
        let mut r = single_lock();
        r.commit(2);
        r.replace(&decaying(2, 100, 2), &WeightSnapshot::zero(2));
        r.cancel_unlock(4, 100);
        assert_eq!(r.committed(1).unwrap().weight, 300);
        assert_eq!(r.committed(2).unwrap().weight, 0);
        assert_eq!(r.project(6), AggregatePoint::default());
    }
}
