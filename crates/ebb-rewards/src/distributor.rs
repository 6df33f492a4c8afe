//! Reward distributor.
//!
//! Weeks below [`RewardDistributor::last_checkpoint_week`] are settled: their
//! reward is fixed and claims are computed against them. A checkpoint settles
//! every week that has fully elapsed since the previous one, in one call, no
//! matter how many weeks were skipped.
//!
//! All amounts round toward the reservoir. Undistributed dust is carried into
//! the next checkpoint rather than lost.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use ebb_core::error::{EbbError, RewardError};
use ebb_core::math::pro_rata;
use ebb_core::traits::{TokenVault, WeightSource};
use ebb_core::types::{AccountId, Week};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Everything the distributor persists.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct DistributorState {
    /// Reward attributed to each settled week, indexed by week. Its length is
    /// the last checkpoint week.
    reward_per_week: Vec<u64>,
    /// First unpaid week per account.
    last_claimed: HashMap<AccountId, Week>,
    /// Reservoir balance already accounted for: observed at the last
    /// checkpoint, less payouts and carried dust.
    last_balance: u64,
    total_claimed: u64,
}

impl DistributorState {
    /// Reassemble state from its stored records.
    pub fn from_parts(
        reward_per_week: Vec<u64>,
        last_claimed: HashMap<AccountId, Week>,
        last_balance: u64,
        total_claimed: u64,
    ) -> Self {
        Self { reward_per_week, last_claimed, last_balance, total_claimed }
    }

    /// Settled rewards, indexed by week.
    pub fn rewards(&self) -> &[u64] {
        &self.reward_per_week
    }

    pub fn watermark(&self, account: &AccountId) -> Option<Week> {
        self.last_claimed.get(account).copied()
    }

    pub fn watermarks(&self) -> impl Iterator<Item = (&AccountId, &Week)> {
        self.last_claimed.iter()
    }

    /// `(last_balance, total_claimed)`.
    pub fn balances(&self) -> (u64, u64) {
        (self.last_balance, self.total_claimed)
    }
}

/// Pre-write values recorded while a distributor journal is open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistributorJournal {
    /// Checkpoint week when the journal opened, if a checkpoint ran.
    settled_from: Option<Week>,
    /// Checkpoint week when the journal was taken.
    settled_to: Week,
    watermarks: BTreeMap<AccountId, Option<Week>>,
    balances: Option<(u64, u64)>,
}

impl DistributorJournal {
    pub fn is_empty(&self) -> bool {
        self.settled_from.is_none() && self.watermarks.is_empty() && self.balances.is_none()
    }

    /// Weeks whose settled reward may differ from what was stored.
    pub fn settled_weeks(&self) -> Option<Range<Week>> {
        self.settled_from.map(|from| from..self.settled_to.max(from))
    }

    /// Accounts whose watermark was written.
    pub fn accounts(&self) -> impl Iterator<Item = &AccountId> {
        self.watermarks.keys()
    }

    pub fn balances_changed(&self) -> bool {
        self.balances.is_some()
    }
}

/// The settlement a checkpoint would perform right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPlan {
    /// First week settled.
    pub from: Week,
    /// Week after the last settled one; the new checkpoint week.
    pub to: Week,
    /// Reservoir balance observed.
    pub balance: u64,
    /// Reward for each week in `from..to`.
    pub rewards: Vec<u64>,
}

impl CheckpointPlan {
    /// Observed increase left unattributed by rounding.
    pub fn dust(&self, last_balance: u64) -> u64 {
        let delta = self.balance.saturating_sub(last_balance);
        delta - self.rewards.iter().sum::<u64>()
    }

    fn reward(&self, week: Week) -> u64 {
        week.checked_sub(self.from)
            .and_then(|i| self.rewards.get(i as usize))
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RewardDistributor {
    state: DistributorState,
    journal: Option<DistributorJournal>,
}

impl RewardDistributor {
    /// Start distributing from `start_week`. Earlier weeks carry no reward.
    pub fn new(start_week: Week) -> Self {
        Self {
            state: DistributorState {
                reward_per_week: vec![0; start_week as usize],
                ..DistributorState::default()
            },
            journal: None,
        }
    }

    pub fn from_state(state: DistributorState) -> Self {
        Self { state, journal: None }
    }

    /// Start recording pre-write values. Replaces any open journal.
    pub fn begin_journal(&mut self) {
        self.journal = Some(DistributorJournal::default());
    }

    /// Close the journal and return it; empty if none was open.
    pub fn take_journal(&mut self) -> DistributorJournal {
        let mut journal = self.journal.take().unwrap_or_default();
        journal.settled_to = self.last_checkpoint_week();
        journal
    }

    /// Restore every value `journal` recorded.
    pub fn rollback(&mut self, journal: &DistributorJournal) {
        if let Some(from) = journal.settled_from {
            self.state.reward_per_week.truncate(from as usize);
        }
        for (account, watermark) in &journal.watermarks {
            match watermark {
                Some(week) => self.state.last_claimed.insert(*account, *week),
                None => self.state.last_claimed.remove(account),
            };
        }
        if let Some((last_balance, total_claimed)) = journal.balances {
            self.state.last_balance = last_balance;
            self.state.total_claimed = total_claimed;
        }
    }

    fn note_settled(&mut self) {
        let week = self.last_checkpoint_week();
        if let Some(journal) = self.journal.as_mut() {
            journal.settled_from.get_or_insert(week);
        }
    }

    fn note_watermark(&mut self, account: &AccountId) {
        if let Some(journal) = self.journal.as_mut() {
            journal
                .watermarks
                .entry(*account)
                .or_insert_with(|| self.state.last_claimed.get(account).copied());
        }
    }

    fn note_balances(&mut self) {
        if let Some(journal) = self.journal.as_mut() {
            journal.balances.get_or_insert((self.state.last_balance, self.state.total_claimed));
        }
    }

    pub fn state(&self) -> &DistributorState {
        &self.state
    }

    pub fn last_checkpoint_week(&self) -> Week {
        self.state.reward_per_week.len() as Week
    }

    /// Reward attributed to a settled week; 0 for unsettled weeks.
    pub fn reward_per_week(&self, week: Week) -> u64 {
        self.state.reward_per_week.get(week as usize).copied().unwrap_or(0)
    }

    /// First week `account` has not been paid for.
    pub fn last_claimed_week(&self, account: &AccountId) -> Week {
        self.state.last_claimed.get(account).copied().unwrap_or(0)
    }

    pub fn last_balance(&self) -> u64 {
        self.state.last_balance
    }

    pub fn total_claimed(&self) -> u64 {
        self.state.total_claimed
    }

    /// Work out what a checkpoint would settle now, without mutating.
    ///
    /// `None` when the current week has not moved past the last checkpoint.
    pub fn plan(&self, ledger: &dyn WeightSource, reservoir: &dyn TokenVault) -> Result<Option<CheckpointPlan>, EbbError> {
        let current = ledger.current_week()?;
        let from = self.last_checkpoint_week();
        if current <= from {
            return Ok(None);
        }
        let balance = reservoir.balance();
        let delta = match balance.checked_sub(self.state.last_balance) {
            Some(delta) => delta,
            None => {
                warn!(
                    balance,
                    accounted = self.state.last_balance,
                    "reservoir shrank since last checkpoint; attributing nothing"
                );
                0
            }
        };
        let rewards = split(delta, from, current, ledger);
        Ok(Some(CheckpointPlan { from, to: current, balance, rewards }))
    }

    fn apply(&mut self, plan: CheckpointPlan) {
        debug_assert_eq!(plan.from, self.last_checkpoint_week());
        let dust = plan.dust(self.state.last_balance);
        let settled: u64 = plan.rewards.iter().sum();
        self.note_settled();
        self.note_balances();
        self.state.last_balance = plan.balance - dust;
        self.state.reward_per_week.extend_from_slice(&plan.rewards);
        debug!(from = plan.from, to = plan.to, settled, dust, "rewards checkpointed");
    }

    /// Settle every fully elapsed week. Returns the new checkpoint week.
    ///
    /// Repeated calls within one week are no-ops.
    pub fn checkpoint(&mut self, ledger: &dyn WeightSource, reservoir: &dyn TokenVault) -> Result<Week, EbbError> {
        if let Some(plan) = self.plan(ledger, reservoir)? {
            self.apply(plan);
        }
        Ok(self.last_checkpoint_week())
    }

    /// Confirmed rewards owed to `account` and the week they run through.
    pub fn get_claimable(&self, account: &AccountId, ledger: &dyn WeightSource) -> (u64, Week) {
        self.claimable_with(account, ledger, None)
    }

    /// Confirmed rewards plus the share of weeks a checkpoint would settle now.
    ///
    /// Equals what [`claim`](Self::claim) would pay at this moment.
    pub fn estimate_claimable(
        &self,
        account: &AccountId,
        ledger: &dyn WeightSource,
        reservoir: &dyn TokenVault,
    ) -> Result<(u64, Week), EbbError> {
        let plan = self.plan(ledger, reservoir)?;
        Ok(self.claimable_with(account, ledger, plan.as_ref()))
    }

    /// `account`'s share of a single settled week.
    pub fn get_claimable_at_week(&self, account: &AccountId, week: Week, ledger: &dyn WeightSource) -> u64 {
        share(self.reward_per_week(week), account, week, ledger)
    }

    fn claimable_with(
        &self,
        account: &AccountId,
        ledger: &dyn WeightSource,
        pending: Option<&CheckpointPlan>,
    ) -> (u64, Week) {
        let end = pending.map_or(self.last_checkpoint_week(), |p| p.to);
        let Some(first) = ledger.first_lock_week(account) else {
            return (0, end);
        };
        let start = self.last_claimed_week(account).max(first);
        let mut amount = 0u64;
        for week in start..end {
            let reward = match self.state.reward_per_week.get(week as usize) {
                Some(&settled) => settled,
                None => pending.map_or(0, |p| p.reward(week)),
            };
            amount = amount.saturating_add(share(reward, account, week, ledger));
        }
        (amount, end)
    }

    /// Settle pending weeks and pay `account`'s confirmed rewards to `to`.
    ///
    /// Nothing is mutated if the transfer fails.
    pub fn claim(
        &mut self,
        account: &AccountId,
        to: &AccountId,
        ledger: &dyn WeightSource,
        reservoir: &mut dyn TokenVault,
    ) -> Result<u64, EbbError> {
        let plan = self.plan(ledger, reservoir)?;
        let (amount, through) = self.claimable_with(account, ledger, plan.as_ref());

        if amount > 0 {
            reservoir.transfer_out(to, amount)?;
        }

        if let Some(plan) = plan {
            self.apply(plan);
        }
        self.note_watermark(account);
        self.note_balances();
        self.state.last_claimed.insert(*account, through);
        self.state.last_balance = self.state.last_balance.saturating_sub(amount);
        self.state.total_claimed = self.state.total_claimed.saturating_add(amount);
        info!(%account, %to, amount, through, "rewards claimed");
        Ok(amount)
    }

    /// Move `amount` out of the reservoir to `to`.
    ///
    /// Reduces the accounted balance; withdrawing settled but unclaimed
    /// rewards leaves those claims underfunded.
    pub fn withdraw(&mut self, to: &AccountId, amount: u64, reservoir: &mut dyn TokenVault) -> Result<u64, EbbError> {
        let available = reservoir.balance();
        if amount > available {
            return Err(RewardError::InsufficientReserve { available, requested: amount }.into());
        }
        reservoir.transfer_out(to, amount)?;
        self.note_balances();
        self.state.last_balance = self.state.last_balance.saturating_sub(amount);
        info!(%to, amount, "reservoir withdrawal");
        Ok(amount)
    }
}

/// `reward * weight / total` for one account in one week.
fn share(reward: u64, account: &AccountId, week: Week, ledger: &dyn WeightSource) -> u64 {
    if reward == 0 {
        return 0;
    }
    let total = ledger.total_weight_at(week);
    if total == 0 {
        return 0;
    }
    pro_rata(reward, ledger.weight_at(account, week), total)
}

/// Attribute `delta` across `from..to`.
///
/// One week takes everything. Several weeks split by total weight, or
/// evenly if no week carries weight.
fn split(delta: u64, from: Week, to: Week, ledger: &dyn WeightSource) -> Vec<u64> {
    let weeks = (to - from) as usize;
    if weeks == 1 {
        return vec![delta];
    }
    let weights: Vec<u128> = (from..to).map(|w| ledger.total_weight_at(w)).collect();
    let total = weights.iter().fold(0u128, |acc, w| acc.saturating_add(*w));
    if total == 0 {
        return vec![delta / weeks as u64; weeks];
    }
    weights.iter().map(|w| pro_rata(delta, *w, total)).collect()
}
