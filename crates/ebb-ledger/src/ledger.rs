//! The weight ledger: lock positions, per-account weight history, and the
//! global rollup.
//!
//! Every mutating entry point follows the same order:
//! 1. read the clock and derive the current week, refusing a week behind the frontier
//! 2. validate and compute the new position (no state touched)
//! 3. perform the single token transfer, if any
//! 4. commit the rollup frontier to the current week and write the change
//!
//! A failed transfer therefore leaves the ledger exactly as it was, and the
//! aggregate series is never modified behind the frontier.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ebb_core::constants::{MAX_LOCK_WEEKS, MIN_LOCK_WEEKS};
use ebb_core::error::{ArithmeticError, EbbError, LockError};
use ebb_core::math::early_exit_penalty;
use ebb_core::traits::{Clock, TokenVault, WeightSource};
use ebb_core::types::{
    AccountId, AggregatePoint, LockInfo, LockParams, LockPosition, Week, WeightSnapshot,
};
use ebb_core::week::{checked_week_add, week_at};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::history::AccountHistory;
use crate::journal::{AccountUndo, LedgerJournal};
use crate::rollup::Rollup;

/// Ledger-wide scalars, stored as one record.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct LedgerSettings {
    pub params: LockParams,
    /// Early-exit penalties not yet withdrawn.
    pub penalty_total: u64,
    pub penalty_receiver: Option<AccountId>,
}

impl LedgerSettings {
    pub fn new(params: LockParams) -> Self {
        Self { params, penalty_total: 0, penalty_receiver: None }
    }
}

/// Everything the ledger persists. The clock is supplied separately.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct LedgerState {
    settings: LedgerSettings,
    /// Active positions only; claimed positions are removed.
    positions: HashMap<AccountId, LockPosition>,
    histories: HashMap<AccountId, AccountHistory>,
    rollup: Rollup,
}

impl LedgerState {
    pub fn new(params: LockParams) -> Self {
        Self {
            settings: LedgerSettings::new(params),
            positions: HashMap::new(),
            histories: HashMap::new(),
            rollup: Rollup::new(),
        }
    }

    /// Reassemble state from its stored records.
    pub fn from_parts(
        settings: LedgerSettings,
        positions: HashMap<AccountId, LockPosition>,
        histories: HashMap<AccountId, AccountHistory>,
        rollup: Rollup,
    ) -> Self {
        Self { settings, positions, histories, rollup }
    }

    pub fn params(&self) -> &LockParams {
        &self.settings.params
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    pub fn position(&self, account: &AccountId) -> Option<&LockPosition> {
        self.positions.get(account)
    }

    pub fn positions(&self) -> impl Iterator<Item = (&AccountId, &LockPosition)> {
        self.positions.iter()
    }

    pub fn history(&self, account: &AccountId) -> Option<&AccountHistory> {
        self.histories.get(account)
    }

    pub fn histories(&self) -> impl Iterator<Item = (&AccountId, &AccountHistory)> {
        self.histories.iter()
    }

    pub fn rollup(&self) -> &Rollup {
        &self.rollup
    }
}

/// Outcome of an early exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarlyExit {
    /// Principal returned to the account.
    pub payout: u64,
    /// Principal retained as penalty.
    pub penalty: u64,
}

/// Vote-escrow weight ledger.
pub struct WeightLedger {
    state: LedgerState,
    clock: Arc<dyn Clock>,
    journal: Option<LedgerJournal>,
}

impl fmt::Debug for WeightLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeightLedger")
            .field("frontier", &self.state.rollup.frontier())
            .field("positions", &self.state.positions.len())
            .finish_non_exhaustive()
    }
}

impl WeightLedger {
    /// Create an empty ledger.
    pub fn new(params: LockParams, clock: Arc<dyn Clock>) -> Self {
        Self::from_state(LedgerState::new(params), clock)
    }

    /// Resume a ledger from persisted state.
    pub fn from_state(state: LedgerState, clock: Arc<dyn Clock>) -> Self {
        Self { state, clock, journal: None }
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn params(&self) -> &LockParams {
        &self.state.settings.params
    }

    // --- Journal ---

    /// Start recording pre-write values. Replaces any open journal.
    pub fn begin_journal(&mut self) {
        self.journal = Some(LedgerJournal::default());
    }

    /// Close the journal and return it; empty if none was open.
    pub fn take_journal(&mut self) -> LedgerJournal {
        let mut journal = self.journal.take().unwrap_or_default();
        journal.staged_frontier = self.state.rollup.frontier();
        journal
    }

    /// Restore every value `journal` recorded.
    pub fn rollback(&mut self, journal: &LedgerJournal) {
        if journal.is_empty() {
            return;
        }
        if let Some((week, point)) = journal.frontier {
            self.state.rollup.restore_frontier(week, point);
        }
        for (&week, &amount) in &journal.unlocks {
            self.state.rollup.set_unlock(week, amount);
        }
        for (account, undo) in &journal.accounts {
            match undo.position {
                Some(position) => self.state.positions.insert(*account, position),
                None => self.state.positions.remove(account),
            };
            match &undo.history {
                Some(history) => self.state.histories.insert(*account, history.clone()),
                None => self.state.histories.remove(account),
            };
        }
        if let Some(settings) = journal.settings {
            self.state.settings = settings;
        }
        warn!(accounts = journal.accounts.len(), frontier = self.frontier(), "ledger operation rolled back");
    }

    fn note_account(&mut self, account: &AccountId) {
        if let Some(journal) = self.journal.as_mut() {
            journal.accounts.entry(*account).or_insert_with(|| AccountUndo {
                position: self.state.positions.get(account).copied(),
                history: self.state.histories.get(account).cloned(),
            });
        }
    }

    fn note_frontier(&mut self) {
        if let Some(journal) = self.journal.as_mut() {
            if journal.frontier.is_none() {
                let week = self.state.rollup.frontier();
                let point: AggregatePoint = self.state.rollup.project(week);
                journal.frontier = Some((week, point));
            }
        }
    }

    fn note_unlock(&mut self, week: Week) {
        if let Some(journal) = self.journal.as_mut() {
            journal.unlocks.entry(week).or_insert_with(|| self.state.rollup.scheduled_unlock(week));
        }
    }

    fn note_settings(&mut self) {
        if let Some(journal) = self.journal.as_mut() {
            journal.settings.get_or_insert(self.state.settings);
        }
    }

    // --- Clock ---

    /// Current Unix time and the week it falls in.
    fn now_and_week(&self) -> Result<(u64, Week), EbbError> {
        let now = self.clock.now();
        Ok((now, week_at(now, self.state.settings.params.epoch_start)?))
    }

    /// Like [`now_and_week`](Self::now_and_week), but refuses a week behind the frontier.
    fn mutation_week(&self) -> Result<(u64, Week), EbbError> {
        let (now, week) = self.now_and_week()?;
        let frontier = self.state.rollup.frontier();
        if week < frontier {
            return Err(ArithmeticError::ClockRegressed { week, frontier }.into());
        }
        Ok((now, week))
    }

    pub fn current_week(&self) -> Result<Week, EbbError> {
        Ok(self.now_and_week()?.1)
    }

    /// Last week whose totals are committed.
    pub fn frontier(&self) -> Week {
        self.state.rollup.frontier()
    }

    /// Commit the global totals through the current week.
    ///
    /// Cost is proportional to the weeks elapsed since the last commit.
    ///
    /// # Errors
    ///
    /// - [`ArithmeticError::ClockRegressed`] if the clock reads a week behind the frontier
    pub fn checkpoint(&mut self) -> Result<Week, EbbError> {
        let (_, week) = self.mutation_week()?;
        self.advance_to(week);
        Ok(week)
    }

    /// `week` is never behind the frontier: callers obtain it from `mutation_week`.
    fn advance_to(&mut self, week: Week) {
        if week == self.state.rollup.frontier() {
            return;
        }
        self.note_frontier();
        let stepped = self.state.rollup.commit(week);
        debug!(frontier = week, stepped, "rollup advanced");
    }

    fn active_position(&self, account: &AccountId) -> Result<LockPosition, LockError> {
        self.state
            .positions
            .get(account)
            .filter(|p| p.is_active())
            .copied()
            .ok_or(LockError::NoActiveLock)
    }

    fn require_unexpired(position: &LockPosition, week: Week) -> Result<(), LockError> {
        if position.is_expired(week) {
            return Err(LockError::LockExpired { unlock_week: position.unlock_week() });
        }
        Ok(())
    }

    fn validate_weeks(weeks: u16) -> Result<(), LockError> {
        if !(MIN_LOCK_WEEKS..=MAX_LOCK_WEEKS).contains(&weeks) {
            return Err(LockError::DurationOutOfRange {
                weeks,
                min: MIN_LOCK_WEEKS,
                max: MAX_LOCK_WEEKS,
            });
        }
        Ok(())
    }

    /// Swap `account`'s position from `old` to `new` at `week` (the frontier).
    ///
    /// Updates the account's snapshot, the frontier totals by the difference
    /// in contribution, and the unlock schedule. Infallible by construction:
    /// callers validate before calling.
    fn write_position(&mut self, account: &AccountId, week: Week, old: LockPosition, new: LockPosition) {
        self.note_frontier();
        self.note_account(account);
        let before = WeightSnapshot::of(&old, week);
        let after = WeightSnapshot::of(&new, week);
        self.state.rollup.replace(&before, &after);

        if old.is_active() && !old.auto_lock && !old.is_expired(week) {
            self.note_unlock(old.unlock_week());
            self.state.rollup.cancel_unlock(old.unlock_week(), old.locked_amount);
        }
        if new.is_active() && !new.auto_lock && !new.is_expired(week) {
            self.note_unlock(new.unlock_week());
            self.state.rollup.schedule_unlock(new.unlock_week(), new.locked_amount);
        }

        self.state.histories.entry(*account).or_default().record(after);
        if new.is_active() {
            self.state.positions.insert(*account, new);
        } else {
            self.state.positions.remove(account);
        }
    }

    /// Lock `amount` for `weeks` weeks, pulling the principal through `vault`.
    ///
    /// # Errors
    ///
    /// - [`LockError::AlreadyLocked`] if the account has an active position
    /// - [`LockError::AmountTooSmall`] if `amount` is below the configured floor
    /// - [`LockError::DurationOutOfRange`] if `weeks` is outside `[1, 52]`
    /// - [`ArithmeticError::WeekOverflow`] if the unlock week passes the horizon
    /// - [`ArithmeticError::ClockRegressed`] if the clock reads a week behind the frontier
    /// - any transfer error from `vault`
    pub fn create_lock(
        &mut self,
        account: &AccountId,
        amount: u64,
        weeks: u16,
        auto_lock: bool,
        vault: &mut dyn TokenVault,
    ) -> Result<LockPosition, EbbError> {
        let (now, week) = self.mutation_week()?;
        if self.active_position(account).is_ok() {
            return Err(LockError::AlreadyLocked.into());
        }
        let min = self.state.settings.params.min_lock_amount.max(1);
        if amount < min {
            return Err(LockError::AmountTooSmall { amount, min }.into());
        }
        Self::validate_weeks(weeks)?;
        checked_week_add(week, weeks)?;

        vault.transfer_in(account, amount)?;

        self.advance_to(week);
        let position = LockPosition {
            locked_amount: amount,
            lock_start_week: week,
            lock_weeks: weeks,
            auto_lock,
            lock_timestamp: now,
        };
        self.write_position(account, week, LockPosition::default(), position);
        info!(%account, amount, weeks, auto_lock, week, "lock created");
        Ok(position)
    }

    /// Add `amount` to an active, unexpired lock without changing its schedule.
    pub fn increase_amount(
        &mut self,
        account: &AccountId,
        amount: u64,
        vault: &mut dyn TokenVault,
    ) -> Result<LockPosition, EbbError> {
        let (_, week) = self.mutation_week()?;
        if amount == 0 {
            return Err(LockError::ZeroAmount.into());
        }
        let old = self.active_position(account)?;
        Self::require_unexpired(&old, week)?;
        let locked_amount = old
            .locked_amount
            .checked_add(amount)
            .ok_or(ArithmeticError::Overflow)?;
        let new = LockPosition { locked_amount, ..old };

        vault.transfer_in(account, amount)?;

        self.advance_to(week);
        self.write_position(account, week, old, new);
        info!(%account, amount, total = locked_amount, week, "lock amount increased");
        Ok(new)
    }

    /// Extend an active, unexpired lock to `weeks` weeks.
    ///
    /// For a decaying lock `weeks` counts from the current week and must
    /// exceed the weeks remaining; the lock restarts now. For an auto-lock it
    /// must exceed the configured duration.
    pub fn increase_weeks(&mut self, account: &AccountId, weeks: u16) -> Result<LockPosition, EbbError> {
        let (_, week) = self.mutation_week()?;
        Self::validate_weeks(weeks)?;
        let old = self.active_position(account)?;
        Self::require_unexpired(&old, week)?;

        let new = if old.auto_lock {
            if weeks <= old.lock_weeks {
                return Err(LockError::DurationNotIncreased { current: old.lock_weeks, requested: weeks }.into());
            }
            LockPosition { lock_weeks: weeks, ..old }
        } else {
            let remaining = old.remaining_weeks(week);
            if weeks <= remaining {
                return Err(LockError::DurationNotIncreased { current: remaining, requested: weeks }.into());
            }
            checked_week_add(week, weeks)?;
            LockPosition { lock_start_week: week, lock_weeks: weeks, ..old }
        };

        self.advance_to(week);
        self.write_position(account, week, old, new);
        info!(%account, weeks, week, "lock duration increased");
        Ok(new)
    }

    /// Freeze a decaying lock's weight at its current value.
    ///
    /// The remaining weeks become the configured duration and the scheduled
    /// unlock is withdrawn.
    pub fn enable_auto_lock(&mut self, account: &AccountId) -> Result<LockPosition, EbbError> {
        let (_, week) = self.mutation_week()?;
        let old = self.active_position(account)?;
        if old.auto_lock {
            return Err(LockError::AutoLocked.into());
        }
        Self::require_unexpired(&old, week)?;
        let new = LockPosition {
            auto_lock: true,
            lock_start_week: week,
            lock_weeks: old.remaining_weeks(week),
            ..old
        };

        self.advance_to(week);
        self.write_position(account, week, old, new);
        info!(%account, weeks = new.lock_weeks, week, "auto-lock enabled");
        Ok(new)
    }

    /// Let an auto-lock start decaying from the current week over its configured duration.
    pub fn disable_auto_lock(&mut self, account: &AccountId) -> Result<LockPosition, EbbError> {
        let (_, week) = self.mutation_week()?;
        let old = self.active_position(account)?;
        if !old.auto_lock {
            return Err(LockError::NotAutoLocked.into());
        }
        checked_week_add(week, old.lock_weeks)?;
        let new = LockPosition { auto_lock: false, lock_start_week: week, ..old };

        self.advance_to(week);
        self.write_position(account, week, old, new);
        info!(%account, unlock_week = new.unlock_week(), week, "auto-lock disabled");
        Ok(new)
    }

    /// Return the full principal of an expired decaying lock.
    ///
    /// # Errors
    ///
    /// - [`LockError::NoActiveLock`] if the account holds nothing
    /// - [`LockError::AutoLocked`] for auto-locks (use [`claim_early`](Self::claim_early))
    /// - [`LockError::LockNotExpired`] before the unlock week
    pub fn claim(&mut self, account: &AccountId, vault: &mut dyn TokenVault) -> Result<u64, EbbError> {
        let (_, week) = self.mutation_week()?;
        let old = self.active_position(account)?;
        if old.auto_lock {
            return Err(LockError::AutoLocked.into());
        }
        if !old.is_expired(week) {
            return Err(LockError::LockNotExpired { unlock_week: old.unlock_week() }.into());
        }
        let amount = old.locked_amount;

        vault.transfer_out(account, amount)?;

        self.advance_to(week);
        self.write_position(account, week, old, LockPosition::default());
        info!(%account, amount, week, "lock claimed");
        Ok(amount)
    }

    /// Exit a lock before it expires, forfeiting `principal * weeks / 52`.
    ///
    /// Decaying locks are charged for the weeks remaining (at least one);
    /// auto-locks for their configured duration.
    ///
    /// # Errors
    ///
    /// - [`LockError::NoActiveLock`] if the account holds nothing
    /// - [`LockError::LockExpired`] if a decaying lock can already be claimed in full
    pub fn claim_early(&mut self, account: &AccountId, vault: &mut dyn TokenVault) -> Result<EarlyExit, EbbError> {
        let (_, week) = self.mutation_week()?;
        let old = self.active_position(account)?;
        let charged_weeks = if old.auto_lock {
            old.lock_weeks
        } else {
            Self::require_unexpired(&old, week)?;
            old.remaining_weeks(week).max(1)
        };
        let penalty = early_exit_penalty(old.locked_amount, charged_weeks);
        let payout = old.locked_amount - penalty;
        let penalty_total = self
            .state
            .settings
            .penalty_total
            .checked_add(penalty)
            .ok_or(ArithmeticError::Overflow)?;

        if payout > 0 {
            vault.transfer_out(account, payout)?;
        }

        self.advance_to(week);
        self.write_position(account, week, old, LockPosition::default());
        self.note_settings();
        self.state.settings.penalty_total = penalty_total;
        info!(%account, payout, penalty, charged_weeks, week, "lock exited early");
        Ok(EarlyExit { payout, penalty })
    }

    /// Name the account that receives withdrawn penalties.
    pub fn set_penalty_receiver(&mut self, receiver: AccountId) {
        info!(%receiver, "penalty receiver set");
        self.note_settings();
        self.state.settings.penalty_receiver = Some(receiver);
    }

    pub fn penalty_receiver(&self) -> Option<AccountId> {
        self.state.settings.penalty_receiver
    }

    /// Penalties accrued and not yet withdrawn.
    pub fn penalty_total(&self) -> u64 {
        self.state.settings.penalty_total
    }

    /// Pay all accrued penalties to the penalty receiver.
    pub fn withdraw_penalty(&mut self, vault: &mut dyn TokenVault) -> Result<u64, EbbError> {
        let receiver = self.state.settings.penalty_receiver.ok_or(LockError::NoPenaltyReceiver)?;
        let amount = self.state.settings.penalty_total;
        if amount == 0 {
            return Ok(0);
        }
        vault.transfer_out(&receiver, amount)?;
        self.note_settings();
        self.state.settings.penalty_total = 0;
        info!(%receiver, amount, "penalties withdrawn");
        Ok(amount)
    }

    /// Change the floor for new locks. Existing locks are unaffected.
    pub fn set_min_lock_amount(&mut self, amount: u64) {
        info!(amount, "minimum lock amount set");
        self.note_settings();
        self.state.settings.params.min_lock_amount = amount;
    }

    /// Weight held by `account` at `week`.
    pub fn weight_at(&self, account: &AccountId, week: Week) -> u128 {
        self.state.histories.get(account).map_or(0, |h| h.weight_at(week))
    }

    /// Global totals at `week`, projected past the frontier.
    pub fn total_at(&self, week: Week) -> AggregatePoint {
        self.state.rollup.project(week)
    }

    pub fn total_weight_at(&self, week: Week) -> u128 {
        self.total_at(week).weight
    }

    /// Principal scheduled to stop decaying at `week`.
    pub fn scheduled_unlock(&self, week: Week) -> u128 {
        self.state.rollup.scheduled_unlock(week)
    }

    /// The account's active position, if any.
    pub fn lock_of(&self, account: &AccountId) -> Option<LockPosition> {
        self.active_position(account).ok()
    }

    /// The account's active position with derived status at the current week.
    pub fn lock_info(&self, account: &AccountId) -> Result<Option<LockInfo>, EbbError> {
        let week = self.current_week()?;
        Ok(self.lock_of(account).map(|p| LockInfo::new(p, week)))
    }

    pub fn history(&self, account: &AccountId) -> Option<&AccountHistory> {
        self.state.histories.get(account)
    }

    /// Every account that has ever held a lock.
    pub fn accounts(&self) -> impl Iterator<Item = &AccountId> {
        self.state.histories.keys()
    }
}

impl WeightSource for WeightLedger {
    fn current_week(&self) -> Result<Week, EbbError> {
        WeightLedger::current_week(self)
    }

    fn weight_at(&self, account: &AccountId, week: Week) -> u128 {
        WeightLedger::weight_at(self, account, week)
    }

    fn total_weight_at(&self, week: Week) -> u128 {
        WeightLedger::total_weight_at(self, week)
    }

    fn first_lock_week(&self, account: &AccountId) -> Option<Week> {
        self.history(account).and_then(AccountHistory::first_week)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebb_core::clock::ManualClock;
    use ebb_core::constants::{COIN, SECONDS_PER_WEEK};
    use ebb_core::error::{ErrorKind, TransferError};
    use ebb_core::types::LockStatus;
    use ebb_core::vault::MemoryVault;

    fn alice() -> AccountId {
        AccountId([0xA1; 32])
    }

    fn bob() -> AccountId {
        AccountId([0xB0; 32])
    }

    struct Harness {
        ledger: WeightLedger,
        clock: Arc<ManualClock>,
        vault: MemoryVault,
    }

    impl Harness {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::new(0));
            let params = LockParams { epoch_start: 0, min_lock_amount: 1 };
            let mut vault = MemoryVault::new();
            vault.mint(&alice(), 10_000 * COIN);
            vault.mint(&bob(), 10_000 * COIN);
            Self { ledger: WeightLedger::new(params, clock.clone()), clock, vault }
        }

        fn week(&self) -> Week {
            self.ledger.current_week().unwrap()
        }

        fn advance(&self, weeks: u64) {
            self.clock.advance_weeks(weeks);
        }

        fn lock(&mut self, who: AccountId, amount: u64, weeks: u16, auto: bool) -> LockPosition {
            self.ledger.create_lock(&who, amount, weeks, auto, &mut self.vault).unwrap()
        }
    }

    #[test]
    fn weight_decays_linearly_to_zero() {
        let mut h = Harness::new();
        h.lock(alice(), 100 * COIN, 4, false);
        let w = |k: Week| h.ledger.weight_at(&alice(), k);
        assert_eq!(w(0), 400 * COIN as u128);
        assert_eq!(w(1), 300 * COIN as u128);
        assert_eq!(w(3), 100 * COIN as u128);
        assert_eq!(w(4), 0);
        assert_eq!(w(50), 0);
        assert_eq!(h.ledger.total_weight_at(1), 300 * COIN as u128);
        assert_eq!(h.ledger.total_weight_at(4), 0);
        assert_eq!(h.vault.balance(), 100 * COIN);
    }

    #[test]
    fn create_lock_validates_before_transfer() {
        let mut h = Harness::new();
        h.ledger.set_min_lock_amount(COIN);
        let err = h.ledger.create_lock(&alice(), COIN - 1, 4, false, &mut h.vault).unwrap_err();
        assert!(matches!(err, EbbError::Lock(LockError::AmountTooSmall { .. })));
        assert_eq!(err.kind(), ErrorKind::Validation);

        for weeks in [0, 53] {
            let err = h.ledger.create_lock(&alice(), COIN, weeks, false, &mut h.vault).unwrap_err();
            assert!(matches!(err, EbbError::Lock(LockError::DurationOutOfRange { .. })));
        }
        assert_eq!(h.vault.balance(), 0);

        h.lock(alice(), COIN, 4, false);
        let err = h.ledger.create_lock(&alice(), COIN, 4, false, &mut h.vault).unwrap_err();
        assert!(matches!(err, EbbError::Lock(LockError::AlreadyLocked)));
    }

    #[test]
    fn failed_transfer_leaves_ledger_untouched() {
        let mut h = Harness::new();
        h.advance(3);
        let before = h.ledger.state().clone();
        let poor = AccountId([0x77; 32]);
        let err = h.ledger.create_lock(&poor, COIN, 4, false, &mut h.vault).unwrap_err();
        assert!(matches!(err, EbbError::Transfer(TransferError::InsufficientFunds { .. })));
        assert_eq!(err.kind(), ErrorKind::External);
        assert_eq!(h.ledger.state(), &before);
    }

    #[test]
    fn failed_payout_leaves_ledger_untouched() {
        let mut h = Harness::new();
        h.lock(alice(), 100 * COIN, 4, false);
        h.advance(1);
        h.vault.set_reject_transfers(true);
        let before = h.ledger.state().clone();
        assert!(h.ledger.claim_early(&alice(), &mut h.vault).is_err());
        assert_eq!(h.ledger.state(), &before);
        assert_eq!(h.ledger.penalty_total(), 0);
    }

    #[test]
    fn auto_lock_weight_is_constant() {
        let mut h = Harness::new();
        h.lock(alice(), 10 * COIN, 12, true);
        h.advance(30);
        assert_eq!(h.ledger.weight_at(&alice(), 0), 120 * COIN as u128);
        assert_eq!(h.ledger.weight_at(&alice(), 29), 120 * COIN as u128);
        assert_eq!(h.ledger.total_weight_at(30), 120 * COIN as u128);
        let info = h.ledger.lock_info(&alice()).unwrap().unwrap();
        assert_eq!(info.status, LockStatus::AutoLocked);
        assert_eq!(info.unlock_week, None);
    }

    #[test]
    fn increase_amount_mid_lock() {
        let mut h = Harness::new();
        h.lock(alice(), 100, 4, false);
        h.advance(1);
        h.ledger.increase_amount(&alice(), 50, &mut h.vault).unwrap();
        // 150 principal with 3 weeks left.
        assert_eq!(h.ledger.weight_at(&alice(), 1), 450);
        assert_eq!(h.ledger.weight_at(&alice(), 2), 300);
        assert_eq!(h.ledger.weight_at(&alice(), 4), 0);
        assert_eq!(h.ledger.total_weight_at(1), 450);
        assert_eq!(h.ledger.total_weight_at(3), 150);
        assert_eq!(h.ledger.scheduled_unlock(4), 150);
        assert_eq!(h.ledger.history(&alice()).unwrap().len(), 2);
    }

    #[test]
    fn same_week_changes_overwrite_snapshot() {
        let mut h = Harness::new();
        h.lock(alice(), 100, 4, false);
        h.ledger.increase_amount(&alice(), 100, &mut h.vault).unwrap();
        h.ledger.increase_weeks(&alice(), 10).unwrap();
        assert_eq!(h.ledger.history(&alice()).unwrap().len(), 1);
        assert_eq!(h.ledger.weight_at(&alice(), 0), 2000);
        assert_eq!(h.ledger.total_weight_at(0), 2000);
        assert_eq!(h.ledger.scheduled_unlock(4), 0);
        assert_eq!(h.ledger.scheduled_unlock(10), 200);
    }

    #[test]
    fn increase_amount_on_expired_lock_fails() {
        let mut h = Harness::new();
        h.lock(alice(), 100, 2, false);
        h.advance(2);
        let err = h.ledger.increase_amount(&alice(), 1, &mut h.vault).unwrap_err();
        assert!(matches!(err, EbbError::Lock(LockError::LockExpired { unlock_week: 2 })));
        let err = h.ledger.increase_amount(&bob(), 1, &mut h.vault).unwrap_err();
        assert!(matches!(err, EbbError::Lock(LockError::NoActiveLock)));
        let err = h.ledger.increase_amount(&alice(), 0, &mut h.vault).unwrap_err();
        assert!(matches!(err, EbbError::Lock(LockError::ZeroAmount)));
    }

    #[test]
    fn increase_weeks_must_extend_remaining() {
        let mut h = Harness::new();
        h.lock(alice(), 100, 10, false);
        h.advance(6);
        // 4 weeks remain.
        let err = h.ledger.increase_weeks(&alice(), 4).unwrap_err();
        assert!(matches!(err, EbbError::Lock(LockError::DurationNotIncreased { current: 4, requested: 4 })));
        let p = h.ledger.increase_weeks(&alice(), 5).unwrap();
        assert_eq!(p.lock_start_week, 6);
        assert_eq!(p.unlock_week(), 11);
        assert_eq!(h.ledger.weight_at(&alice(), 6), 500);
        assert_eq!(h.ledger.total_weight_at(6), 500);
        assert_eq!(h.ledger.scheduled_unlock(10), 0);
        assert_eq!(h.ledger.scheduled_unlock(11), 100);
    }

    #[test]
    fn increase_weeks_on_auto_lock_compares_configured_duration() {
        let mut h = Harness::new();
        h.lock(alice(), 100, 10, true);
        h.advance(5);
        assert!(h.ledger.increase_weeks(&alice(), 10).is_err());
        h.ledger.increase_weeks(&alice(), 20).unwrap();
        assert_eq!(h.ledger.weight_at(&alice(), 5), 2000);
        assert_eq!(h.ledger.weight_at(&alice(), 4), 1000);
        assert_eq!(h.ledger.total_weight_at(40), 2000);
    }

    #[test]
    fn enable_auto_lock_freezes_current_weight() {
        let mut h = Harness::new();
        h.lock(alice(), 100, 10, false);
        h.advance(4);
        let p = h.ledger.enable_auto_lock(&alice()).unwrap();
        assert_eq!(p.lock_weeks, 6);
        assert_eq!(h.ledger.weight_at(&alice(), 4), 600);
        assert_eq!(h.ledger.weight_at(&alice(), 30), 600);
        assert_eq!(h.ledger.total_weight_at(30), 600);
        assert_eq!(h.ledger.scheduled_unlock(10), 0);
        assert!(matches!(
            h.ledger.enable_auto_lock(&alice()),
            Err(EbbError::Lock(LockError::AutoLocked))
        ));
    }

    #[test]
    fn disable_auto_lock_starts_decay() {
        let mut h = Harness::new();
        h.lock(alice(), 100, 5, true);
        h.advance(7);
        h.ledger.disable_auto_lock(&alice()).unwrap();
        assert_eq!(h.ledger.weight_at(&alice(), 7), 500);
        assert_eq!(h.ledger.weight_at(&alice(), 9), 300);
        assert_eq!(h.ledger.weight_at(&alice(), 12), 0);
        assert_eq!(h.ledger.total_weight_at(9), 300);
        assert_eq!(h.ledger.total_weight_at(12), 0);
        assert_eq!(h.ledger.total_at(12).locked_amount, 0);
        assert!(matches!(
            h.ledger.disable_auto_lock(&alice()),
            Err(EbbError::Lock(LockError::NotAutoLocked))
        ));
    }

    #[test]
    fn claim_requires_expiry() {
        let mut h = Harness::new();
        h.lock(alice(), 100 * COIN, 4, false);
        h.advance(3);
        let err = h.ledger.claim(&alice(), &mut h.vault).unwrap_err();
        assert!(matches!(err, EbbError::Lock(LockError::LockNotExpired { unlock_week: 4 })));
        assert_eq!(err.kind(), ErrorKind::State);

        h.advance(1);
        let before = h.vault.holder_balance(&alice());
        assert_eq!(h.ledger.claim(&alice(), &mut h.vault).unwrap(), 100 * COIN);
        assert_eq!(h.vault.holder_balance(&alice()), before + 100 * COIN);
        assert!(h.ledger.lock_of(&alice()).is_none());
        let last = *h.ledger.history(&alice()).unwrap().latest().unwrap();
        assert_eq!(last, WeightSnapshot::zero(4));

        // Claimed accounts can lock again.
        h.lock(alice(), COIN, 2, false);
        assert_eq!(h.ledger.weight_at(&alice(), 4), 2 * COIN as u128);
    }

    #[test]
    fn claim_rejects_auto_lock() {
        let mut h = Harness::new();
        h.lock(alice(), 100, 4, true);
        h.advance(10);
        assert!(matches!(
            h.ledger.claim(&alice(), &mut h.vault),
            Err(EbbError::Lock(LockError::AutoLocked))
        ));
    }

    #[test]
    fn early_exit_charges_remaining_weeks() {
        let mut h = Harness::new();
        h.lock(alice(), 100 * COIN, 4, false);
        h.advance(1);
        let exit = h.ledger.claim_early(&alice(), &mut h.vault).unwrap();
        assert_eq!(exit.penalty, 300 * COIN / 52);
        assert_eq!(exit.payout, 100 * COIN - exit.penalty);
        assert_eq!(h.ledger.penalty_total(), exit.penalty);
        assert_eq!(h.ledger.weight_at(&alice(), 1), 0);
        assert_eq!(h.ledger.total_weight_at(1), 0);
        assert_eq!(h.ledger.scheduled_unlock(4), 0);
        assert_eq!(h.ledger.total_at(4).locked_amount, 0);
        // The penalty stays in the vault.
        assert_eq!(h.vault.balance(), exit.penalty);
    }

    #[test]
    fn early_exit_on_auto_lock_charges_full_duration() {
        let mut h = Harness::new();
        h.lock(alice(), 52 * COIN, 13, true);
        h.advance(20);
        let exit = h.ledger.claim_early(&alice(), &mut h.vault).unwrap();
        assert_eq!(exit.penalty, 13 * COIN);
        assert_eq!(exit.payout, 39 * COIN);
        assert_eq!(h.ledger.total_weight_at(20), 0);
    }

    #[test]
    fn early_exit_on_expired_lock_fails() {
        let mut h = Harness::new();
        h.lock(alice(), 100, 2, false);
        h.advance(2);
        assert!(matches!(
            h.ledger.claim_early(&alice(), &mut h.vault),
            Err(EbbError::Lock(LockError::LockExpired { .. }))
        ));
    }

    #[test]
    fn penalties_flow_to_receiver() {
        let mut h = Harness::new();
        let treasury = AccountId([0xEE; 32]);
        h.lock(alice(), 52 * COIN, 10, false);
        h.ledger.claim_early(&alice(), &mut h.vault).unwrap();
        assert!(matches!(
            h.ledger.withdraw_penalty(&mut h.vault),
            Err(EbbError::Lock(LockError::NoPenaltyReceiver))
        ));
        h.ledger.set_penalty_receiver(treasury);
        assert_eq!(h.ledger.withdraw_penalty(&mut h.vault).unwrap(), 10 * COIN);
        assert_eq!(h.vault.holder_balance(&treasury), 10 * COIN);
        assert_eq!(h.ledger.penalty_total(), 0);
        assert_eq!(h.ledger.withdraw_penalty(&mut h.vault).unwrap(), 0);
    }

    #[test]
    fn aggregate_matches_sum_of_accounts() {
        let mut h = Harness::new();
        h.lock(alice(), 100, 8, false);
        h.advance(2);
        h.lock(bob(), 70, 3, true);
        h.advance(1);
        h.ledger.increase_amount(&alice(), 30, &mut h.vault).unwrap();
        h.advance(2);
        h.ledger.disable_auto_lock(&bob()).unwrap();
        h.advance(1);
        h.ledger.checkpoint().unwrap();
        for week in 0..20 {
            let sum = h.ledger.weight_at(&alice(), week) + h.ledger.weight_at(&bob(), week);
            assert_eq!(h.ledger.total_weight_at(week), sum, "week {week}");
        }
    }

    #[test]
    fn stale_frontier_catches_up_in_one_pass() {
        let mut h = Harness::new();
        h.lock(alice(), 100, 52, false);
        let projected = h.ledger.total_at(40);
        h.advance(40);
        assert_eq!(h.ledger.frontier(), 0);
        assert_eq!(h.ledger.checkpoint().unwrap(), 40);
        assert_eq!(h.ledger.frontier(), 40);
        assert_eq!(h.ledger.total_at(40), projected);
        assert_eq!(h.ledger.checkpoint().unwrap(), 40);
    }

    #[test]
    fn week_past_horizon_is_fatal() {
        let h = Harness::new();
        h.clock.set((u16::MAX as u64 + 1) * SECONDS_PER_WEEK);
        let err = h.ledger.current_week().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Arithmetic);
    }

    #[test]
    fn lock_past_horizon_is_rejected() {
        let mut h = Harness::new();
        h.clock.set((u16::MAX as u64 - 2) * SECONDS_PER_WEEK);
        let err = h.ledger.create_lock(&alice(), COIN, 4, false, &mut h.vault).unwrap_err();
        assert!(matches!(err, EbbError::Arithmetic(ArithmeticError::WeekOverflow(_))));
        assert_eq!(h.vault.balance(), 0);
        assert_eq!(h.week(), u16::MAX - 2);
    }

    #[test]
    fn clock_regression_is_rejected_before_transfer() {
        let mut h = Harness::new();
        h.advance(5);
        h.lock(alice(), 100 * COIN, 10, false);
        h.clock.set(4 * SECONDS_PER_WEEK);
        let before = h.ledger.state().clone();
        let held = h.vault.balance();

        let err = h.ledger.increase_amount(&alice(), COIN, &mut h.vault).unwrap_err();
        assert!(matches!(
            err,
            EbbError::Arithmetic(ArithmeticError::ClockRegressed { week: 4, frontier: 5 })
        ));
        assert!(h.ledger.create_lock(&bob(), COIN, 4, false, &mut h.vault).is_err());
        assert!(h.ledger.claim_early(&alice(), &mut h.vault).is_err());
        assert!(h.ledger.enable_auto_lock(&alice()).is_err());
        assert!(h.ledger.checkpoint().is_err());
        assert_eq!(h.ledger.state(), &before);
        assert_eq!(h.vault.balance(), held);

        h.advance(1);
        h.ledger.increase_amount(&alice(), COIN, &mut h.vault).unwrap();
        assert_eq!(h.vault.balance(), held + COIN);
    }

    #[test]
    fn rollback_restores_journaled_state() {
        let mut h = Harness::new();
        h.lock(alice(), 100, 4, false);
        assert!(h.ledger.take_journal().is_empty());
        h.advance(2);
        let before = h.ledger.state().clone();

        h.ledger.begin_journal();
        h.ledger.increase_weeks(&alice(), 8).unwrap();
        h.lock(bob(), 50, 3, true);
        h.ledger.set_min_lock_amount(7);
        let journal = h.ledger.take_journal();
        assert_eq!(journal.accounts().count(), 2);
        assert_eq!(journal.total_weeks(), Some(0..=2));
        assert_eq!(journal.unlock_weeks().collect::<Vec<_>>(), vec![4, 10]);
        assert!(journal.settings_changed());

        h.ledger.rollback(&journal);
        assert_eq!(h.ledger.state(), &before);
        assert_eq!(h.ledger.frontier(), 0);
        assert_eq!(h.ledger.weight_at(&alice(), 2), 200);
    }

    #[test]
    fn weight_source_reports_first_lock_week() {
        let mut h = Harness::new();
        h.advance(3);
        h.lock(alice(), 100, 2, false);
        let source: &dyn WeightSource = &h.ledger;
        assert_eq!(source.first_lock_week(&alice()), Some(3));
        assert_eq!(source.first_lock_week(&bob()), None);
        assert_eq!(source.current_week().unwrap(), 3);
    }
}
