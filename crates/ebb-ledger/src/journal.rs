//! Undo journal for ledger operations.
//!
//! While a journal is open, the ledger records the value every key held
//! before the first write to it: touched accounts, the frontier point, each
//! touched unlock week, and the ledger-wide settings. The host uses the
//! journal two ways. Its key set names exactly what a persistence batch must
//! rewrite, and [`WeightLedger::rollback`](crate::WeightLedger::rollback)
//! restores the recorded values when a staged operation has to be abandoned.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use ebb_core::types::{AccountId, AggregatePoint, LockPosition, Week};

use crate::history::AccountHistory;
use crate::ledger::LedgerSettings;

/// An account's position and history before the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AccountUndo {
    pub(crate) position: Option<LockPosition>,
    pub(crate) history: Option<AccountHistory>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerJournal {
    pub(crate) accounts: BTreeMap<AccountId, AccountUndo>,
    /// Frontier week and its totals when the journal opened.
    pub(crate) frontier: Option<(Week, AggregatePoint)>,
    /// Frontier when the journal was taken.
    pub(crate) staged_frontier: Week,
    pub(crate) unlocks: BTreeMap<Week, u128>,
    pub(crate) settings: Option<LedgerSettings>,
}

impl LedgerJournal {
    /// True when the operation wrote nothing.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.frontier.is_none() && self.unlocks.is_empty() && self.settings.is_none()
    }

    /// Accounts whose position or history was written.
    pub fn accounts(&self) -> impl Iterator<Item = &AccountId> {
        self.accounts.keys()
    }

    /// Weeks whose committed totals may differ from what was stored.
    ///
    /// Spans the frontier before the operation through the frontier after
    /// it; after a rollback the upper part of the range is no longer
    /// committed.
    pub fn total_weeks(&self) -> Option<RangeInclusive<Week>> {
        self.frontier
            .map(|(week, _)| week..=self.staged_frontier.max(week))
    }

    /// Weeks whose scheduled unlock was written.
    pub fn unlock_weeks(&self) -> impl Iterator<Item = Week> + '_ {
        self.unlocks.keys().copied()
    }

    pub fn settings_changed(&self) -> bool {
        self.settings.is_some()
    }
}
