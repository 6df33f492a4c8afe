//! Shared test helpers for integration and property tests.

use std::sync::Arc;

use proptest::prelude::*;

use ebb_core::clock::ManualClock;
use ebb_core::error::EbbError;
use ebb_core::types::{AccountId, LockParams, LockPosition, Week};
use ebb_core::vault::MemoryVault;
use ebb_ledger::WeightLedger;
use ebb_rewards::RewardDistributor;

/// Simple account id from a seed byte.
pub fn acct(seed: u8) -> AccountId {
    AccountId([seed; 32])
}

/// A ledger and distributor sharing one manual clock, with in-memory vaults.
pub struct World {
    pub clock: Arc<ManualClock>,
    pub ledger: WeightLedger,
    pub rewards: RewardDistributor,
    /// Holds locked principal.
    pub vault: MemoryVault,
    /// Receives reward emissions.
    pub reservoir: MemoryVault,
    /// Total ever emitted into the reservoir.
    pub emitted: u64,
}

impl World {
    /// Fund each of `accounts` with `balance` and start at week 0.
    ///
    /// The lock floor is 1 base unit so small amounts keep arithmetic exact.
    pub fn new(accounts: &[AccountId], balance: u64) -> Self {
        let clock = Arc::new(ManualClock::new(0));
        let params = LockParams { epoch_start: 0, min_lock_amount: 1 };
        let mut vault = MemoryVault::new();
        for a in accounts {
            vault.mint(a, balance);
        }
        Self {
            ledger: WeightLedger::new(params, clock.clone()),
            rewards: RewardDistributor::new(0),
            clock,
            vault,
            reservoir: MemoryVault::new(),
            emitted: 0,
        }
    }

    pub fn week(&self) -> Week {
        self.ledger.current_week().expect("week within horizon")
    }

    pub fn advance(&self, weeks: u64) {
        self.clock.advance_weeks(weeks);
    }

    pub fn lock(&mut self, who: &AccountId, amount: u64, weeks: u16, auto: bool) -> Result<LockPosition, EbbError> {
        self.ledger.create_lock(who, amount, weeks, auto, &mut self.vault)
    }

    /// Deposit a reward emission into the reservoir.
    pub fn emit(&mut self, amount: u64) {
        self.reservoir.deposit(amount);
        self.emitted += amount;
    }

    /// Commit ledger totals and settle elapsed reward weeks.
    pub fn checkpoint(&mut self) -> Week {
        self.ledger.checkpoint().expect("ledger checkpoint");
        self.rewards
            .checkpoint(&self.ledger, &self.reservoir)
            .expect("reward checkpoint")
    }

    pub fn claimable(&self, who: &AccountId) -> u64 {
        self.rewards.get_claimable(who, &self.ledger).0
    }

    pub fn claim_rewards(&mut self, who: &AccountId) -> Result<u64, EbbError> {
        self.rewards.claim(who, who, &self.ledger, &mut self.reservoir)
    }

    /// Sum of every account's weight at `week`.
    pub fn sum_of_weights(&self, week: Week) -> u128 {
        self.ledger.accounts().map(|a| self.ledger.weight_at(a, week)).sum()
    }

    /// Sum of settled rewards across all weeks.
    pub fn settled_rewards(&self) -> u64 {
        (0..self.rewards.last_checkpoint_week())
            .map(|w| self.rewards.reward_per_week(w))
            .sum()
    }

    /// Apply `op`, ignoring rejections. Returns whether it succeeded.
    pub fn apply(&mut self, op: &Op) -> bool {
        let result = match *op {
            Op::Lock { who, amount, weeks, auto } => self.lock(&acct(who), amount, weeks, auto).map(drop),
            Op::IncreaseAmount { who, amount } => {
                self.ledger.increase_amount(&acct(who), amount, &mut self.vault).map(drop)
            }
            Op::IncreaseWeeks { who, weeks } => self.ledger.increase_weeks(&acct(who), weeks).map(drop),
            Op::EnableAutoLock { who } => self.ledger.enable_auto_lock(&acct(who)).map(drop),
            Op::DisableAutoLock { who } => self.ledger.disable_auto_lock(&acct(who)).map(drop),
            Op::Claim { who } => self.ledger.claim(&acct(who), &mut self.vault).map(drop),
            Op::ClaimEarly { who } => self.ledger.claim_early(&acct(who), &mut self.vault).map(drop),
            Op::ClaimRewards { who } => self.claim_rewards(&acct(who)).map(drop),
            Op::Emit { amount } => {
                self.emit(amount);
                Ok(())
            }
            Op::Advance { weeks } => {
                self.advance(weeks);
                Ok(())
            }
            Op::Checkpoint => {
                self.checkpoint();
                Ok(())
            }
        };
        result.is_ok()
    }
}

/// Random operation over a small population of accounts (seeds 1..=4).
#[derive(Debug, Clone, Copy)]
pub enum Op {
    Lock { who: u8, amount: u64, weeks: u16, auto: bool },
    IncreaseAmount { who: u8, amount: u64 },
    IncreaseWeeks { who: u8, weeks: u16 },
    EnableAutoLock { who: u8 },
    DisableAutoLock { who: u8 },
    Claim { who: u8 },
    ClaimEarly { who: u8 },
    ClaimRewards { who: u8 },
    Emit { amount: u64 },
    Advance { weeks: u64 },
    Checkpoint,
}

/// Accounts touched by [`op_strategy`].
pub fn population() -> Vec<AccountId> {
    (1..=4).map(acct).collect()
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    let who = 1u8..=4;
    prop_oneof![
        4 => (who.clone(), 1u64..10_000, 1u16..=52, any::<bool>())
            .prop_map(|(who, amount, weeks, auto)| Op::Lock { who, amount, weeks, auto }),
        2 => (who.clone(), 1u64..5_000).prop_map(|(who, amount)| Op::IncreaseAmount { who, amount }),
        2 => (who.clone(), 1u16..=52).prop_map(|(who, weeks)| Op::IncreaseWeeks { who, weeks }),
        1 => who.clone().prop_map(|who| Op::EnableAutoLock { who }),
        1 => who.clone().prop_map(|who| Op::DisableAutoLock { who }),
        1 => who.clone().prop_map(|who| Op::Claim { who }),
        1 => who.clone().prop_map(|who| Op::ClaimEarly { who }),
        1 => who.prop_map(|who| Op::ClaimRewards { who }),
        2 => (0u64..1_000_000).prop_map(|amount| Op::Emit { amount }),
        3 => (0u64..6).prop_map(|weeks| Op::Advance { weeks }),
        1 => Just(Op::Checkpoint),
    ]
}
