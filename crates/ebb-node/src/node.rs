//! Node composition.
//!
//! [`Node`] owns the weight ledger, the reward distributor, the two token
//! vaults they move funds through, and the role table. Account-facing calls
//! pass straight through; admin calls are checked against the role table
//! before either engine runs.
//!
//! Every mutation is staged. The engines run against stand-in vaults that
//! record the one transfer the operation makes; the changed keys are then
//! written to the attached store, and only after that write succeeds does the
//! transfer reach the real vault. A failed write moves no funds, and a failed
//! transfer rolls memory and disk back to where they were.

use std::cell::Cell;
use std::sync::Arc;

use tracing::{error, info};

use ebb_core::error::{EbbError, TransferError};
use ebb_core::roles::RoleTable;
use ebb_core::traits::{Clock, TokenVault};
use ebb_core::types::{AccountId, LockInfo, LockParams, LockPosition, Role, Week};
use ebb_ledger::{EarlyExit, LedgerJournal, WeightLedger};
use ebb_rewards::{DistributorJournal, RewardDistributor};

use crate::config::NodeConfig;
use crate::storage::{RocksStore, StateStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VaultSide {
    Lock,
    Reservoir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    In,
    Out,
}

/// A transfer an operation asked for but has not yet made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Transfer {
    side: VaultSide,
    direction: Direction,
    account: AccountId,
    amount: u64,
}

/// Stand-in vault: reads through to the real one, records transfers.
///
/// Both stand-ins share one slot, so an operation can stage a single transfer.
struct Staging<'a, V> {
    vault: &'a V,
    side: VaultSide,
    slot: &'a Cell<Option<Transfer>>,
}

impl<V> Staging<'_, V> {
    fn stage(&mut self, direction: Direction, account: &AccountId, amount: u64) -> Result<(), TransferError> {
        if self.slot.get().is_some() {
            return Err(TransferError::Rejected("operation already staged a transfer".into()));
        }
        self.slot.set(Some(Transfer { side: self.side, direction, account: *account, amount }));
        Ok(())
    }
}

impl<V: TokenVault> TokenVault for Staging<'_, V> {
    fn balance(&self) -> u64 {
        self.vault.balance()
    }

    fn transfer_in(&mut self, from: &AccountId, amount: u64) -> Result<(), TransferError> {
        self.stage(Direction::In, from, amount)
    }

    fn transfer_out(&mut self, to: &AccountId, amount: u64) -> Result<(), TransferError> {
        self.stage(Direction::Out, to, amount)
    }
}

/// What a staged operation sees.
struct Staged<'a, V> {
    ledger: &'a mut WeightLedger,
    rewards: &'a mut RewardDistributor,
    lock_vault: Staging<'a, V>,
    reservoir: Staging<'a, V>,
}

/// Ledger, distributor, and vaults behind one role-gated surface.
///
/// `V` is the host's token vault: one instance holds locked principal, the
/// other is the reward reservoir.
pub struct Node<V: TokenVault> {
    ledger: WeightLedger,
    rewards: RewardDistributor,
    lock_vault: V,
    reservoir: V,
    roles: RoleTable,
    store: Option<Box<dyn StateStore>>,
}

impl<V: TokenVault> Node<V> {
    /// Build an in-memory node. Rewards start accruing from the current week.
    pub fn new(
        params: LockParams,
        clock: Arc<dyn Clock>,
        lock_vault: V,
        reservoir: V,
        roles: RoleTable,
    ) -> Result<Self, EbbError> {
        let ledger = WeightLedger::new(params, clock);
        let rewards = RewardDistributor::new(ledger.current_week()?);
        Ok(Self { ledger, rewards, lock_vault, reservoir, roles, store: None })
    }

    /// Open the RocksDB store under `config.data_dir` and resume from it.
    pub fn open(config: &NodeConfig, clock: Arc<dyn Clock>, lock_vault: V, reservoir: V) -> Result<Self, EbbError> {
        let store = RocksStore::open(config.db_path())?;
        info!(path = %config.db_path().display(), "ledger store opened");
        Self::open_with(Box::new(store), config, clock, lock_vault, reservoir)
    }

    /// Resume saved state from `store`, seeding it when empty.
    ///
    /// Roles come from `config`. A configured penalty receiver is applied
    /// only when none is stored.
    pub fn open_with(
        store: Box<dyn StateStore>,
        config: &NodeConfig,
        clock: Arc<dyn Clock>,
        lock_vault: V,
        reservoir: V,
    ) -> Result<Self, EbbError> {
        let mut node = match store.load()? {
            Some((ledger_state, rewards_state)) => {
                info!(frontier = ledger_state.rollup().frontier(), "resuming saved state");
                Self {
                    ledger: WeightLedger::from_state(ledger_state, clock),
                    rewards: RewardDistributor::from_state(rewards_state),
                    lock_vault,
                    reservoir,
                    roles: config.role_table(),
                    store: None,
                }
            }
            None => {
                let node = Self::new(config.lock_params(), clock, lock_vault, reservoir, config.role_table())?;
                store.save(node.ledger.state(), node.rewards.state())?;
                node
            }
        };
        node.store = Some(store);
        if node.ledger.penalty_receiver().is_none() {
            if let Some(receiver) = config.penalty_receiver() {
                node.mutate(|s| {
                    s.ledger.set_penalty_receiver(receiver);
                    Ok(())
                })?;
            }
        }
        Ok(node)
    }

    /// Run `op` staged, persist what it changed, then make its transfer.
    fn mutate<T>(&mut self, op: impl FnOnce(&mut Staged<'_, V>) -> Result<T, EbbError>) -> Result<T, EbbError> {
        let slot = Cell::new(None);
        self.ledger.begin_journal();
        self.rewards.begin_journal();
        let outcome = op(&mut Staged {
            ledger: &mut self.ledger,
            rewards: &mut self.rewards,
            lock_vault: Staging { vault: &self.lock_vault, side: VaultSide::Lock, slot: &slot },
            reservoir: Staging { vault: &self.reservoir, side: VaultSide::Reservoir, slot: &slot },
        });
        let ledger_journal = self.ledger.take_journal();
        let rewards_journal = self.rewards.take_journal();

        let out = match outcome {
            Ok(out) => out,
            Err(e) => {
                self.rollback(&ledger_journal, &rewards_journal);
                return Err(e);
            }
        };
        if let Err(e) = self.write_changes(&ledger_journal, &rewards_journal) {
            self.rollback(&ledger_journal, &rewards_journal);
            return Err(e);
        }
        if let Some(transfer) = slot.take() {
            if let Err(e) = self.execute(transfer) {
                self.rollback(&ledger_journal, &rewards_journal);
                if let Err(write) = self.write_changes(&ledger_journal, &rewards_journal) {
                    error!(%write, transfer = %e, "could not restore stored state after a failed transfer");
                    return Err(write);
                }
                return Err(e.into());
            }
        }
        Ok(out)
    }

    fn rollback(&mut self, ledger_journal: &LedgerJournal, rewards_journal: &DistributorJournal) {
        self.ledger.rollback(ledger_journal);
        self.rewards.rollback(rewards_journal);
    }

    fn write_changes(&self, ledger_journal: &LedgerJournal, rewards_journal: &DistributorJournal) -> Result<(), EbbError> {
        match &self.store {
            Some(store) => store.write_changes(self.ledger.state(), ledger_journal, self.rewards.state(), rewards_journal),
            None => Ok(()),
        }
    }

    fn execute(&mut self, transfer: Transfer) -> Result<(), TransferError> {
        let vault = match transfer.side {
            VaultSide::Lock => &mut self.lock_vault,
            VaultSide::Reservoir => &mut self.reservoir,
        };
        match transfer.direction {
            Direction::In => vault.transfer_in(&transfer.account, transfer.amount),
            Direction::Out => vault.transfer_out(&transfer.account, transfer.amount),
        }
    }

    // --- Accessors ---

    pub fn ledger(&self) -> &WeightLedger {
        &self.ledger
    }

    pub fn rewards(&self) -> &RewardDistributor {
        &self.rewards
    }

    pub fn lock_vault(&self) -> &V {
        &self.lock_vault
    }

    /// Host access to the lock vault, e.g. for funding accounts.
    pub fn lock_vault_mut(&mut self) -> &mut V {
        &mut self.lock_vault
    }

    pub fn reservoir(&self) -> &V {
        &self.reservoir
    }

    /// Host access to the reservoir, e.g. for reward emissions.
    pub fn reservoir_mut(&mut self) -> &mut V {
        &mut self.reservoir
    }

    pub fn roles(&self) -> &RoleTable {
        &self.roles
    }

    pub fn current_week(&self) -> Result<Week, EbbError> {
        self.ledger.current_week()
    }

    pub fn lock_info(&self, account: &AccountId) -> Result<Option<LockInfo>, EbbError> {
        self.ledger.lock_info(account)
    }

    /// Confirmed rewards for `account` and the week they run through.
    pub fn claimable(&self, account: &AccountId) -> (u64, Week) {
        self.rewards.get_claimable(account, &self.ledger)
    }

    /// Confirmed plus pending rewards for `account`.
    pub fn estimate_claimable(&self, account: &AccountId) -> Result<(u64, Week), EbbError> {
        self.rewards.estimate_claimable(account, &self.ledger, &self.reservoir)
    }

    // --- Account operations ---

    pub fn create_lock(&mut self, account: &AccountId, amount: u64, weeks: u16, auto_lock: bool) -> Result<LockPosition, EbbError> {
        self.mutate(|s| s.ledger.create_lock(account, amount, weeks, auto_lock, &mut s.lock_vault))
    }

    pub fn increase_amount(&mut self, account: &AccountId, amount: u64) -> Result<LockPosition, EbbError> {
        self.mutate(|s| s.ledger.increase_amount(account, amount, &mut s.lock_vault))
    }

    pub fn increase_weeks(&mut self, account: &AccountId, weeks: u16) -> Result<LockPosition, EbbError> {
        self.mutate(|s| s.ledger.increase_weeks(account, weeks))
    }

    pub fn enable_auto_lock(&mut self, account: &AccountId) -> Result<LockPosition, EbbError> {
        self.mutate(|s| s.ledger.enable_auto_lock(account))
    }

    pub fn disable_auto_lock(&mut self, account: &AccountId) -> Result<LockPosition, EbbError> {
        self.mutate(|s| s.ledger.disable_auto_lock(account))
    }

    /// Return the principal of an expired lock.
    pub fn claim_lock(&mut self, account: &AccountId) -> Result<u64, EbbError> {
        self.mutate(|s| s.ledger.claim(account, &mut s.lock_vault))
    }

    pub fn claim_early(&mut self, account: &AccountId) -> Result<EarlyExit, EbbError> {
        self.mutate(|s| s.ledger.claim_early(account, &mut s.lock_vault))
    }

    /// Pay `account`'s rewards to `to`.
    pub fn claim_rewards(&mut self, account: &AccountId, to: &AccountId) -> Result<u64, EbbError> {
        self.mutate(|s| s.rewards.claim(account, to, &*s.ledger, &mut s.reservoir))
    }

    /// Commit ledger totals and settle elapsed reward weeks.
    pub fn checkpoint(&mut self) -> Result<Week, EbbError> {
        self.mutate(|s| {
            s.ledger.checkpoint()?;
            s.rewards.checkpoint(&*s.ledger, &s.reservoir)
        })
    }

    // --- Admin operations ---

    /// Grant `role` to `account` for the life of this node.
    ///
    /// Not persisted: [`Node::open`] rebuilds roles from configuration.
    pub fn grant_role(&mut self, caller: &AccountId, role: Role, account: AccountId) -> Result<(), EbbError> {
        self.roles.require(caller, Role::Admin)?;
        info!(%caller, ?role, %account, "role granted");
        self.roles.grant(role, account);
        Ok(())
    }

    /// Revoke `role` from `account` for the life of this node.
    ///
    /// Not persisted: [`Node::open`] rebuilds roles from configuration.
    pub fn revoke_role(&mut self, caller: &AccountId, role: Role, account: &AccountId) -> Result<(), EbbError> {
        self.roles.require(caller, Role::Admin)?;
        info!(%caller, ?role, %account, "role revoked");
        self.roles.revoke(role, account);
        Ok(())
    }

    pub fn set_penalty_receiver(&mut self, caller: &AccountId, receiver: AccountId) -> Result<(), EbbError> {
        self.roles.require(caller, Role::Admin)?;
        self.mutate(|s| {
            s.ledger.set_penalty_receiver(receiver);
            Ok(())
        })
    }

    pub fn set_min_lock_amount(&mut self, caller: &AccountId, amount: u64) -> Result<(), EbbError> {
        self.roles.require(caller, Role::Admin)?;
        self.mutate(|s| {
            s.ledger.set_min_lock_amount(amount);
            Ok(())
        })
    }

    /// Swap the lock vault, returning the previous one.
    ///
    /// Principal already locked stays with the returned vault; the host
    /// moves it.
    pub fn replace_lock_vault(&mut self, caller: &AccountId, vault: V) -> Result<V, EbbError> {
        self.roles.require(caller, Role::Admin)?;
        info!(%caller, "lock vault replaced");
        Ok(std::mem::replace(&mut self.lock_vault, vault))
    }

    /// Pay accrued early-exit penalties to the penalty receiver.
    pub fn withdraw_penalty(&mut self, caller: &AccountId) -> Result<u64, EbbError> {
        self.roles.require(caller, Role::PenaltyManager)?;
        self.mutate(|s| s.ledger.withdraw_penalty(&mut s.lock_vault))
    }

    /// Move `amount` out of the reward reservoir.
    pub fn withdraw_rewards(&mut self, caller: &AccountId, to: &AccountId, amount: u64) -> Result<u64, EbbError> {
        self.roles.require(caller, Role::RewardManager)?;
        self.mutate(|s| s.rewards.withdraw(to, amount, &mut s.reservoir))
    }
}
