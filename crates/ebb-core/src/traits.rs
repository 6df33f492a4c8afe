//! Trait interfaces for the Ebb ledger.
//!
//! These traits define the contracts between crates and the host:
//! - [`Clock`] - monotonic Unix time (the host supplies it)
//! - [`TokenVault`] - atomic-or-fail token movements (the host supplies it)
//! - [`WeightSource`] - read-only historical weight queries (ebb-ledger implements)
//! - [`Authorizer`] - role predicate for admin entry points (checked by ebb-node)

use crate::error::{EbbError, TransferError};
use crate::types::{AccountId, Role, Week};

/// Source of the current Unix time in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// A token pool the ledger pulls principal into and pays out of.
///
/// Each transfer either completes fully or fails without effect.
pub trait TokenVault {
    /// Tokens currently held by the pool.
    fn balance(&self) -> u64;

    /// Move `amount` from `from` into the pool.
    fn transfer_in(&mut self, from: &AccountId, amount: u64) -> Result<(), TransferError>;

    /// Move `amount` from the pool to `to`.
    fn transfer_out(&mut self, to: &AccountId, amount: u64) -> Result<(), TransferError>;
}

/// Read-only view of historical lock weight.
///
/// Every method is a pure function of persisted state: calling one never
/// changes what any later call returns.
pub trait WeightSource {
    /// The week containing the clock's current time.
    fn current_week(&self) -> Result<Week, EbbError>;

    /// Weight held by `account` at `week`. Zero before its first lock.
    fn weight_at(&self, account: &AccountId, week: Week) -> u128;

    /// Sum of all accounts' weight at `week`.
    fn total_weight_at(&self, week: Week) -> u128;

    /// First week in which `account` ever held a lock, if any.
    fn first_lock_week(&self, account: &AccountId) -> Option<Week>;
}

/// Role predicate consulted before admin operations run.
pub trait Authorizer {
    fn is_authorized(&self, caller: &AccountId, role: Role) -> bool;
}
