//! In-memory token vault.
//!
//! Tracks holder balances and the pool balance in `HashMap`s with no
//! persistence. Used by tests and the simulator as the lock vault and as the
//! reward reservoir; production hosts plug in their own [`TokenVault`].

use std::collections::HashMap;

use crate::error::TransferError;
use crate::traits::TokenVault;
use crate::types::AccountId;

#[derive(Debug, Clone, Default)]
pub struct MemoryVault {
    /// Tokens held by the pool.
    pool: u64,
    /// Holder balances outside the pool.
    holders: HashMap<AccountId, u64>,
    /// When set, every transfer is rejected.
    reject_transfers: bool,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` to a holder from outside the system.
    pub fn mint(&mut self, holder: &AccountId, amount: u64) {
        *self.holders.entry(*holder).or_default() += amount;
    }

    /// Credit `amount` directly to the pool (an external emission).
    pub fn deposit(&mut self, amount: u64) {
        self.pool += amount;
    }

    /// Balance held by `holder` outside the pool.
    pub fn holder_balance(&self, holder: &AccountId) -> u64 {
        self.holders.get(holder).copied().unwrap_or(0)
    }

    /// Make every subsequent transfer fail until cleared.
    pub fn set_reject_transfers(&mut self, reject: bool) {
        self.reject_transfers = reject;
    }

    fn check_enabled(&self) -> Result<(), TransferError> {
        if self.reject_transfers {
            return Err(TransferError::Rejected("vault rejecting transfers".to_string()));
        }
        Ok(())
    }
}

impl TokenVault for MemoryVault {
    fn balance(&self) -> u64 {
        self.pool
    }

    fn transfer_in(&mut self, from: &AccountId, amount: u64) -> Result<(), TransferError> {
        self.check_enabled()?;
        let have = self.holder_balance(from);
        if have < amount {
            return Err(TransferError::InsufficientFunds { have, need: amount });
        }
        let pool = self
            .pool
            .checked_add(amount)
            .ok_or_else(|| TransferError::Rejected("pool overflow".to_string()))?;
        self.holders.insert(*from, have - amount);
        self.pool = pool;
        Ok(())
    }

    fn transfer_out(&mut self, to: &AccountId, amount: u64) -> Result<(), TransferError> {
        self.check_enabled()?;
        if self.pool < amount {
            return Err(TransferError::InsufficientFunds { have: self.pool, need: amount });
        }
        self.pool -= amount;
        *self.holders.entry(*to).or_default() += amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> AccountId {
        AccountId([0xA1; 32])
    }

    #[test]
    fn transfer_in_moves_funds_to_pool() {
        let mut v = MemoryVault::new();
        v.mint(&alice(), 100);
        v.transfer_in(&alice(), 60).unwrap();
        assert_eq!(v.balance(), 60);
        assert_eq!(v.holder_balance(&alice()), 40);
    }

    #[test]
    fn transfer_in_without_funds_fails_cleanly() {
        let mut v = MemoryVault::new();
        v.mint(&alice(), 10);
        let err = v.transfer_in(&alice(), 11).unwrap_err();
        assert_eq!(err, TransferError::InsufficientFunds { have: 10, need: 11 });
        assert_eq!(v.balance(), 0);
        assert_eq!(v.holder_balance(&alice()), 10);
    }

    #[test]
    fn transfer_out_pays_holder() {
        let mut v = MemoryVault::new();
        v.deposit(50);
        v.transfer_out(&alice(), 20).unwrap();
        assert_eq!(v.balance(), 30);
        assert_eq!(v.holder_balance(&alice()), 20);
        assert!(v.transfer_out(&alice(), 31).is_err());
    }

    #[test]
    fn rejecting_vault_changes_nothing() {
        let mut v = MemoryVault::new();
        v.deposit(50);
        v.mint(&alice(), 5);
        v.set_reject_transfers(true);
        assert!(matches!(v.transfer_out(&alice(), 1), Err(TransferError::Rejected(_))));
        assert!(v.transfer_in(&alice(), 1).is_err());
        assert_eq!(v.balance(), 50);
        assert_eq!(v.holder_balance(&alice()), 5);
    }
}
