//! # ebb-core
//! Foundation types, errors, and trait seams for the Ebb vote-escrow ledger.
//!
//! - [`types`] - weeks, accounts, lock positions, weight snapshots
//! - [`week`] - timestamp to week-index conversion
//! - [`math`] - integer pro-rata helpers shared by the ledger and distributor
//! - [`traits`] - contracts for the clock, token vaults, weight queries, and authorization
//! - [`clock`], [`vault`], [`roles`] - in-memory implementations of those contracts

pub mod clock;
pub mod constants;
pub mod error;
pub mod math;
pub mod roles;
pub mod traits;
pub mod types;
pub mod vault;
pub mod week;
