//! # ebb-ledger - Vote-escrow weight ledger.
//!
//! All calculations use integer arithmetic only.
//!
//! - **Lock positions**: one per account, decaying linearly from
//!   `amount * weeks` to zero at the unlock week, or frozen at that value
//!   while auto-locked.
//! - **Weight history**: per-account snapshots written only in weeks where
//!   the lock changed; weight at any past week is derived from the snapshot
//!   in force.
//! - **Global rollup**: week-indexed totals advanced one week at a time, with
//!   a schedule of principal leaving the pool at each future week.
//! - **Journal**: optional record of pre-write values, so a host can persist
//!   only what an operation touched and undo it if a later step fails.

pub mod history;
pub mod journal;
pub mod ledger;
pub mod rollup;

pub use history::AccountHistory;
pub use journal::LedgerJournal;
pub use ledger::{EarlyExit, LedgerSettings, LedgerState, WeightLedger};
pub use rollup::Rollup;
