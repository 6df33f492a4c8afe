//! Cross-crate test suite for Ebb.
//!
//! Integration tests drive the ledger and distributor together through
//! [`helpers::World`] and check the system-wide invariants: weight
//! conservation, aggregate consistency, checkpoint gap equivalence, and
//! reward conservation.

pub mod helpers;
