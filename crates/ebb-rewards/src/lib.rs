//! # ebb-rewards - Weekly reward distribution.
//!
//! Reward inflows are observed as increases in a reservoir's balance. Each
//! checkpoint attributes the increase since the previous one to the weeks
//! that have fully elapsed, and each account earns a share of a week's
//! reward proportional to its weight in that week. Weight is read from the
//! ledger through [`WeightSource`](ebb_core::traits::WeightSource); this
//! crate never mutates lock state.

pub mod distributor;

pub use distributor::{CheckpointPlan, DistributorJournal, DistributorState, RewardDistributor};
