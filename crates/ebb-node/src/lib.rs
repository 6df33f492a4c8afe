//! # ebb-node - Ledger composition, storage, configuration.
//!
//! Composes the Ebb subsystems into one host-facing service:
//! - [`storage::RocksStore`] - per-entity ledger and distributor state backed by RocksDB, behind [`storage::StateStore`]
//! - [`node::Node`] - wires ledger, distributor, vaults, and roles; gates admin operations
//! - [`config::NodeConfig`] - layered configuration (file, environment, defaults)

pub mod config;
pub mod node;
pub mod storage;

pub use config::NodeConfig;
pub use node::Node;
pub use storage::{RocksStore, StateStore};
