//! Node configuration.
//!
//! [`NodeConfig`] is resolved in layers, highest priority first:
//! 1. CLI flags (applied by the binary after loading)
//! 2. Environment variables (`EBB_*`, e.g. `EBB_LOG_LEVEL=debug`)
//! 3. An optional TOML file
//! 4. Compiled defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ebb_core::constants::{DEFAULT_EPOCH_START, DEFAULT_MIN_LOCK_AMOUNT};
use ebb_core::roles::RoleTable;
use ebb_core::types::{AccountId, LockParams, Role};

/// Accounts named in configuration, by label or 64-char hex id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RoleConfig {
    pub admins: Vec<String>,
    pub penalty_managers: Vec<String>,
    pub reward_managers: Vec<String>,
}

/// Configuration for a node instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Unix time at which week 0 starts.
    pub epoch_start: u64,
    /// Floor for new locks, in base units.
    pub min_lock_amount: u64,
    /// Log level filter string (e.g. "info", "debug", "ebb_ledger=trace").
    pub log_level: String,
    /// `text` or `json`.
    pub log_format: String,
    /// Receiver of withdrawn early-exit penalties, if known at start-up.
    pub penalty_receiver: Option<String>,
    pub roles: RoleConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ebb");

        Self {
            data_dir,
            epoch_start: DEFAULT_EPOCH_START,
            min_lock_amount: DEFAULT_MIN_LOCK_AMOUNT,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            penalty_receiver: None,
            roles: RoleConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load from `file` (if given and present) layered under `EBB_*` variables.
    pub fn load(file: Option<&Path>) -> Result<Self, ::config::ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(::config::File::from(path).required(false));
        }
        builder
            .add_source(::config::Environment::with_prefix("EBB").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Path to the RocksDB ledger directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("ledgerdata")
    }

    pub fn lock_params(&self) -> LockParams {
        LockParams {
            epoch_start: self.epoch_start,
            min_lock_amount: self.min_lock_amount,
        }
    }

    pub fn penalty_receiver(&self) -> Option<AccountId> {
        self.penalty_receiver.as_deref().map(resolve_account)
    }

    /// Role membership named in configuration.
    pub fn role_table(&self) -> RoleTable {
        let mut roles = RoleTable::new();
        let groups = [
            (Role::Admin, &self.roles.admins),
            (Role::PenaltyManager, &self.roles.penalty_managers),
            (Role::RewardManager, &self.roles.reward_managers),
        ];
        for (role, members) in groups {
            for name in members {
                roles.grant(role, resolve_account(name));
            }
        }
        roles
    }
}

/// A hex account id, or the id derived from a label.
pub fn resolve_account(name: &str) -> AccountId {
    name.parse().unwrap_or_else(|_| AccountId::from_label(name))
}
