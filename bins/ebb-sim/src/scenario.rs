//! JSON scenarios replayed against a node.
//!
//! Accounts are named by label (or 64-char hex) and resolved the same way
//! configuration files resolve them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use ebb_core::clock::ManualClock;
use ebb_core::error::EbbError;
use ebb_core::traits::TokenVault;
use ebb_core::vault::MemoryVault;
use ebb_node_lib::config::resolve_account;
use ebb_node_lib::Node;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Starting balance per account, in base units.
    #[serde(default)]
    pub balances: BTreeMap<String, u64>,
    /// Accounts included in the final report. Defaults to every funded account.
    #[serde(default)]
    pub report: Vec<String>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Move the clock forward.
    Advance { weeks: u64 },
    /// External reward emission into the reservoir.
    Emit { amount: u64 },
    Checkpoint,
    Lock {
        account: String,
        amount: u64,
        weeks: u16,
        #[serde(default)]
        auto_lock: bool,
    },
    IncreaseAmount { account: String, amount: u64 },
    IncreaseWeeks { account: String, weeks: u16 },
    EnableAutoLock { account: String },
    DisableAutoLock { account: String },
    ClaimLock { account: String },
    ClaimEarly { account: String },
    ClaimRewards {
        account: String,
        #[serde(default)]
        to: Option<String>,
    },
    SetPenaltyReceiver { caller: String, receiver: String },
    WithdrawPenalty { caller: String },
    WithdrawRewards { caller: String, to: String, amount: u64 },
}

impl Step {
    /// Apply this step, returning a JSON summary of its effect.
    pub fn apply(&self, node: &mut Node<MemoryVault>, clock: &ManualClock) -> Result<Value, EbbError> {
        let out = match self {
            Step::Advance { weeks } => {
                clock.advance_weeks(*weeks);
                json!({ "week": node.current_week()? })
            }
            Step::Emit { amount } => {
                node.reservoir_mut().deposit(*amount);
                json!({ "reservoir": node.reservoir().balance() })
            }
            Step::Checkpoint => json!({ "last_checkpoint_week": node.checkpoint()? }),
            Step::Lock { account, amount, weeks, auto_lock } => {
                json!(node.create_lock(&resolve_account(account), *amount, *weeks, *auto_lock)?)
            }
            Step::IncreaseAmount { account, amount } => {
                json!(node.increase_amount(&resolve_account(account), *amount)?)
            }
            Step::IncreaseWeeks { account, weeks } => {
                json!(node.increase_weeks(&resolve_account(account), *weeks)?)
            }
            Step::EnableAutoLock { account } => json!(node.enable_auto_lock(&resolve_account(account))?),
            Step::DisableAutoLock { account } => json!(node.disable_auto_lock(&resolve_account(account))?),
            Step::ClaimLock { account } => json!({ "amount": node.claim_lock(&resolve_account(account))? }),
            Step::ClaimEarly { account } => {
                let exit = node.claim_early(&resolve_account(account))?;
                json!({ "payout": exit.payout, "penalty": exit.penalty })
            }
            Step::ClaimRewards { account, to } => {
                let account = resolve_account(account);
                let to = to.as_deref().map_or(account, resolve_account);
                json!({ "amount": node.claim_rewards(&account, &to)? })
            }
            Step::SetPenaltyReceiver { caller, receiver } => {
                node.set_penalty_receiver(&resolve_account(caller), resolve_account(receiver))?;
                json!({})
            }
            Step::WithdrawPenalty { caller } => json!({ "amount": node.withdraw_penalty(&resolve_account(caller))? }),
            Step::WithdrawRewards { caller, to, amount } => {
                let paid = node.withdraw_rewards(&resolve_account(caller), &resolve_account(to), *amount)?;
                json!({ "amount": paid })
            }
        };
        Ok(out)
    }
}

/// State summary for the named accounts.
pub fn report(node: &Node<MemoryVault>, accounts: &[String]) -> Result<Value, EbbError> {
    let week = node.current_week()?;
    let mut per_account = serde_json::Map::new();
    for name in accounts {
        let id = resolve_account(name);
        let (claimable, through) = node.claimable(&id);
        per_account.insert(
            name.clone(),
            json!({
                "id": id.to_string(),
                "lock": node.lock_info(&id)?,
                "weight": node.ledger().weight_at(&id, week).to_string(),
                "claimable": claimable,
                "claimable_through": through,
                "wallet": node.lock_vault().holder_balance(&id),
                "rewards_received": node.reservoir().holder_balance(&id),
            }),
        );
    }
    Ok(json!({
        "week": week,
        "frontier": node.ledger().frontier(),
        "total_weight": node.ledger().total_weight_at(week).to_string(),
        "locked": node.lock_vault().balance(),
        "reservoir": node.reservoir().balance(),
        "penalty_total": node.ledger().penalty_total(),
        "last_checkpoint_week": node.rewards().last_checkpoint_week(),
        "accounts": per_account,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_parse_from_tagged_json() {
        let raw = r#"{
            "balances": { "alice": 100 },
            "steps": [
                { "op": "lock", "account": "alice", "amount": 100, "weeks": 4 },
                { "op": "advance", "weeks": 1 },
                { "op": "claim_rewards", "account": "alice" },
                { "op": "checkpoint" }
            ]
        }"#;
        let scenario: Scenario = serde_json::from_str(raw).unwrap();
        assert_eq!(scenario.steps.len(), 4);
        assert!(matches!(
            scenario.steps[0],
            Step::Lock { amount: 100, weeks: 4, auto_lock: false, .. }
        ));
        assert!(matches!(scenario.steps[2], Step::ClaimRewards { to: None, .. }));
        assert!(scenario.report.is_empty());
    }

    #[test]
    fn unknown_op_is_rejected() {
        let raw = r#"{ "steps": [ { "op": "mint", "amount": 1 } ] }"#;
        assert!(serde_json::from_str::<Scenario>(raw).is_err());
    }
}
