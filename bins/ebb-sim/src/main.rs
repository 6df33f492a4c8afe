//! Ebb ledger simulator.
//!
//! Replays a JSON scenario of locks, reward emissions, claims, and clock
//! advances against a node driven by a manual clock, and prints a JSON
//! transcript followed by a state report.

mod scenario;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};

use ebb_core::clock::ManualClock;
use ebb_core::vault::MemoryVault;
use ebb_node_lib::config::resolve_account;
use ebb_node_lib::{Node, NodeConfig};

use crate::scenario::{report, Scenario};

/// Ebb vote-escrow ledger simulator.
#[derive(Parser, Debug)]
#[command(name = "ebb-sim", version, about = "Replay lock and reward scenarios against the Ebb ledger")]
struct Cli {
    /// Optional TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides configuration)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a scenario file
    Run {
        /// Path to the scenario JSON
        scenario: PathBuf,

        /// Persist state to the data directory and resume from it
        #[arg(long)]
        persist: bool,

        /// Grant every role to this account (label or hex)
        #[arg(long, default_value = "admin")]
        operator: String,
    },
    /// Print the configuration that would be used
    ShowConfig,
}

impl Cli {
    /// Load configuration and apply CLI overrides.
    fn resolve_config(&self) -> Result<NodeConfig> {
        let mut config = NodeConfig::load(self.config.as_deref()).context("failed to load configuration")?;
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    init_logging(&config.log_level, &config.log_format);

    match cli.command {
        Command::Run { scenario, persist, operator } => run(&config, &scenario, persist, &operator),
        Command::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn run(config: &NodeConfig, path: &Path, persist: bool, operator: &str) -> Result<()> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let scenario: Scenario = serde_json::from_str(&raw).with_context(|| format!("invalid scenario {}", path.display()))?;

    // The operator holds every role for the length of the run.
    let mut config = config.clone();
    let operator_id = resolve_account(operator);
    config.roles.admins.push(operator.to_string());
    config.roles.penalty_managers.push(operator.to_string());
    config.roles.reward_managers.push(operator.to_string());

    let clock = Arc::new(ManualClock::new(config.epoch_start));
    let mut lock_vault = MemoryVault::new();
    for (name, amount) in &scenario.balances {
        lock_vault.mint(&resolve_account(name), *amount);
    }

    let mut node = if persist {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("failed to create {}", config.data_dir.display()))?;
        Node::open(&config, clock.clone(), lock_vault, MemoryVault::new())?
    } else {
        let mut node = Node::new(config.lock_params(), clock.clone(), lock_vault, MemoryVault::new(), config.role_table())?;
        if let Some(receiver) = config.penalty_receiver() {
            node.set_penalty_receiver(&operator_id, receiver)?;
        }
        node
    };

    info!(steps = scenario.steps.len(), operator = %operator_id, "replaying scenario");
    let mut transcript = Vec::with_capacity(scenario.steps.len());
    for (i, step) in scenario.steps.iter().enumerate() {
        let entry = match step.apply(&mut node, &clock) {
            Ok(result) => json!({ "step": i, "input": step, "ok": true, "result": result }),
            Err(e) => {
                warn!(step = i, kind = ?e.kind(), "step failed: {e}");
                json!({ "step": i, "input": step, "ok": false, "error": e.to_string() })
            }
        };
        transcript.push(entry);
    }

    let accounts: Vec<String> = if scenario.report.is_empty() {
        scenario.balances.keys().cloned().collect()
    } else {
        scenario.report.clone()
    };
    let output = json!({
        "transcript": transcript,
        "report": report(&node, &accounts)?,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Logs go to stderr so stdout stays valid JSON. `RUST_LOG` takes precedence
/// over `level_str`.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init();
    }
}
