//! Volume Simulator
//!
//! Operator CLI for the batch swap orchestrator.
//!
//! ## Commands
//!
//! - **create-wallets**: generate a fresh set of agent wallets
//! - **wallets** / **balance** / **fund-info**: inspect and fund the pool
//! - **check-token**: validate a target mint against the ledger
//! - **simulate**: run one swap per agent in paced batches

// Compiler warning configuration
#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(dead_code)]
#![warn(unused_must_use)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use volume_sim::config::{parse_mint, Config};
use volume_sim::ledger::{require_account, Ledger, RpcLedger};
use volume_sim::metrics::metrics;
use volume_sim::swap_api::JupiterApi;
use volume_sim::types::LAMPORTS_PER_SOL;
use volume_sim::wallet::{funding_estimate_sol, AgentStore, BalanceSummary};
use volume_sim::{BatchCoordinator, ProgressReport};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate fresh agent wallets, replacing the stored set
    CreateWallets {
        #[arg(long)]
        count: Option<usize>,
    },
    /// List agent addresses
    Wallets,
    /// Summarise balances of the first wallets
    Balance {
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Show how much SOL the pool needs
    FundInfo,
    /// Check that a token mint exists on-chain
    CheckToken { mint: String },
    /// Run one swap per agent
    Simulate {
        /// Target token mint (falls back to the configured one)
        #[arg(long)]
        token: Option<String>,

        #[arg(long)]
        batch_size: Option<usize>,

        /// Print Prometheus metrics after the run
        #[arg(long)]
        metrics_dump: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args.config)?;
    init_logging(args.verbose, args.json_logs || config.monitoring.json_logs)?;
    config.validate().context("Invalid configuration")?;

    let store = AgentStore::new(&config.wallet.path);

    match args.command {
        Command::CreateWallets { count } => {
            let count = count.unwrap_or(config.wallet.default_count);
            info!("🔄 Generating {} wallets...", count);
            store.generate(count)?;
            info!("✅ Created {} wallets in {}", count, store.path().display());
        }
        Command::Wallets => {
            let agents = store.load()?;
            if agents.is_empty() {
                warn!("❌ No wallets found. Run create-wallets first.");
                return Ok(());
            }
            for (i, agent) in agents.iter().enumerate() {
                println!("{}. {}", i + 1, agent.pubkey());
            }
        }
        Command::Balance { limit } => {
            let agents = store.load()?;
            if agents.is_empty() {
                warn!("❌ No wallets found. Run create-wallets first.");
                return Ok(());
            }
            let ledger = RpcLedger::new(config.ledger_config());
            info!("🔄 Checking balances...");
            let mut balances = Vec::with_capacity(limit);
            for agent in agents.iter().take(limit) {
                balances.push(
                    ledger
                        .get_balance(&agent.pubkey())
                        .await
                        .with_context(|| format!("Failed to fetch balance of {}", agent.pubkey()))?,
                );
            }
            let summary = BalanceSummary::from_balances(&balances);
            info!("💰 Balance Summary (first {} wallets):", summary.checked);
            info!("   Funded wallets: {}/{}", summary.funded, summary.checked);
            info!("   Total SOL: {:.4}", summary.total_sol());
            info!("   Average: {:.4} SOL per wallet", summary.average_sol());
            if summary.needs_funding() {
                warn!("⚠️ Consider funding more wallets before simulation");
            } else {
                info!("✅ Good funding level");
            }
        }
        Command::FundInfo => {
            let agents = store.load()?;
            if agents.is_empty() {
                warn!("❌ No wallets found. Run create-wallets first.");
                return Ok(());
            }
            info!("💰 Funding Instructions:");
            info!(
                "   Each wallet needs ~0.01-0.02 SOL for transaction fees plus ~0.01 SOL to swap"
            );
            info!(
                "   Total needed: ~{:.2} SOL for all {} wallets",
                funding_estimate_sol(agents.len()),
                agents.len()
            );
            info!("   Use the wallets command to list addresses");
        }
        Command::CheckToken { mint } => {
            let mint = parse_mint(&mint)?;
            let ledger = RpcLedger::new(config.ledger_config());
            require_account(&ledger, &mint)
                .await
                .context("Token mint check failed")?;
            info!("✅ Token mint found: {}", mint);
        }
        Command::Simulate {
            token,
            batch_size,
            metrics_dump,
        } => {
            let target = match token {
                Some(mint) => parse_mint(&mint)?,
                None => config
                    .target_mint()?
                    .context("No target token set, pass --token or set simulation.target_mint")?,
            };
            simulate(&config, &store, target, batch_size).await?;

            if metrics_dump && config.monitoring.enable_metrics {
                println!("{}", metrics().export_text()?);
            }
        }
    }

    Ok(())
}

async fn simulate(
    config: &Config,
    store: &AgentStore,
    target: Pubkey,
    batch_size: Option<usize>,
) -> Result<()> {
    let agents = store.load()?;

    let ledger: Arc<dyn Ledger> = Arc::new(RpcLedger::new(config.ledger_config()));
    require_account(ledger.as_ref(), &target)
        .await
        .context("Token mint check failed")?;

    let api = JupiterApi::new(
        &config.swap_api.base_url,
        std::time::Duration::from_millis(config.swap_api.call_timeout_ms),
    )?
    .with_api_key(config.swap_api.api_key.clone());

    let mut settings = config.run_settings();
    if let Some(size) = batch_size {
        settings.batch_size = size;
    }

    let coordinator = BatchCoordinator::new(Arc::new(api), ledger, settings);
    let cancel = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Received shutdown signal, finishing current batch");
            cancel.cancel();
        }
    });

    info!("🎬 Simulating volume for {} with {} wallets", target, agents.len());
    let summary = coordinator
        .run(&agents, target, &mut |report: &ProgressReport| {
            info!(
                "📊 Batch {}/{} done: {}",
                report.batch_index + 1,
                report.total_batches,
                report.cumulative
            );
        })
        .await?;

    info!("🎉 Simulation completed!");
    info!("   Total wallets: {}", summary.total_agents);
    info!(
        "   Successful: {} ({} confirmed, {} unconfirmed)",
        summary.tally.success, summary.tally.confirmed, summary.tally.unconfirmed
    );
    info!("   Failed: {}", summary.tally.error);
    if summary.tally.cancelled > 0 {
        info!("   Cancelled: {}", summary.tally.cancelled);
    }
    info!("   Success rate: {:.1}%", summary.success_rate() * 100.0);
    info!(
        "   Priority fee: {} lamports ({:.6} SOL)",
        summary.fee,
        summary.fee as f64 / LAMPORTS_PER_SOL as f64
    );
    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "volume_sim=debug,info"
    } else {
        "volume_sim=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }

    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path))
    } else {
        // Logging is not up yet
        eprintln!("Config file '{}' not found, using defaults", path);
        Ok(Config::from_env())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_simulate() {
        let args = Args::try_parse_from([
            "volume_sim",
            "simulate",
            "--token",
            "So11111111111111111111111111111111111111112",
            "--batch-size",
            "3",
            "--metrics-dump",
        ])
        .unwrap();
        match args.command {
            Command::Simulate {
                token,
                batch_size,
                metrics_dump,
            } => {
                assert!(token.is_some());
                assert_eq!(batch_size, Some(3));
                assert!(metrics_dump);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let args =
            Args::try_parse_from(["volume_sim", "balance", "--verbose", "--limit", "4"]).unwrap();
        assert!(args.verbose);
        assert_eq!(args.config, "config.toml");
        assert!(matches!(args.command, Command::Balance { limit: 4 }));
    }
}
