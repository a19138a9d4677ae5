//! Configuration module for the volume simulator
//!
//! This module handles all configuration loading from TOML files,
//! `.env` files and environment variables, and maps the result onto the
//! settings types used by the orchestrator.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;

use crate::confirmation::ConfirmationConfig;
use crate::coordinator::RunSettings;
use crate::fee_estimator::FeeEstimatorConfig;
use crate::ledger::RpcLedgerConfig;
use crate::rate_limiter::RateLimiterConfig;
use crate::swap_api::{RetryPolicy, DEFAULT_JUPITER_URL};
use crate::types::SpendPolicy;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Ledger RPC endpoint
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Swap service endpoint and retry policy
    #[serde(default)]
    pub swap_api: SwapApiConfig,

    /// Adaptive limiter tuning
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub confirmation: ConfirmationSettings,

    /// Batching, pacing and spend policy
    #[serde(default)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub fees: FeeConfig,

    #[serde(default)]
    pub wallet: WalletConfig,

    /// Monitoring and metrics
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,

    /// Rate limit (requests per second)
    #[serde(default = "default_rate_limit")]
    pub rate_limit_rps: u32,

    /// Retries for balance and status reads
    #[serde(default = "default_read_retries")]
    pub read_retries: usize,

    /// Rebroadcast attempts delegated to the RPC node on submission
    #[serde(default = "default_send_max_retries")]
    pub send_max_retries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapApiConfig {
    #[serde(default = "default_jupiter_url")]
    pub base_url: String,

    /// Optional key sent as `x-api-key`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Hard bound on one quote or swap call, in milliseconds
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_base_interval_ms")]
    pub base_interval_ms: u64,

    #[serde(default = "default_interval_cap_ms")]
    pub interval_cap_ms: u64,

    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationSettings {
    #[serde(default = "default_confirm_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_confirm_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_confirm_backoff")]
    pub backoff_factor: f64,

    #[serde(default = "default_confirm_delay_cap_ms")]
    pub delay_cap_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Target token mint, base58
    #[serde(default)]
    pub target_mint: Option<String>,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,

    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u16,

    /// Agents below this balance are skipped (lamports)
    #[serde(default = "default_min_operational_lamports")]
    pub min_operational_lamports: u64,

    /// Kept back for transaction fees (lamports)
    #[serde(default = "default_fee_reserve_lamports")]
    pub fee_reserve_lamports: u64,

    /// Share of the spendable balance swapped per operation
    #[serde(default = "default_spend_fraction")]
    pub spend_fraction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    #[serde(default = "default_fee_percentile")]
    pub percentile: f64,

    #[serde(default = "default_compute_units")]
    pub compute_units: u64,

    #[serde(default = "default_min_fee")]
    pub min_fee_lamports: u64,

    #[serde(default = "default_fallback_fee")]
    pub fallback_fee_lamports: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// JSON file holding the agent keypairs
    #[serde(default = "default_wallets_path")]
    pub path: String,

    /// Wallets created by `create-wallets` when no count is given
    #[serde(default = "default_wallet_count")]
    pub default_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Enable JSON log output
    #[serde(default)]
    pub json_logs: bool,
}

// Default value functions
fn default_rpc_url() -> String { "https://api.mainnet-beta.solana.com".to_string() }
fn default_rpc_timeout() -> u64 { 30 }
fn default_rate_limit() -> u32 { 20 }
fn default_read_retries() -> usize { 3 }
fn default_send_max_retries() -> usize { 3 }
fn default_jupiter_url() -> String { DEFAULT_JUPITER_URL.to_string() }
fn default_call_timeout_ms() -> u64 { 10_000 }
fn default_max_attempts() -> u32 { 5 }
fn default_retry_base_delay_ms() -> u64 { 2_000 }
fn default_base_interval_ms() -> u64 { 500 }
fn default_interval_cap_ms() -> u64 { 10_000 }
fn default_base_backoff_ms() -> u64 { 1_000 }
fn default_backoff_cap_ms() -> u64 { 30_000 }
fn default_confirm_attempts() -> u32 { 30 }
fn default_confirm_base_delay_ms() -> u64 { 500 }
fn default_confirm_backoff() -> f64 { 1.5 }
fn default_confirm_delay_cap_ms() -> u64 { 5_000 }
fn default_batch_size() -> usize { 5 }
fn default_inter_batch_delay_ms() -> u64 { 3_000 }
fn default_slippage_bps() -> u16 { 300 }
fn default_min_operational_lamports() -> u64 { 10_000_000 }
fn default_fee_reserve_lamports() -> u64 { 5_000_000 }
fn default_spend_fraction() -> f64 { 0.7 }
fn default_fee_percentile() -> f64 { 75.0 }
fn default_compute_units() -> u64 { 300_000 }
fn default_min_fee() -> u64 { 10_000 }
fn default_fallback_fee() -> u64 { 100_000 }
fn default_wallets_path() -> String { "wallets.json".to_string() }
fn default_wallet_count() -> usize { 50 }
fn default_true() -> bool { true }

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            timeout_secs: default_rpc_timeout(),
            rate_limit_rps: default_rate_limit(),
            read_retries: default_read_retries(),
            send_max_retries: default_send_max_retries(),
        }
    }
}

impl Default for SwapApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_jupiter_url(),
            api_key: None,
            call_timeout_ms: default_call_timeout_ms(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: default_base_interval_ms(),
            interval_cap_ms: default_interval_cap_ms(),
            base_backoff_ms: default_base_backoff_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

impl Default for ConfirmationSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_confirm_attempts(),
            base_delay_ms: default_confirm_base_delay_ms(),
            backoff_factor: default_confirm_backoff(),
            delay_cap_ms: default_confirm_delay_cap_ms(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            target_mint: None,
            batch_size: default_batch_size(),
            inter_batch_delay_ms: default_inter_batch_delay_ms(),
            slippage_bps: default_slippage_bps(),
            min_operational_lamports: default_min_operational_lamports(),
            fee_reserve_lamports: default_fee_reserve_lamports(),
            spend_fraction: default_spend_fraction(),
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            percentile: default_fee_percentile(),
            compute_units: default_compute_units(),
            min_fee_lamports: default_min_fee(),
            fallback_fee_lamports: default_fallback_fee(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            path: default_wallets_path(),
            default_count: default_wallet_count(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: default_true(),
            json_logs: false,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;
        Ok(config)
    }

    /// Load configuration with `.env` and environment variable overrides
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Defaults plus `.env` and environment overrides, for runs without a file
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    /// `VOLUME_SIM_RPC_URL` wins over `HELIUS_RPC`
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("VOLUME_SIM_RPC_URL").or_else(|| lookup("HELIUS_RPC")) {
            self.rpc.url = url;
        }
        if let Some(url) = lookup("JUPITER_API_URL") {
            self.swap_api.base_url = url;
        }
        if let Some(key) = lookup("JUPITER_API_KEY") {
            self.swap_api.api_key = Some(key);
        }
        if let Some(mint) = lookup("VOLUME_SIM_TARGET_MINT") {
            self.simulation.target_mint = Some(mint);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rpc.url.trim().is_empty() {
            anyhow::bail!("rpc.url must not be empty");
        }
        if self.swap_api.base_url.trim().is_empty() {
            anyhow::bail!("swap_api.base_url must not be empty");
        }
        if self.swap_api.max_attempts == 0 {
            anyhow::bail!("swap_api.max_attempts must be at least 1");
        }
        if self.rpc.rate_limit_rps == 0 {
            anyhow::bail!("rpc.rate_limit_rps must be at least 1");
        }
        if self.simulation.batch_size == 0 {
            anyhow::bail!("simulation.batch_size must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.simulation.spend_fraction) {
            anyhow::bail!(
                "simulation.spend_fraction must be within [0, 1], got {}",
                self.simulation.spend_fraction
            );
        }
        if self.rate_limit.base_interval_ms > self.rate_limit.interval_cap_ms {
            anyhow::bail!("rate_limit.base_interval_ms exceeds rate_limit.interval_cap_ms");
        }
        if self.confirmation.max_attempts == 0 {
            anyhow::bail!("confirmation.max_attempts must be at least 1");
        }
        if !(0.0..=100.0).contains(&self.fees.percentile) {
            anyhow::bail!("fees.percentile must be within [0, 100]");
        }
        if let Some(mint) = &self.simulation.target_mint {
            parse_mint(mint)?;
        }
        Ok(())
    }

    /// Configured target mint, if any
    pub fn target_mint(&self) -> anyhow::Result<Option<Pubkey>> {
        self.simulation.target_mint.as_deref().map(parse_mint).transpose()
    }

    pub fn ledger_config(&self) -> RpcLedgerConfig {
        RpcLedgerConfig {
            url: self.rpc.url.clone(),
            timeout: Duration::from_secs(self.rpc.timeout_secs),
            rate_limit_rps: self.rpc.rate_limit_rps,
            read_retries: self.rpc.read_retries,
            send_max_retries: self.rpc.send_max_retries,
        }
    }

    pub fn run_settings(&self) -> RunSettings {
        let sim = &self.simulation;
        RunSettings {
            batch_size: sim.batch_size,
            inter_batch_delay: Duration::from_millis(sim.inter_batch_delay_ms),
            slippage_bps: sim.slippage_bps,
            policy: SpendPolicy {
                min_operational_lamports: sim.min_operational_lamports,
                fee_reserve_lamports: sim.fee_reserve_lamports,
                spend_fraction: sim.spend_fraction,
            },
            rate_limiter: RateLimiterConfig {
                base_interval: Duration::from_millis(self.rate_limit.base_interval_ms),
                interval_cap: Duration::from_millis(self.rate_limit.interval_cap_ms),
                base_backoff: Duration::from_millis(self.rate_limit.base_backoff_ms),
                backoff_cap: Duration::from_millis(self.rate_limit.backoff_cap_ms),
            },
            retry: RetryPolicy {
                max_attempts: self.swap_api.max_attempts,
                base_delay: Duration::from_millis(self.swap_api.retry_base_delay_ms),
                call_timeout: Duration::from_millis(self.swap_api.call_timeout_ms),
            },
            confirmation: ConfirmationConfig {
                max_attempts: self.confirmation.max_attempts,
                base_delay: Duration::from_millis(self.confirmation.base_delay_ms),
                backoff_factor: self.confirmation.backoff_factor,
                delay_cap: Duration::from_millis(self.confirmation.delay_cap_ms),
            },
            fees: FeeEstimatorConfig {
                percentile: self.fees.percentile,
                compute_units: self.fees.compute_units,
                min_fee_lamports: self.fees.min_fee_lamports,
                fallback_fee_lamports: self.fees.fallback_fee_lamports,
            },
        }
    }
}

/// Parse a base58 mint address
pub fn parse_mint(mint: &str) -> anyhow::Result<Pubkey> {
    Pubkey::from_str(mint.trim()).with_context(|| format!("Invalid token mint address: {}", mint))
}
