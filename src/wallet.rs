//! Agent wallet store
//!
//! Keeps the agent keypairs in a JSON file of
//! `[{"secretKey": [64 bytes], "pubkey": "<base58>"}]` entries.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::signature::{Keypair, Signer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use zeroize::Zeroize;

use crate::types::{Agent, AgentPool, LAMPORTS_PER_SOL};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredWallet {
    #[serde(rename = "secretKey")]
    secret_key: Vec<u8>,
    pubkey: String,
}

impl Drop for StoredWallet {
    fn drop(&mut self) {
        self.secret_key.zeroize();
    }
}

impl StoredWallet {
    fn from_agent(agent: &Agent) -> Self {
        Self {
            secret_key: agent.keypair().to_bytes().to_vec(),
            pubkey: agent.pubkey().to_string(),
        }
    }

    fn to_agent(&self, position: usize) -> Result<Agent> {
        if self.secret_key.len() != 64 {
            anyhow::bail!(
                "Wallet #{}: invalid keypair length: expected 64 bytes, got {}",
                position + 1,
                self.secret_key.len()
            );
        }
        if self.secret_key.iter().all(|&b| b == 0) {
            anyhow::bail!("Wallet #{}: all-zero key rejected", position + 1);
        }
        let keypair = Keypair::try_from(self.secret_key.as_slice())
            .with_context(|| format!("Wallet #{}: invalid keypair bytes", position + 1))?;

        if keypair.pubkey().to_string() != self.pubkey {
            anyhow::bail!(
                "Wallet #{}: stored pubkey {} does not match secret key ({})",
                position + 1,
                self.pubkey,
                keypair.pubkey()
            );
        }
        Ok(Agent::new(keypair))
    }
}

/// File-backed agent store
#[derive(Debug, Clone)]
pub struct AgentStore {
    path: PathBuf,
}

impl AgentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every stored agent. A missing file is created empty.
    pub fn load(&self) -> Result<AgentPool> {
        if !self.path.exists() {
            warn!(path = %self.path.display(), "Wallet file not found, creating an empty one");
            self.write(&[])?;
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read wallet file: {}", self.path.display()))?;
        let stored: Vec<StoredWallet> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse wallet file: {}", self.path.display()))?;

        stored
            .into_iter()
            .enumerate()
            .map(|(i, w)| w.to_agent(i).map(Arc::new))
            .collect()
    }

    /// Replace the stored agents
    pub fn save(&self, agents: &[Arc<Agent>]) -> Result<()> {
        let stored: Vec<StoredWallet> = agents
            .iter()
            .map(|a| StoredWallet::from_agent(a))
            .collect();
        self.write(&stored)
    }

    /// Generate `count` fresh agents, replacing whatever was stored
    pub fn generate(&self, count: usize) -> Result<AgentPool> {
        let agents: AgentPool = (0..count).map(|_| Arc::new(Agent::new(Keypair::new()))).collect();
        self.save(&agents)?;
        info!(count, path = %self.path.display(), "🔑 Generated agent wallets");
        Ok(agents)
    }

    fn write(&self, stored: &[StoredWallet]) -> Result<()> {
        let json = serde_json::to_string_pretty(stored)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write wallet file: {}", self.path.display()))
    }
}

/// SOL each agent needs for fees plus one swap
pub const FUNDING_PER_AGENT_SOL: f64 = 0.025;

/// Balance above which an agent counts as funded (0.001 SOL)
pub const FUNDED_THRESHOLD_LAMPORTS: u64 = 1_000_000;

/// Fewer funded agents than this gets an advisory before simulating
pub const MIN_FUNDED_AGENTS: usize = 5;

pub fn funding_estimate_sol(agents: usize) -> f64 {
    FUNDING_PER_AGENT_SOL * agents as f64
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceSummary {
    pub checked: usize,
    pub funded: usize,
    pub total_lamports: u64,
}

impl BalanceSummary {
    pub fn from_balances(balances: &[u64]) -> Self {
        Self {
            checked: balances.len(),
            funded: balances
                .iter()
                .filter(|&&b| b > FUNDED_THRESHOLD_LAMPORTS)
                .count(),
            total_lamports: balances.iter().sum(),
        }
    }

    pub fn total_sol(&self) -> f64 {
        self.total_lamports as f64 / LAMPORTS_PER_SOL as f64
    }

    pub fn average_sol(&self) -> f64 {
        if self.checked == 0 {
            return 0.0;
        }
        self.total_sol() / self.checked as f64
    }

    pub fn needs_funding(&self) -> bool {
        self.funded < MIN_FUNDED_AGENTS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_balance_summary() {
        let summary = BalanceSummary::from_balances(&[
            0,
            FUNDED_THRESHOLD_LAMPORTS,
            LAMPORTS_PER_SOL / 10,
            LAMPORTS_PER_SOL / 10,
        ]);
        assert_eq!(summary.checked, 4);
        assert_eq!(summary.funded, 2);
        assert!((summary.total_sol() - 0.201).abs() < 1e-9);
        assert!((summary.average_sol() - 0.05025).abs() < 1e-9);
        assert!(summary.needs_funding());

        assert_eq!(BalanceSummary::from_balances(&[]).average_sol(), 0.0);
        assert!((funding_estimate_sol(50) - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_missing_file_is_created_empty() {
        let dir = TempDir::new().unwrap();
        let store = AgentStore::new(dir.path().join("wallets.json"));

        assert!(store.load().unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(store.path()).unwrap().trim(), "[]");
    }

    #[test]
    fn test_generate_then_load() {
        let dir = TempDir::new().unwrap();
        let store = AgentStore::new(dir.path().join("wallets.json"));

        let generated = store.generate(3).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 3);
        for (a, b) in generated.iter().zip(&loaded) {
            assert_eq!(a.pubkey(), b.pubkey());
        }

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw[0]["secretKey"].as_array().unwrap().len(), 64);
        assert_eq!(raw[0]["pubkey"], generated[0].pubkey().to_string());
    }

    #[test]
    fn test_generate_replaces_previous_set() {
        let dir = TempDir::new().unwrap();
        let store = AgentStore::new(dir.path().join("wallets.json"));

        store.generate(5).unwrap();
        store.generate(2).unwrap();
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn test_rejects_bad_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wallets.json");
        let store = AgentStore::new(&path);

        std::fs::write(&path, r#"[{"secretKey": [1, 2, 3], "pubkey": "x"}]"#).unwrap();
        assert!(store.load().is_err());

        let zeros = serde_json::json!([{ "secretKey": vec![0u8; 64], "pubkey": "x" }]);
        std::fs::write(&path, zeros.to_string()).unwrap();
        assert!(store.load().is_err());

        let keypair = Keypair::new();
        let mismatched = serde_json::json!([{
            "secretKey": keypair.to_bytes().to_vec(),
            "pubkey": Keypair::new().pubkey().to_string(),
        }]);
        std::fs::write(&path, mismatched.to_string()).unwrap();
        assert!(store.load().is_err());
    }
}
