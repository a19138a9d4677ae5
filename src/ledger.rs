//! Ledger network access
//!
//! [`Ledger`] is the narrow view of the Solana RPC the orchestrator needs.
//! [`RpcLedger`] implements it over the nonblocking `RpcClient`, throttled by
//! a `governor` quota so a large agent pool cannot flood the RPC provider.
//! Read-only calls are retried with `tokio-retry`; submission is not, the RPC
//! node's own `max_retries` covers rebroadcast.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use solana_transaction_status::TransactionConfirmationStatus;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::debug;

use crate::errors::LedgerError;

/// How far a submitted transaction has progressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfirmationLevel {
    Processed,
    Confirmed,
    Finalized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationStatus {
    pub level: ConfirmationLevel,
    /// On-chain execution error, if the transaction failed
    pub error: Option<String>,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        self.level >= ConfirmationLevel::Confirmed
    }
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn get_balance(&self, address: &Pubkey) -> Result<u64, LedgerError>;

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, LedgerError>;

    /// Recent prioritization fees (micro-lamports per compute unit) paid by
    /// transactions touching `accounts`
    async fn recent_fee_samples(&self, accounts: &[Pubkey]) -> Result<Vec<u64>, LedgerError>;

    async fn submit(&self, tx: &VersionedTransaction) -> Result<Signature, LedgerError>;

    /// `None` while the network has not seen the signature
    async fn get_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<OperationStatus>, LedgerError>;
}

/// Fail unless `address` holds an account, e.g. a target token mint
pub async fn require_account(ledger: &dyn Ledger, address: &Pubkey) -> Result<(), LedgerError> {
    if ledger.account_exists(address).await? {
        Ok(())
    } else {
        Err(LedgerError::AccountNotFound(*address))
    }
}

#[derive(Debug, Clone)]
pub struct RpcLedgerConfig {
    pub url: String,
    pub timeout: Duration,
    pub rate_limit_rps: u32,
    /// Read retries on transient RPC failures
    pub read_retries: usize,
    /// Rebroadcast attempts delegated to the RPC node
    pub send_max_retries: usize,
}

impl Default for RpcLedgerConfig {
    fn default() -> Self {
        Self {
            url: "https://api.mainnet-beta.solana.com".to_string(),
            timeout: Duration::from_secs(30),
            rate_limit_rps: 20,
            read_retries: 3,
            send_max_retries: 3,
        }
    }
}

pub struct RpcLedger {
    client: RpcClient,
    limiter: DefaultDirectRateLimiter,
    config: RpcLedgerConfig,
}

impl RpcLedger {
    pub fn new(config: RpcLedgerConfig) -> Self {
        let client = RpcClient::new_with_timeout_and_commitment(
            config.url.clone(),
            config.timeout,
            CommitmentConfig::confirmed(),
        );
        let rps = NonZeroU32::new(config.rate_limit_rps).unwrap_or(NonZeroU32::MIN);
        Self {
            client,
            limiter: RateLimiter::direct(Quota::per_second(rps)),
            config,
        }
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    fn read_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(2)
            .factor(100)
            .max_delay(Duration::from_secs(2))
            .map(jitter)
            .take(self.config.read_retries)
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn get_balance(&self, address: &Pubkey) -> Result<u64, LedgerError> {
        Retry::spawn(self.read_strategy(), || async move {
            self.limiter.until_ready().await;
            self.client.get_balance(address).await.map_err(LedgerError::from)
        })
        .await
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, LedgerError> {
        Retry::spawn(self.read_strategy(), || async move {
            self.limiter.until_ready().await;
            self.client
                .get_account_with_commitment(address, CommitmentConfig::confirmed())
                .await
                .map(|response| response.value.is_some())
                .map_err(LedgerError::from)
        })
        .await
    }

    async fn recent_fee_samples(&self, accounts: &[Pubkey]) -> Result<Vec<u64>, LedgerError> {
        self.limiter.until_ready().await;
        let fees = self.client.get_recent_prioritization_fees(accounts).await?;
        Ok(fees.into_iter().map(|f| f.prioritization_fee).collect())
    }

    async fn submit(&self, tx: &VersionedTransaction) -> Result<Signature, LedgerError> {
        self.limiter.until_ready().await;
        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(CommitmentLevel::Confirmed),
            max_retries: Some(self.config.send_max_retries),
            ..RpcSendTransactionConfig::default()
        };
        self.client
            .send_transaction_with_config(tx, config)
            .await
            .map_err(|e| LedgerError::Rejected(e.to_string()))
    }

    async fn get_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<OperationStatus>, LedgerError> {
        self.limiter.until_ready().await;
        let response = self.client.get_signature_statuses(&[*signature]).await?;
        let Some(status) = response.value.into_iter().next().flatten() else {
            return Ok(None);
        };

        let level = match status.confirmation_status {
            Some(TransactionConfirmationStatus::Finalized) => ConfirmationLevel::Finalized,
            Some(TransactionConfirmationStatus::Confirmed) => ConfirmationLevel::Confirmed,
            Some(TransactionConfirmationStatus::Processed) => ConfirmationLevel::Processed,
            // Older nodes omit the field; no confirmation count means rooted
            None if status.confirmations.is_none() => ConfirmationLevel::Finalized,
            None => ConfirmationLevel::Processed,
        };
        debug!(signature = %signature, level = ?level, "Signature status");

        Ok(Some(OperationStatus {
            level,
            error: status.err.map(|e| e.to_string()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockLedger;

    #[tokio::test]
    async fn test_require_account() {
        let mint = Pubkey::new_unique();
        let ledger = MockLedger::new().with_account(mint);

        assert!(require_account(&ledger, &mint).await.is_ok());
        let missing = Pubkey::new_unique();
        assert!(matches!(
            require_account(&ledger, &missing).await,
            Err(LedgerError::AccountNotFound(address)) if address == missing
        ));
    }

    #[test]
    fn test_terminal_levels() {
        let status = |level| OperationStatus { level, error: None };
        assert!(!status(ConfirmationLevel::Processed).is_terminal());
        assert!(status(ConfirmationLevel::Confirmed).is_terminal());
        assert!(status(ConfirmationLevel::Finalized).is_terminal());
    }

    #[test]
    fn test_zero_rps_still_builds() {
        let ledger = RpcLedger::new(RpcLedgerConfig {
            url: "http://127.0.0.1:8899".into(),
            rate_limit_rps: 0,
            ..RpcLedgerConfig::default()
        });
        assert_eq!(ledger.url(), "http://127.0.0.1:8899");
    }
}
