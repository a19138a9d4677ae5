//! Error taxonomy for the orchestrator
//!
//! Transport-level failures (`SwapApiError`, `LedgerError`) are classified so
//! retry loops can decide what to do with them. Per-agent failures never
//! escape an executor; they are folded into an `OperationOutcome`. Only
//! `OrchestratorError` aborts a run, and only before the first batch.

use thiserror::Error;

/// Failures talking to the quoting/ordering service
#[derive(Debug, Clone, Error)]
pub enum SwapApiError {
    /// HTTP 429
    #[error("Rate limited by swap service")]
    RateLimited,

    /// The service answered but has no route for the pair/amount
    #[error("No route: {0}")]
    NoRoute(String),

    /// Any other non-2xx status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl SwapApiError {
    /// Whether the same request may succeed if repeated
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SwapApiError::NoRoute(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SwapApiError::RateLimited)
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, body: String) -> Self {
        if status == 429 {
            SwapApiError::RateLimited
        } else {
            SwapApiError::Http { status, body }
        }
    }
}

impl From<reqwest::Error> for SwapApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SwapApiError::Decode(err.to_string())
        } else if err.is_timeout() {
            SwapApiError::Timeout { timeout_ms: 0 }
        } else if let Some(status) = err.status() {
            SwapApiError::from_status(status.as_u16(), err.to_string())
        } else {
            SwapApiError::Transport(err.to_string())
        }
    }
}

/// Terminal failure of a remote service call after the retry policy ran
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceFailure {
    #[error("no liquidity: {0}")]
    NoLiquidity(String),

    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("remote error after {attempts} attempts: {reason}")]
    Remote { attempts: u32, reason: String },

    #[error("swap service returned no transaction payload")]
    MissingPayload,

    /// The run was cancelled while the call was waiting
    #[error("cancelled")]
    Cancelled,
}

/// Ledger RPC failures
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Invalid transaction payload: {0}")]
    InvalidPayload(String),

    #[error("Account {0} does not exist on-chain")]
    AccountNotFound(solana_sdk::pubkey::Pubkey),
}

impl From<solana_client::client_error::ClientError> for LedgerError {
    fn from(err: solana_client::client_error::ClientError) -> Self {
        LedgerError::Rpc(err.to_string())
    }
}

/// Why a submitted operation could not be confirmed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfirmError {
    #[error("not confirmed after {attempts} polls")]
    Timeout { attempts: u32 },

    #[error("transaction failed on-chain: {0}")]
    OnChain(String),

    #[error("confirmation cancelled")]
    Cancelled,
}

/// Errors that abort a run before any batch starts
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("No agents available for this run")]
    NoAgents,

    #[error("Invalid run configuration: {0}")]
    InvalidConfig(String),
}
