//! Test Utilities Module
//!
//! Scripted stand-ins for the swap service and the ledger so executors and
//! whole runs can be driven deterministically without network access.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use parking_lot::Mutex;
use solana_sdk::{
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    transaction::VersionedTransaction,
};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{LedgerError, SwapApiError};
use crate::ledger::{ConfirmationLevel, Ledger, OperationStatus};
use crate::swap_api::{Quote, QuoteRequest, SwapApi, SwapRequest, SwapResponse};
use crate::types::{Agent, LAMPORTS_PER_SOL};

/// Build an unsigned swap payload whose only required signer is `payer`,
/// encoded the way the swap service returns it.
pub fn unsigned_payload(payer: &Pubkey) -> String {
    let message = Message::new(&[], Some(payer));
    let tx = VersionedTransaction {
        signatures: vec![Signature::default()],
        message: VersionedMessage::Legacy(message),
    };
    BASE64_STANDARD.encode(bincode::serialize(&tx).expect("serializable transaction"))
}

pub fn agents(count: usize) -> Vec<Arc<Agent>> {
    (0..count).map(|_| Arc::new(Agent::new(Keypair::new()))).collect()
}

/// Scripted swap service
#[derive(Default)]
pub struct MockSwapApi {
    quote_calls: AtomicUsize,
    swap_calls: AtomicUsize,
    /// Remaining calls (quote or swap) answered with HTTP 429
    rate_limited_calls: AtomicU32,
    quote_error: Option<SwapApiError>,
    no_route: bool,
    omit_payload: bool,
    quote_latency: Option<Duration>,
}

impl MockSwapApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate_limited_calls(self, calls: u32) -> Self {
        self.rate_limited_calls.store(calls, Ordering::SeqCst);
        self
    }

    pub fn with_quote_error(mut self, err: SwapApiError) -> Self {
        self.quote_error = Some(err);
        self
    }

    pub fn with_no_route(mut self) -> Self {
        self.no_route = true;
        self
    }

    pub fn without_payload(mut self) -> Self {
        self.omit_payload = true;
        self
    }

    pub fn with_quote_latency(mut self, latency: Duration) -> Self {
        self.quote_latency = Some(latency);
        self
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn swap_calls(&self) -> usize {
        self.swap_calls.load(Ordering::SeqCst)
    }

    fn take_rate_limit(&self) -> bool {
        self.rate_limited_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl SwapApi for MockSwapApi {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, SwapApiError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.quote_latency {
            tokio::time::sleep(latency).await;
        }
        if self.take_rate_limit() {
            return Err(SwapApiError::RateLimited);
        }
        if self.no_route {
            return Err(SwapApiError::NoRoute("COULD_NOT_FIND_ANY_ROUTE".into()));
        }
        if let Some(err) = &self.quote_error {
            return Err(err.clone());
        }

        let mut extra = serde_json::Map::new();
        extra.insert("routePlan".into(), serde_json::json!([]));
        Ok(Quote {
            in_amount: request.amount.to_string(),
            out_amount: (request.amount / 2).to_string(),
            extra,
        })
    }

    async fn swap(&self, request: &SwapRequest) -> Result<SwapResponse, SwapApiError> {
        self.swap_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_rate_limit() {
            return Err(SwapApiError::RateLimited);
        }
        if self.omit_payload {
            return Ok(SwapResponse::default());
        }

        let payer = Pubkey::from_str(&request.user_public_key)
            .map_err(|e| SwapApiError::Decode(e.to_string()))?;
        Ok(SwapResponse {
            swap_transaction: Some(unsigned_payload(&payer)),
        })
    }
}

/// Scripted ledger
pub struct MockLedger {
    default_balance: u64,
    balances: Mutex<HashMap<Pubkey, u64>>,
    balance_calls: AtomicUsize,
    /// Polls per signature before it reports `confirmed`
    confirm_after: u32,
    on_chain_error: Option<String>,
    polls: Mutex<HashMap<Signature, u32>>,
    status_calls: AtomicUsize,
    fee_samples: Option<Vec<u64>>,
    submitted: Mutex<Vec<Signature>>,
    existing_accounts: Mutex<HashSet<Pubkey>>,
    panic_for: Option<Pubkey>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self {
            default_balance: LAMPORTS_PER_SOL,
            balances: Mutex::new(HashMap::new()),
            balance_calls: AtomicUsize::new(0),
            confirm_after: 1,
            on_chain_error: None,
            polls: Mutex::new(HashMap::new()),
            status_calls: AtomicUsize::new(0),
            fee_samples: Some(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            existing_accounts: Mutex::new(HashSet::new()),
            panic_for: None,
        }
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_balance(mut self, lamports: u64) -> Self {
        self.default_balance = lamports;
        self
    }

    pub fn with_balance(self, address: Pubkey, lamports: u64) -> Self {
        self.balances.lock().insert(address, lamports);
        self
    }

    pub fn with_confirm_after(mut self, polls: u32) -> Self {
        self.confirm_after = polls;
        self
    }

    pub fn with_on_chain_error(mut self, err: &str) -> Self {
        self.on_chain_error = Some(err.to_string());
        self
    }

    pub fn with_fee_samples(mut self, samples: Vec<u64>) -> Self {
        self.fee_samples = Some(samples);
        self
    }

    pub fn with_failing_fee_samples(mut self) -> Self {
        self.fee_samples = None;
        self
    }

    pub fn with_account(self, address: Pubkey) -> Self {
        self.existing_accounts.lock().insert(address);
        self
    }

    /// Panic inside `get_balance` for this agent, simulating a bug
    pub fn with_panic_for(mut self, address: Pubkey) -> Self {
        self.panic_for = Some(address);
        self
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<Signature> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn get_balance(&self, address: &Pubkey) -> Result<u64, LedgerError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_for.as_ref() == Some(address) {
            panic!("simulated executor bug for {}", address);
        }
        Ok(self
            .balances
            .lock()
            .get(address)
            .copied()
            .unwrap_or(self.default_balance))
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, LedgerError> {
        Ok(self.existing_accounts.lock().contains(address))
    }

    async fn recent_fee_samples(&self, _accounts: &[Pubkey]) -> Result<Vec<u64>, LedgerError> {
        self.fee_samples
            .clone()
            .ok_or_else(|| LedgerError::Rpc("getRecentPrioritizationFees unavailable".into()))
    }

    async fn submit(&self, tx: &VersionedTransaction) -> Result<Signature, LedgerError> {
        if !tx.verify_with_results().iter().all(|ok| *ok) {
            return Err(LedgerError::Rejected("signature verification failure".into()));
        }
        let signature = tx.signatures[0];
        self.submitted.lock().push(signature);
        Ok(signature)
    }

    async fn get_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<OperationStatus>, LedgerError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let mut polls = self.polls.lock();
        let count = polls.entry(*signature).or_insert(0);
        *count += 1;

        if *count < self.confirm_after {
            return Ok(if *count == 1 {
                None
            } else {
                Some(OperationStatus {
                    level: ConfirmationLevel::Processed,
                    error: None,
                })
            });
        }

        Ok(Some(OperationStatus {
            level: ConfirmationLevel::Confirmed,
            error: self.on_chain_error.clone(),
        }))
    }
}
