//! Common types used throughout the orchestrator

use serde::{Deserialize, Serialize};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::sync::Arc;
use std::time::Duration;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// An agent wallet on whose behalf one swap is attempted per run.
///
/// The core only ever reads agents; creating and persisting them is the
/// wallet store's job.
#[derive(Debug)]
pub struct Agent {
    pubkey: Pubkey,
    keypair: Keypair,
}

impl Agent {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            pubkey: keypair.pubkey(),
            keypair,
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.pubkey
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

/// Balance policy applied before an agent spends anything.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpendPolicy {
    /// Agents holding less than this are skipped outright
    pub min_operational_lamports: u64,
    /// Kept back for transaction fees
    pub fee_reserve_lamports: u64,
    /// Share of the balance above the reserve that is swapped
    pub spend_fraction: f64,
}

impl Default for SpendPolicy {
    fn default() -> Self {
        Self {
            min_operational_lamports: 10_000_000, // 0.01 SOL
            fee_reserve_lamports: 5_000_000,      // 0.005 SOL
            spend_fraction: 0.7,
        }
    }
}

impl SpendPolicy {
    /// `floor((balance - fee_reserve) * spend_fraction)`, or `None` when the
    /// agent is below the operational minimum or nothing would be spent.
    pub fn spend_amount(&self, balance: u64) -> Option<u64> {
        if balance < self.min_operational_lamports || balance <= self.fee_reserve_lamports {
            return None;
        }
        let available = balance - self.fee_reserve_lamports;
        let fraction = self.spend_fraction.clamp(0.0, 1.0);
        let amount = ((available as f64 * fraction).floor() as u64).min(available);
        (amount > 0).then_some(amount)
    }
}

/// Immutable per-run configuration shared by every executor of a run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub input_asset: Pubkey,
    pub target_asset: Pubkey,
    pub batch_size: usize,
    /// Priority fee frozen at run start, in lamports
    pub priority_fee: u64,
    pub slippage_bps: u16,
    pub policy: SpendPolicy,
    pub inter_batch_delay: Duration,
}

impl RunContext {
    pub fn new(target_asset: Pubkey) -> Self {
        Self {
            input_asset: spl_token::native_mint::id(),
            target_asset,
            batch_size: 5,
            priority_fee: 0,
            slippage_bps: 300,
            policy: SpendPolicy::default(),
            inter_batch_delay: Duration::from_millis(3_000),
        }
    }

    pub fn with_priority_fee(mut self, fee: u64) -> Self {
        self.priority_fee = fee;
        self
    }
}

/// Terminal result of one agent's operation within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// Submitted and confirmed on-chain
    Succeeded { signature: String },
    /// Submitted, but landing could not be verified in time
    SucceededUnconfirmed { signature: String },
    InsufficientBalance { balance: u64 },
    NoLiquidity,
    RateLimited,
    RemoteError { reason: String },
    /// Landed with an on-chain error
    ConfirmationFailed { signature: String, reason: String },
    Cancelled,
}

impl OperationOutcome {
    pub fn remote_error(reason: impl Into<String>) -> Self {
        Self::RemoteError {
            reason: reason.into(),
        }
    }

    pub fn signature(&self) -> Option<&str> {
        match self {
            Self::Succeeded { signature }
            | Self::SucceededUnconfirmed { signature }
            | Self::ConfirmationFailed { signature, .. } => Some(signature),
            _ => None,
        }
    }

    /// Short label for logs and metric names
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "succeeded",
            Self::SucceededUnconfirmed { .. } => "succeeded_unconfirmed",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::NoLiquidity => "no_liquidity",
            Self::RateLimited => "rate_limited",
            Self::RemoteError { .. } => "remote_error",
            Self::ConfirmationFailed { .. } => "confirmation_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OperationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded { signature } => write!(f, "confirmed {}", signature),
            Self::SucceededUnconfirmed { signature } => write!(f, "unconfirmed {}", signature),
            Self::InsufficientBalance { balance } => {
                write!(f, "insufficient balance ({} lamports)", balance)
            }
            Self::NoLiquidity => write!(f, "no liquidity"),
            Self::RateLimited => write!(f, "rate limited"),
            Self::RemoteError { reason } => write!(f, "remote error: {}", reason),
            Self::ConfirmationFailed { signature, reason } => {
                write!(f, "failed on-chain {}: {}", signature, reason)
            }
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Additive outcome counters. A batch tally and a run tally are the same
/// type; a run tally is the sum of its batch tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub success: u64,
    pub confirmed: u64,
    pub unconfirmed: u64,
    pub error: u64,
    pub rate_limited: u64,
    pub cancelled: u64,
}

pub type BatchTally = Tally;
pub type RunTally = Tally;

impl Tally {
    pub fn record(&mut self, outcome: &OperationOutcome) {
        match outcome {
            OperationOutcome::Succeeded { .. } => {
                self.success += 1;
                self.confirmed += 1;
            }
            OperationOutcome::SucceededUnconfirmed { .. } => {
                self.success += 1;
                self.unconfirmed += 1;
            }
            OperationOutcome::RateLimited => {
                self.error += 1;
                self.rate_limited += 1;
            }
            OperationOutcome::Cancelled => self.cancelled += 1,
            OperationOutcome::InsufficientBalance { .. }
            | OperationOutcome::NoLiquidity
            | OperationOutcome::RemoteError { .. }
            | OperationOutcome::ConfirmationFailed { .. } => self.error += 1,
        }
    }

    /// Number of agents folded into this tally
    pub fn total(&self) -> u64 {
        self.success + self.error + self.cancelled
    }
}

impl<'a> FromIterator<&'a OperationOutcome> for Tally {
    fn from_iter<I: IntoIterator<Item = &'a OperationOutcome>>(iter: I) -> Self {
        let mut tally = Tally::default();
        for outcome in iter {
            tally.record(outcome);
        }
        tally
    }
}

impl Add for Tally {
    type Output = Tally;

    fn add(mut self, rhs: Tally) -> Tally {
        self += rhs;
        self
    }
}

impl AddAssign for Tally {
    fn add_assign(&mut self, rhs: Tally) {
        self.success += rhs.success;
        self.confirmed += rhs.confirmed;
        self.unconfirmed += rhs.unconfirmed;
        self.error += rhs.error;
        self.rate_limited += rhs.rate_limited;
        self.cancelled += rhs.cancelled;
    }
}

impl Sum for Tally {
    fn sum<I: Iterator<Item = Tally>>(iter: I) -> Tally {
        iter.fold(Tally::default(), Add::add)
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "✅ Success: {} | 🔍 Confirmed: {} | ⏳ Unconfirmed: {} | ❌ Errors: {} \
             (rate limited: {})",
            self.success,
            self.confirmed,
            self.unconfirmed,
            self.error,
            self.rate_limited
        )?;
        if self.cancelled > 0 {
            write!(f, " | 🛑 Cancelled: {}", self.cancelled)?;
        }
        Ok(())
    }
}

/// Agents shared across the tasks of one run
pub type AgentPool = Vec<Arc<Agent>>;
