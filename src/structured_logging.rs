//! Structured logging for simulation runs

use solana_sdk::pubkey::Pubkey;
use uuid::Uuid;

use crate::types::{OperationOutcome, Tally};

pub const EXPLORER_TX_URL: &str = "https://solscan.io/tx";

/// Logger carrying the run's context id on every event
#[derive(Debug, Clone)]
pub struct RunLogger {
    context_id: String,
}

impl RunLogger {
    pub fn new(context_id: String) -> Self {
        Self { context_id }
    }

    /// Logger with a fresh random context id
    pub fn for_new_run() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn log_run_started(&self, target: &Pubkey, agents: usize, batches: usize) {
        tracing::info!(
            context_id = %self.context_id,
            target = %target,
            agents = %agents,
            batches = %batches,
            "🚀 Starting volume simulation"
        );
    }

    pub fn log_outcome(
        &self,
        agent_index: usize,
        agent: &Pubkey,
        outcome: &OperationOutcome,
        latency_ms: u64,
    ) {
        match outcome {
            OperationOutcome::Succeeded { signature } => tracing::info!(
                context_id = %self.context_id,
                agent_index,
                agent = %agent,
                latency_ms,
                link = %format!("{}/{}", EXPLORER_TX_URL, signature),
                "✅ Swap confirmed"
            ),
            OperationOutcome::SucceededUnconfirmed { signature } => tracing::warn!(
                context_id = %self.context_id,
                agent_index,
                agent = %agent,
                latency_ms,
                signature = %signature,
                "Swap submitted but not confirmed"
            ),
            OperationOutcome::InsufficientBalance { balance } => tracing::info!(
                context_id = %self.context_id,
                agent_index,
                agent = %agent,
                balance,
                "Insufficient balance, skipping agent"
            ),
            OperationOutcome::Cancelled => tracing::debug!(
                context_id = %self.context_id,
                agent_index,
                agent = %agent,
                "Agent cancelled"
            ),
            other => tracing::warn!(
                context_id = %self.context_id,
                agent_index,
                agent = %agent,
                latency_ms,
                outcome = %other,
                "❌ Swap failed"
            ),
        }
    }

    pub fn log_batch(
        &self,
        batch_index: usize,
        total_batches: usize,
        batch: &Tally,
        cumulative: &Tally,
    ) {
        tracing::info!(
            context_id = %self.context_id,
            batch = batch_index + 1,
            total_batches,
            batch_success = batch.success,
            batch_errors = batch.error,
            "📊 Progress: {}",
            cumulative
        );
    }

    pub fn log_batch_failure(&self, batch_index: usize, agents: usize, error: &str) {
        tracing::error!(
            context_id = %self.context_id,
            batch = batch_index + 1,
            agents,
            error = %error,
            "Batch failed unexpectedly, counting all agents as errors"
        );
    }

    pub fn log_run_completed(&self, tally: &Tally, total_agents: usize, success_rate: f64) {
        tracing::info!(
            context_id = %self.context_id,
            total_agents,
            success_rate = %format!("{:.1}%", success_rate * 100.0),
            "🎉 Volume simulation completed: {}",
            tally
        );
    }
}
