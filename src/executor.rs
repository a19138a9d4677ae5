//! Per-agent swap pipeline
//!
//! balance check → spend policy → quote → build → sign → submit → confirm.
//! Every step can end the pipeline with a terminal [`OperationOutcome`]; the
//! pipeline itself is never retried. Everything before submission is
//! read-only or off-chain, and submission happens at most once per agent.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use solana_sdk::transaction::VersionedTransaction;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::confirmation::ConfirmationPoller;
use crate::errors::{ConfirmError, LedgerError, ServiceFailure};
use crate::ledger::Ledger;
use crate::metrics::{metrics, Timer};
use crate::structured_logging::RunLogger;
use crate::swap_api::RemoteServiceClient;
use crate::types::{Agent, OperationOutcome, RunContext};

pub struct OperationExecutor {
    ctx: Arc<RunContext>,
    remote: Arc<RemoteServiceClient>,
    ledger: Arc<dyn Ledger>,
    poller: Arc<ConfirmationPoller>,
    cancel: CancellationToken,
    logger: RunLogger,
}

impl OperationExecutor {
    pub fn new(
        ctx: Arc<RunContext>,
        remote: Arc<RemoteServiceClient>,
        ledger: Arc<dyn Ledger>,
        poller: Arc<ConfirmationPoller>,
        cancel: CancellationToken,
        logger: RunLogger,
    ) -> Self {
        Self {
            ctx,
            remote,
            ledger,
            poller,
            cancel,
            logger,
        }
    }

    /// Run the pipeline for one agent. Never fails; failures are outcomes.
    pub async fn execute(&self, agent_index: usize, agent: &Agent) -> OperationOutcome {
        let timer = Timer::new();
        let outcome = self.run_pipeline(agent).await;

        timer.observe_duration(&metrics().operation_latency);
        metrics().record_outcome(outcome.label());
        self.logger
            .log_outcome(agent_index, &agent.pubkey(), &outcome, timer.elapsed_ms());
        outcome
    }

    async fn run_pipeline(&self, agent: &Agent) -> OperationOutcome {
        if self.cancel.is_cancelled() {
            return OperationOutcome::Cancelled;
        }

        let balance = match self.ledger.get_balance(&agent.pubkey()).await {
            Ok(balance) => balance,
            Err(e) => return OperationOutcome::remote_error(format!("balance fetch failed: {}", e)),
        };
        let Some(amount) = self.ctx.policy.spend_amount(balance) else {
            return OperationOutcome::InsufficientBalance { balance };
        };

        if self.cancel.is_cancelled() {
            return OperationOutcome::Cancelled;
        }

        let quote = match self
            .remote
            .get_quote(
                self.ctx.input_asset,
                self.ctx.target_asset,
                amount,
                self.ctx.slippage_bps,
            )
            .await
        {
            Ok(quote) => quote,
            Err(failure) => return failure_outcome(failure),
        };
        debug!(
            agent = %agent.pubkey(),
            in_amount = %quote.in_amount,
            out_amount = %quote.out_amount,
            "Quote received"
        );

        let payload = match self
            .remote
            .build_order(&quote, agent.pubkey(), self.ctx.priority_fee)
            .await
        {
            Ok(payload) => payload,
            Err(failure) => return failure_outcome(failure),
        };

        let tx = match sign_order(&payload, agent) {
            Ok(tx) => tx,
            Err(e) => return OperationOutcome::remote_error(e.to_string()),
        };

        // Last point where walking away leaves nothing on-chain
        if self.cancel.is_cancelled() {
            return OperationOutcome::Cancelled;
        }

        let signature = match self.ledger.submit(&tx).await {
            Ok(signature) => signature,
            Err(e) => return OperationOutcome::remote_error(e.to_string()),
        };
        metrics().submissions_total.inc();

        match self.poller.confirm(&signature).await {
            Ok(_) => OperationOutcome::Succeeded {
                signature: signature.to_string(),
            },
            Err(ConfirmError::OnChain(reason)) => OperationOutcome::ConfirmationFailed {
                signature: signature.to_string(),
                reason,
            },
            Err(ConfirmError::Timeout { .. }) | Err(ConfirmError::Cancelled) => {
                OperationOutcome::SucceededUnconfirmed {
                    signature: signature.to_string(),
                }
            }
        }
    }
}

fn failure_outcome(failure: ServiceFailure) -> OperationOutcome {
    match failure {
        ServiceFailure::NoLiquidity(_) => OperationOutcome::NoLiquidity,
        ServiceFailure::RateLimited { .. } => OperationOutcome::RateLimited,
        ServiceFailure::Remote { reason, .. } => OperationOutcome::RemoteError { reason },
        ServiceFailure::MissingPayload => OperationOutcome::remote_error(failure.to_string()),
        ServiceFailure::Cancelled => OperationOutcome::Cancelled,
    }
}

/// Decode the service's unsigned transaction and sign it with the agent key.
/// The keypair never leaves this function.
pub fn sign_order(payload: &str, agent: &Agent) -> Result<VersionedTransaction, LedgerError> {
    let bytes = BASE64_STANDARD
        .decode(payload)
        .map_err(|e| LedgerError::InvalidPayload(format!("base64: {}", e)))?;
    let unsigned: VersionedTransaction = bincode::deserialize(&bytes)
        .map_err(|e| LedgerError::InvalidPayload(format!("bincode: {}", e)))?;

    VersionedTransaction::try_new(unsigned.message, &[agent.keypair()])
        .map_err(|e| LedgerError::InvalidPayload(format!("signing: {}", e)))
}
