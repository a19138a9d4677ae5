//! Batch coordinator
//!
//! Splits the agent pool into fixed-size batches, runs each batch with full
//! concurrency, folds outcomes into tallies and paces batches so the swap
//! service is not hammered. Batches never overlap.

use futures::future::join_all;
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::confirmation::{ConfirmationConfig, ConfirmationPoller};
use crate::errors::OrchestratorError;
use crate::executor::OperationExecutor;
use crate::fee_estimator::{FeeEstimatorConfig, PriorityFeeEstimator};
use crate::ledger::Ledger;
use crate::metrics::metrics;
use crate::rate_limiter::{AdaptiveRateLimiter, RateLimiterConfig, RateLimiterSnapshot};
use crate::structured_logging::RunLogger;
use crate::swap_api::{RemoteServiceClient, RetryPolicy, SwapApi};
use crate::types::{Agent, BatchTally, OperationOutcome, RunContext, RunTally, SpendPolicy};

/// Everything a run needs besides the agents and the target asset
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub batch_size: usize,
    pub inter_batch_delay: Duration,
    pub slippage_bps: u16,
    pub policy: SpendPolicy,
    pub rate_limiter: RateLimiterConfig,
    pub retry: RetryPolicy,
    pub confirmation: ConfirmationConfig,
    pub fees: FeeEstimatorConfig,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            inter_batch_delay: Duration::from_millis(3_000),
            slippage_bps: 300,
            policy: SpendPolicy::default(),
            rate_limiter: RateLimiterConfig::default(),
            retry: RetryPolicy::default(),
            confirmation: ConfirmationConfig::default(),
            fees: FeeEstimatorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    FeeEstimation,
    BatchRunning,
    BatchPaused,
    Completed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::FeeEstimation => "fee_estimation",
            RunPhase::BatchRunning => "batch_running",
            RunPhase::BatchPaused => "batch_paused",
            RunPhase::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Emitted once per finished batch, in batch order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReport {
    pub batch_index: usize,
    pub total_batches: usize,
    pub batch: BatchTally,
    pub cumulative: RunTally,
}

/// Receives progress synchronously from the run loop.
///
/// Any `FnMut(&ProgressReport)` closure is a sink.
pub trait ProgressSink: Send {
    fn on_batch(&mut self, report: &ProgressReport);

    fn on_phase(&mut self, _phase: RunPhase) {}
}

impl<F> ProgressSink for F
where
    F: FnMut(&ProgressReport) + Send,
{
    fn on_batch(&mut self, report: &ProgressReport) {
        self(report)
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub tally: RunTally,
    pub total_agents: usize,
    pub batches: usize,
    /// Priority fee used by every swap of the run, in lamports
    pub fee: u64,
    /// Limiter state when the run ended
    pub limiter: RateLimiterSnapshot,
}

impl RunSummary {
    /// Successful agents over all agents, `0.0` for an empty run
    pub fn success_rate(&self) -> f64 {
        if self.total_agents == 0 {
            return 0.0;
        }
        self.tally.success as f64 / self.total_agents as f64
    }
}

pub struct BatchCoordinator {
    api: Arc<dyn SwapApi>,
    ledger: Arc<dyn Ledger>,
    settings: RunSettings,
    cancel: CancellationToken,
}

impl BatchCoordinator {
    pub fn new(api: Arc<dyn SwapApi>, ledger: Arc<dyn Ledger>, settings: RunSettings) -> Self {
        Self {
            api,
            ledger,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancelling this token stops the current run at the next safe point
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(
        &self,
        agents: &[Arc<Agent>],
        target_asset: Pubkey,
        sink: &mut dyn ProgressSink,
    ) -> Result<RunSummary, OrchestratorError> {
        if agents.is_empty() {
            return Err(OrchestratorError::NoAgents);
        }
        if self.settings.batch_size == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "batch size must be at least 1".into(),
            ));
        }

        let logger = RunLogger::for_new_run();
        let batch_size = self.settings.batch_size;
        let total_batches = agents.len().div_ceil(batch_size);
        enter_phase(sink, &logger, RunPhase::Idle);
        logger.log_run_started(&target_asset, agents.len(), total_batches);

        enter_phase(sink, &logger, RunPhase::FeeEstimation);
        let fee = PriorityFeeEstimator::new(self.settings.fees.clone())
            .estimate(self.ledger.as_ref(), &[target_asset])
            .await;
        metrics().run_priority_fee_lamports.set(fee as i64);

        let ctx = Arc::new(RunContext {
            batch_size,
            slippage_bps: self.settings.slippage_bps,
            policy: self.settings.policy,
            inter_batch_delay: self.settings.inter_batch_delay,
            ..RunContext::new(target_asset).with_priority_fee(fee)
        });

        // Fresh limiter per run, learned spacing does not leak between runs
        let limiter = Arc::new(AdaptiveRateLimiter::new(self.settings.rate_limiter.clone()));
        let remote = Arc::new(
            RemoteServiceClient::new(
                self.api.clone(),
                limiter.clone(),
                self.settings.retry.clone(),
            )
            .with_cancellation(self.cancel.clone()),
        );
        let poller = Arc::new(ConfirmationPoller::new(
            self.ledger.clone(),
            self.settings.confirmation.clone(),
            self.cancel.clone(),
        ));
        let executor = Arc::new(OperationExecutor::new(
            ctx.clone(),
            remote,
            self.ledger.clone(),
            poller,
            self.cancel.clone(),
            logger.clone(),
        ));

        let mut cumulative = RunTally::default();
        let mut batches_run = 0;

        for (batch_index, chunk) in agents.chunks(batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                let remaining = agents.len() - batch_index * batch_size;
                info!(
                    context_id = %logger.context_id(),
                    remaining,
                    "🛑 Run cancelled, skipping remaining agents"
                );
                cumulative += (0..remaining)
                    .map(|_| &OperationOutcome::Cancelled)
                    .collect::<RunTally>();
                break;
            }

            enter_phase(sink, &logger, RunPhase::BatchRunning);
            let batch = self
                .run_batch(&executor, &logger, batch_index, chunk)
                .await;
            cumulative += batch;
            batches_run += 1;
            metrics().batches_total.inc();

            logger.log_batch(batch_index, total_batches, &batch, &cumulative);
            sink.on_batch(&ProgressReport {
                batch_index,
                total_batches,
                batch,
                cumulative,
            });

            if batch_index + 1 < total_batches {
                enter_phase(sink, &logger, RunPhase::BatchPaused);
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(ctx.inter_batch_delay) => {}
                }
            }
        }

        enter_phase(sink, &logger, RunPhase::Completed);
        let summary = RunSummary {
            tally: cumulative,
            total_agents: agents.len(),
            batches: batches_run,
            fee,
            limiter: limiter.snapshot().await,
        };
        logger.log_run_completed(&summary.tally, summary.total_agents, summary.success_rate());
        Ok(summary)
    }

    async fn run_batch(
        &self,
        executor: &Arc<OperationExecutor>,
        logger: &RunLogger,
        batch_index: usize,
        chunk: &[Arc<Agent>],
    ) -> BatchTally {
        let first_index = batch_index * self.settings.batch_size;
        let handles = chunk.iter().enumerate().map(|(offset, agent)| {
            let executor = executor.clone();
            let agent = agent.clone();
            tokio::spawn(async move { executor.execute(first_index + offset, &agent).await })
        });

        let mut outcomes = Vec::with_capacity(chunk.len());
        for joined in join_all(handles).await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    metrics().batch_failures_total.inc();
                    logger.log_batch_failure(batch_index, chunk.len(), &e.to_string());
                    let failed =
                        OperationOutcome::remote_error(format!("batch task failed: {}", e));
                    return (0..chunk.len()).map(|_| &failed).collect();
                }
            }
        }
        outcomes.iter().collect()
    }
}

fn enter_phase(sink: &mut dyn ProgressSink, logger: &RunLogger, phase: RunPhase) {
    debug!(context_id = %logger.context_id(), phase = %phase, "Run phase");
    sink.on_phase(phase);
}
