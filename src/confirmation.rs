//! Confirmation polling for submitted swaps

use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::errors::ConfirmError;
use crate::ledger::Ledger;
use crate::metrics::metrics;

#[derive(Debug, Clone)]
pub struct ConfirmationConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    pub delay_cap: Duration,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            base_delay: Duration::from_millis(500),
            backoff_factor: 1.5,
            delay_cap: Duration::from_millis(5_000),
        }
    }
}

impl ConfirmationConfig {
    /// `min(base_delay * backoff_factor^attempt, delay_cap)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.max(1.0).powi(attempt.min(64) as i32);
        let millis = (self.base_delay.as_millis() as f64 * factor)
            .min(self.delay_cap.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }
}

/// Polls the ledger until a signature reaches `confirmed` or the attempt
/// budget runs out. Independent of the swap service rate limiter.
pub struct ConfirmationPoller {
    ledger: Arc<dyn Ledger>,
    config: ConfirmationConfig,
    cancel: CancellationToken,
}

impl ConfirmationPoller {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        config: ConfirmationConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ledger,
            config,
            cancel,
        }
    }

    /// Returns the number of polls it took to see a terminal status.
    pub async fn confirm(&self, signature: &Signature) -> Result<u32, ConfirmError> {
        let started = Instant::now();

        for attempt in 0..self.config.max_attempts {
            match self.ledger.get_status(signature).await {
                Ok(Some(status)) if status.is_terminal() => {
                    metrics()
                        .confirmation_latency
                        .observe(started.elapsed().as_secs_f64());
                    return match status.error {
                        Some(err) => Err(ConfirmError::OnChain(err)),
                        None => Ok(attempt + 1),
                    };
                }
                Ok(status) => {
                    trace!(signature = %signature, attempt, status = ?status, "Not yet confirmed");
                }
                Err(e) => {
                    debug!(signature = %signature, attempt, error = %e, "Status poll failed");
                }
            }

            if attempt + 1 == self.config.max_attempts {
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(ConfirmError::Cancelled),
                _ = sleep(self.config.delay_for(attempt)) => {}
            }
        }

        Err(ConfirmError::Timeout {
            attempts: self.config.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockLedger;

    fn poller(ledger: Arc<MockLedger>, max_attempts: u32) -> ConfirmationPoller {
        ConfirmationPoller::new(
            ledger,
            ConfirmationConfig {
                max_attempts,
                ..ConfirmationConfig::default()
            },
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_delay_schedule_is_capped() {
        let config = ConfirmationConfig::default();
        assert_eq!(config.delay_for(0), Duration::from_millis(500));
        assert_eq!(config.delay_for(1), Duration::from_millis(750));
        assert_eq!(config.delay_for(2), Duration::from_millis(1_125));
        assert_eq!(config.delay_for(10), Duration::from_millis(5_000));
        assert_eq!(config.delay_for(1_000), Duration::from_millis(5_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirms_after_exactly_k_polls() {
        for k in [1u32, 2, 7] {
            let ledger = Arc::new(MockLedger::new().with_confirm_after(k));
            let polls = poller(ledger.clone(), 30)
                .confirm(&Signature::default())
                .await
                .unwrap();
            assert_eq!(polls, k);
            assert_eq!(ledger.status_calls(), k as usize);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_without_terminal_status() {
        let ledger = Arc::new(MockLedger::new().with_confirm_after(u32::MAX));
        let err = poller(ledger.clone(), 4)
            .confirm(&Signature::default())
            .await
            .unwrap_err();
        assert_eq!(err, ConfirmError::Timeout { attempts: 4 });
        assert_eq!(ledger.status_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_chain_error_is_reported() {
        let ledger = Arc::new(
            MockLedger::new()
                .with_confirm_after(2)
                .with_on_chain_error("custom program error: 0x1771"),
        );
        let err = poller(ledger, 30)
            .confirm(&Signature::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConfirmError::OnChain(reason) if reason.contains("0x1771")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_polling() {
        let ledger = Arc::new(MockLedger::new().with_confirm_after(u32::MAX));
        let cancel = CancellationToken::new();
        let poller = ConfirmationPoller::new(ledger, ConfirmationConfig::default(), cancel.clone());
        cancel.cancel();
        let err = poller.confirm(&Signature::default()).await.unwrap_err();
        assert_eq!(err, ConfirmError::Cancelled);
    }
}
