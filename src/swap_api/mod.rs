//! Swap service access
//!
//! - **jupiter**: reqwest transport for a Jupiter v6 style quote/swap API
//! - **RemoteServiceClient**: rate-limited, time-bounded, retrying wrapper
//!   used by the executors
//!
//! The transport is behind the [`SwapApi`] trait so executors can be driven
//! against scripted services in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use solana_sdk::pubkey::Pubkey;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{ServiceFailure, SwapApiError};
use crate::metrics::metrics;
use crate::rate_limiter::{AdaptiveRateLimiter, RateLimitOutcome};

pub mod jupiter;

pub use jupiter::{JupiterApi, DEFAULT_JUPITER_URL};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub amount: u64,
    pub slippage_bps: u16,
}

/// A quote as returned by the service.
///
/// Only the amounts are interpreted; every other field is carried through
/// untouched because the swap endpoint expects the quote back verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub in_amount: String,
    pub out_amount: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    pub quote_response: Quote,
    pub user_public_key: String,
    pub wrap_and_unwrap_sol: bool,
    pub dynamic_compute_unit_limit: bool,
    pub prioritization_fee_lamports: u64,
}

impl SwapRequest {
    pub fn new(quote: Quote, user: Pubkey, fee_lamports: u64) -> Self {
        Self {
            quote_response: quote,
            user_public_key: user.to_string(),
            wrap_and_unwrap_sol: true,
            dynamic_compute_unit_limit: true,
            prioritization_fee_lamports: fee_lamports,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapResponse {
    /// Base64 bincode-encoded unsigned `VersionedTransaction`
    #[serde(default)]
    pub swap_transaction: Option<String>,
}

/// Raw quote/swap transport
#[async_trait]
pub trait SwapApi: Send + Sync {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, SwapApiError>;

    async fn swap(&self, request: &SwapRequest) -> Result<SwapResponse, SwapApiError>;
}

/// Retry policy for remote service calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    /// Delay before attempt `n + 1` is `base_delay * n`
    pub base_delay: Duration,
    /// Hard bound on a single call
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(2_000),
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// Rate-limited client for the swap service shared by all executors of a run
pub struct RemoteServiceClient {
    api: Arc<dyn SwapApi>,
    limiter: Arc<AdaptiveRateLimiter>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RemoteServiceClient {
    pub fn new(
        api: Arc<dyn SwapApi>,
        limiter: Arc<AdaptiveRateLimiter>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            api,
            limiter,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Abandon limiter waits, backoffs and retry delays once `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn limiter(&self) -> &Arc<AdaptiveRateLimiter> {
        &self.limiter
    }

    pub async fn get_quote(
        &self,
        input_mint: Pubkey,
        output_mint: Pubkey,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<Quote, ServiceFailure> {
        let request = QuoteRequest {
            input_mint,
            output_mint,
            amount,
            slippage_bps,
        };
        let api = self.api.as_ref();
        let request = &request;
        self.call("quote", move || api.quote(request)).await
    }

    /// Ask the service for a signable swap transaction. Returns the base64
    /// payload.
    pub async fn build_order(
        &self,
        quote: &Quote,
        agent: Pubkey,
        fee_lamports: u64,
    ) -> Result<String, ServiceFailure> {
        let request = SwapRequest::new(quote.clone(), agent, fee_lamports);
        let api = self.api.as_ref();
        let request = &request;
        let response = self.call("swap", move || api.swap(request)).await?;

        match response.swap_transaction {
            Some(payload) if !payload.is_empty() => Ok(payload),
            _ => Err(ServiceFailure::MissingPayload),
        }
    }

    /// Bounded retry loop around one gated call
    async fn call<T, F, Fut>(&self, operation: &'static str, mut f: F) -> Result<T, ServiceFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SwapApiError>>,
    {
        let mut last_error = None;

        for attempt in 1..=self.policy.max_attempts {
            self.unless_cancelled(self.limiter.acquire()).await?;

            let result = match timeout(self.policy.call_timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(SwapApiError::Timeout {
                    timeout_ms: self.policy.call_timeout.as_millis() as u64,
                }),
            };

            let err = match result {
                Ok(value) => {
                    self.limiter.report_outcome(RateLimitOutcome::Success).await;
                    if attempt > 1 {
                        debug!(
                            operation,
                            attempts = attempt,
                            "Swap service call succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(match err {
                    SwapApiError::NoRoute(reason) => ServiceFailure::NoLiquidity(reason),
                    other => ServiceFailure::Remote {
                        attempts: attempt,
                        reason: other.to_string(),
                    },
                });
            }

            if err.is_rate_limited() {
                metrics().remote_rate_limited_total.inc();
                self.unless_cancelled(self.limiter.report_outcome(RateLimitOutcome::RateLimited))
                    .await?;
            }

            if attempt < self.policy.max_attempts {
                let delay = self.policy.base_delay * attempt;
                debug!(
                    operation,
                    attempt,
                    max_attempts = self.policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Swap service call failed, retrying"
                );
                metrics().remote_retries_total.inc();
                self.unless_cancelled(sleep(delay)).await?;
            } else {
                warn!(
                    operation,
                    attempts = attempt,
                    error = %err,
                    "All swap service attempts exhausted"
                );
            }
            last_error = Some(err);
        }

        let attempts = self.policy.max_attempts;
        Err(match last_error {
            Some(SwapApiError::RateLimited) => ServiceFailure::RateLimited { attempts },
            Some(err) => ServiceFailure::Remote {
                attempts,
                reason: err.to_string(),
            },
            None => ServiceFailure::Remote {
                attempts,
                reason: "no attempts made".to_string(),
            },
        })
    }

    async fn unless_cancelled<F>(&self, wait: F) -> Result<(), ServiceFailure>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ServiceFailure::Cancelled),
            _ = wait => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limiter::RateLimiterConfig;
    use crate::test_utils::MockSwapApi;
    use solana_sdk::signature::{Keypair, Signer};
    use tokio::time::Instant;

    fn client(api: Arc<MockSwapApi>) -> RemoteServiceClient {
        RemoteServiceClient::new(
            api,
            Arc::new(AdaptiveRateLimiter::new(RateLimiterConfig::default())),
            RetryPolicy::default(),
        )
    }

    fn mints() -> (Pubkey, Pubkey) {
        (spl_token::native_mint::id(), Pubkey::new_unique())
    }

    #[tokio::test(start_paused = true)]
    async fn test_quote_retries_through_rate_limits() {
        let api = Arc::new(MockSwapApi::new().with_rate_limited_calls(2));
        let client = client(api.clone());
        let (input, output) = mints();

        let quote = client.get_quote(input, output, 1_000, 300).await.unwrap();
        assert_eq!(quote.in_amount, "1000");
        assert_eq!(api.quote_calls(), 3);

        let snapshot = client.limiter().snapshot().await;
        assert_eq!(snapshot.rate_limited_total, 2);
        assert_eq!(snapshot.consecutive_failures, 0);
        assert!(snapshot.min_interval > RateLimiterConfig::default().base_interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_tagged_rate_limited() {
        let api = Arc::new(MockSwapApi::new().with_rate_limited_calls(u32::MAX));
        let client = client(api.clone());
        let (input, output) = mints();

        let err = client.get_quote(input, output, 1_000, 300).await.unwrap_err();
        assert_eq!(err, ServiceFailure::RateLimited { attempts: 5 });
        assert_eq!(api.quote_calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_linear_retry_delay_on_server_errors() {
        let api = Arc::new(MockSwapApi::new().with_quote_error(SwapApiError::Http {
            status: 502,
            body: "bad gateway".into(),
        }));
        let client = RemoteServiceClient::new(
            api.clone(),
            Arc::new(AdaptiveRateLimiter::new(RateLimiterConfig {
                base_interval: Duration::from_millis(1),
                ..RateLimiterConfig::default()
            })),
            RetryPolicy::default(),
        );
        let (input, output) = mints();

        let start = Instant::now();
        let err = client.get_quote(input, output, 1_000, 300).await.unwrap_err();
        assert!(matches!(err, ServiceFailure::Remote { attempts: 5, .. }));
        // 2s + 4s + 6s + 8s between the five attempts
        assert!(start.elapsed() >= Duration::from_secs(20));
        assert!(start.elapsed() < Duration::from_secs(21));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_retry_delay() {
        let api = Arc::new(MockSwapApi::new().with_quote_error(SwapApiError::Http {
            status: 502,
            body: "bad gateway".into(),
        }));
        let cancel = CancellationToken::new();
        let client = client(api.clone()).with_cancellation(cancel.clone());
        let (input, output) = mints();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = client.get_quote(input, output, 1_000, 300).await.unwrap_err();
        assert_eq!(err, ServiceFailure::Cancelled);
        // First retry at 2s, second delay interrupted at 3s
        assert_eq!(api.quote_calls(), 2);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_route_is_not_retried() {
        let api = Arc::new(MockSwapApi::new().with_no_route());
        let client = client(api.clone());
        let (input, output) = mints();

        let err = client.get_quote(input, output, 1_000, 300).await.unwrap_err();
        assert!(matches!(err, ServiceFailure::NoLiquidity(_)));
        assert_eq!(api.quote_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_call_times_out() {
        let api = Arc::new(MockSwapApi::new().with_quote_latency(Duration::from_secs(60)));
        let client = client(api.clone());
        let (input, output) = mints();

        let err = client.get_quote(input, output, 1_000, 300).await.unwrap_err();
        match err {
            ServiceFailure::Remote { attempts, reason } => {
                assert_eq!(attempts, 5);
                assert!(reason.contains("Timeout"));
            }
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_payload_is_remote_failure() {
        let api = Arc::new(MockSwapApi::new().without_payload());
        let client = client(api.clone());
        let (input, output) = mints();

        let quote = client.get_quote(input, output, 1_000, 300).await.unwrap();
        let err = client
            .build_order(&quote, Keypair::new().pubkey(), 10_000)
            .await
            .unwrap_err();
        assert_eq!(err, ServiceFailure::MissingPayload);
        assert_eq!(api.swap_calls(), 1);
    }

    #[test]
    fn test_swap_request_wire_format() {
        let quote: Quote = serde_json::from_value(serde_json::json!({
            "inAmount": "1000",
            "outAmount": "42",
            "routePlan": [],
            "slippageBps": 300
        }))
        .unwrap();
        let user = Pubkey::new_unique();
        let body = serde_json::to_value(SwapRequest::new(quote, user, 5_000)).unwrap();

        assert_eq!(body["userPublicKey"], user.to_string());
        assert_eq!(body["wrapAndUnwrapSol"], true);
        assert_eq!(body["dynamicComputeUnitLimit"], true);
        assert_eq!(body["prioritizationFeeLamports"], 5_000);
        assert_eq!(body["quoteResponse"]["slippageBps"], 300);
        assert_eq!(body["quoteResponse"]["outAmount"], "42");
    }
}
