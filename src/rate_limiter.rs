//! Adaptive rate limiter for the swap service
//!
//! The service publishes no limits, so the spacing between calls is learned:
//! every 429 widens the minimum interval and parks the reporting caller for an
//! exponential backoff, every success relaxes the interval back towards the
//! base. All state sits behind one mutex. `acquire` reserves its slot while
//! holding the lock and sleeps after releasing it, so concurrent callers are
//! strictly spaced without serialising their sleeps.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, warn};

/// Rate limiter tuning
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Spacing between calls when the service is healthy
    pub base_interval: Duration,
    /// Upper bound for the learned spacing
    pub interval_cap: Duration,
    /// First backoff after a 429
    pub base_backoff: Duration,
    pub backoff_cap: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(500),
            interval_cap: Duration::from_secs(10),
            base_backoff: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitOutcome {
    Success,
    RateLimited,
}

/// Point-in-time view of the limiter state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimiterSnapshot {
    pub min_interval: Duration,
    pub consecutive_failures: u32,
    pub rate_limited_total: u64,
}

#[derive(Debug)]
struct RateLimiterState {
    /// Last slot handed out (may lie in the future)
    last_slot: Option<Instant>,
    min_interval: Duration,
    consecutive_failures: u32,
    rate_limited_total: u64,
}

#[derive(Debug)]
pub struct AdaptiveRateLimiter {
    config: RateLimiterConfig,
    state: Mutex<RateLimiterState>,
}

impl AdaptiveRateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let state = RateLimiterState {
            last_slot: None,
            min_interval: config.base_interval,
            consecutive_failures: 0,
            rate_limited_total: 0,
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    /// Wait until the next call may be issued and claim that slot.
    pub async fn acquire(&self) {
        let slot = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let slot = match state.last_slot {
                Some(last) => (last + state.min_interval).max(now),
                None => now,
            };
            state.last_slot = Some(slot);
            slot
        };

        if slot > Instant::now() {
            sleep_until(slot).await;
        }
    }

    /// Feed the result of a gated call back into the limiter.
    ///
    /// A rate-limited report suspends the caller for the backoff before
    /// returning.
    pub async fn report_outcome(&self, outcome: RateLimitOutcome) {
        match outcome {
            RateLimitOutcome::Success => {
                let mut state = self.state.lock().await;
                state.consecutive_failures = 0;
                state.min_interval = state
                    .min_interval
                    .mul_f64(0.9)
                    .max(self.config.base_interval);
            }
            RateLimitOutcome::RateLimited => {
                let backoff = {
                    let mut state = self.state.lock().await;
                    let backoff = self.backoff_for(state.consecutive_failures);
                    state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                    state.rate_limited_total += 1;
                    state.min_interval = state
                        .min_interval
                        .mul_f64(1.5)
                        .min(self.config.interval_cap);
                    warn!(
                        consecutive_failures = state.consecutive_failures,
                        min_interval_ms = state.min_interval.as_millis() as u64,
                        backoff_ms = backoff.as_millis() as u64,
                        "Swap service rate limit hit, backing off"
                    );
                    crate::metrics::metrics()
                        .rate_limiter_interval_ms
                        .set(state.min_interval.as_millis() as i64);
                    backoff
                };
                sleep(backoff).await;
                return;
            }
        }
        debug!("Rate limiter success recorded");
    }

    /// `min(base_backoff * 2^failures, backoff_cap)`
    fn backoff_for(&self, failures: u32) -> Duration {
        let factor = 2u32.checked_pow(failures).unwrap_or(u32::MAX);
        self.config
            .base_backoff
            .checked_mul(factor)
            .unwrap_or(self.config.backoff_cap)
            .min(self.config.backoff_cap)
    }

    pub async fn snapshot(&self) -> RateLimiterSnapshot {
        let state = self.state.lock().await;
        RateLimiterSnapshot {
            min_interval: state.min_interval,
            consecutive_failures: state.consecutive_failures,
            rate_limited_total: state.rate_limited_total,
        }
    }
}

impl Default for AdaptiveRateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}
