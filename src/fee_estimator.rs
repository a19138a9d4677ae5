//! Once-per-run priority fee estimation

use solana_sdk::pubkey::Pubkey;
use tracing::{info, warn};

use crate::ledger::Ledger;

#[derive(Debug, Clone)]
pub struct FeeEstimatorConfig {
    /// Percentile of recent samples to pay (75..=80 keeps us ahead of most
    /// traffic without chasing outliers)
    pub percentile: f64,
    /// Compute units assumed per swap when converting the per-CU price
    pub compute_units: u64,
    /// Floor, in lamports
    pub min_fee_lamports: u64,
    /// Used when the samples cannot be fetched, in lamports
    pub fallback_fee_lamports: u64,
}

impl Default for FeeEstimatorConfig {
    fn default() -> Self {
        Self {
            percentile: 75.0,
            compute_units: 300_000,
            min_fee_lamports: 10_000,
            fallback_fee_lamports: 100_000,
        }
    }
}

pub struct PriorityFeeEstimator {
    config: FeeEstimatorConfig,
}

impl PriorityFeeEstimator {
    pub fn new(config: FeeEstimatorConfig) -> Self {
        Self { config }
    }

    /// Priority fee in lamports for every swap of the run
    pub async fn estimate(&self, ledger: &dyn Ledger, accounts: &[Pubkey]) -> u64 {
        match ledger.recent_fee_samples(accounts).await {
            Ok(samples) if !samples.is_empty() => {
                let micro_lamports_per_cu = percentile(samples, self.config.percentile);
                let fee = (micro_lamports_per_cu as u128 * self.config.compute_units as u128
                    / 1_000_000) as u64;
                let fee = fee.max(self.config.min_fee_lamports);
                info!(
                    percentile = self.config.percentile,
                    micro_lamports_per_cu,
                    fee_lamports = fee,
                    "💸 Priority fee estimated"
                );
                fee
            }
            Ok(_) => {
                warn!(
                    fallback = self.config.fallback_fee_lamports,
                    "No recent fee samples, using fallback priority fee"
                );
                self.config.fallback_fee_lamports
            }
            Err(e) => {
                warn!(
                    error = %e,
                    fallback = self.config.fallback_fee_lamports,
                    "Fee sample query failed, using fallback priority fee"
                );
                self.config.fallback_fee_lamports
            }
        }
    }
}

/// Nearest-rank percentile
fn percentile(mut samples: Vec<u64>, pct: f64) -> u64 {
    samples.sort_unstable();
    let rank = ((pct.clamp(0.0, 100.0) / 100.0) * samples.len() as f64).ceil() as usize;
    samples[rank.clamp(1, samples.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockLedger;

    #[test]
    fn test_nearest_rank_percentile() {
        let samples: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile(samples.clone(), 75.0), 75);
        assert_eq!(percentile(samples.clone(), 80.0), 80);
        assert_eq!(percentile(samples, 0.0), 1);
        assert_eq!(percentile(vec![9, 1, 5, 3], 75.0), 5);
        assert_eq!(percentile(vec![42], 75.0), 42);
    }

    #[tokio::test]
    async fn test_estimate_uses_percentile_and_floor() {
        let estimator = PriorityFeeEstimator::new(FeeEstimatorConfig::default());

        // 75th percentile of 0..=99_000 step 1000 is 74_000 µL/CU -> 22_200 lamports
        let samples: Vec<u64> = (0..100).map(|i| i * 1_000).collect();
        let ledger = MockLedger::new().with_fee_samples(samples);
        assert_eq!(estimator.estimate(&ledger, &[]).await, 22_200);

        let quiet = MockLedger::new().with_fee_samples(vec![0, 0, 1, 2]);
        assert_eq!(estimator.estimate(&quiet, &[]).await, 10_000);
    }

    #[tokio::test]
    async fn test_estimate_falls_back() {
        let estimator = PriorityFeeEstimator::new(FeeEstimatorConfig::default());

        let empty = MockLedger::new().with_fee_samples(vec![]);
        assert_eq!(estimator.estimate(&empty, &[]).await, 100_000);

        let failing = MockLedger::new().with_failing_fee_samples();
        assert_eq!(estimator.estimate(&failing, &[]).await, 100_000);
    }
}
