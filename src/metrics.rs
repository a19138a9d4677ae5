//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub operations_total: IntCounterVec,
    pub submissions_total: IntCounter,
    pub batches_total: IntCounter,
    pub batch_failures_total: IntCounter,
    pub remote_rate_limited_total: IntCounter,
    pub remote_retries_total: IntCounter,

    // Gauges
    pub rate_limiter_interval_ms: IntGauge,
    pub run_priority_fee_lamports: IntGauge,

    // Histograms
    pub operation_latency: Histogram,
    pub confirmation_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let operations_total = IntCounterVec::new(
            Opts::new("operations_total", "Agent operations by terminal outcome"),
            &["outcome"],
        )?;

        let submissions_total = IntCounter::with_opts(Opts::new(
            "submissions_total",
            "Signed swaps submitted to the ledger",
        ))?;

        let batches_total =
            IntCounter::with_opts(Opts::new("batches_total", "Batches completed"))?;

        let batch_failures_total = IntCounter::with_opts(Opts::new(
            "batch_failures_total",
            "Batches that failed with an unexpected error",
        ))?;

        let remote_rate_limited_total = IntCounter::with_opts(Opts::new(
            "remote_rate_limited_total",
            "HTTP 429 responses from the swap service",
        ))?;

        let remote_retries_total = IntCounter::with_opts(Opts::new(
            "remote_retries_total",
            "Retried swap service calls",
        ))?;

        let rate_limiter_interval_ms = IntGauge::with_opts(Opts::new(
            "rate_limiter_interval_ms",
            "Current learned spacing between swap service calls",
        ))?;

        let run_priority_fee_lamports = IntGauge::with_opts(Opts::new(
            "run_priority_fee_lamports",
            "Priority fee frozen for the current run",
        ))?;

        let operation_latency = Histogram::with_opts(
            HistogramOpts::new("operation_latency_seconds", "End-to-end agent operation latency")
                .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 40.0, 80.0]),
        )?;

        let confirmation_latency = Histogram::with_opts(
            HistogramOpts::new("confirmation_latency_seconds", "Submission to confirmation latency")
                .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(operations_total.clone()))?;
        registry.register(Box::new(submissions_total.clone()))?;
        registry.register(Box::new(batches_total.clone()))?;
        registry.register(Box::new(batch_failures_total.clone()))?;
        registry.register(Box::new(remote_rate_limited_total.clone()))?;
        registry.register(Box::new(remote_retries_total.clone()))?;
        registry.register(Box::new(rate_limiter_interval_ms.clone()))?;
        registry.register(Box::new(run_priority_fee_lamports.clone()))?;
        registry.register(Box::new(operation_latency.clone()))?;
        registry.register(Box::new(confirmation_latency.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            submissions_total,
            batches_total,
            batch_failures_total,
            remote_rate_limited_total,
            remote_retries_total,
            rate_limiter_interval_ms,
            run_priority_fee_lamports,
            operation_latency,
            confirmation_latency,
        })
    }

    pub fn record_outcome(&self, label: &str) {
        self.operations_total.with_label_values(&[label]).inc();
    }

    /// Prometheus text exposition of everything registered
    pub fn export_text(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_counter_is_exported() {
        let m = Metrics::new().unwrap();
        m.record_outcome("succeeded");
        m.record_outcome("succeeded");
        m.record_outcome("rate_limited");

        assert_eq!(m.operations_total.with_label_values(&["succeeded"]).get(), 2);
        let text = m.export_text().unwrap();
        assert!(text.contains("operations_total{outcome=\"rate_limited\"} 1"));
    }
}
