//! Volume Simulator - Rate-limited batch swap orchestrator
//!
//! Drives one swap per agent wallet through a rate-limited quote/order
//! service and the Solana ledger, in paced fixed-size batches.
//!
//! - [`coordinator::BatchCoordinator`] runs the batches and reports progress
//! - [`executor::OperationExecutor`] is the per-agent pipeline
//! - [`swap_api::RemoteServiceClient`] wraps the quote service with
//!   [`rate_limiter::AdaptiveRateLimiter`] and a bounded retry loop
//! - [`confirmation::ConfirmationPoller`] decides whether a swap landed

pub mod config;
pub mod confirmation;
pub mod coordinator;
pub mod errors;
pub mod executor;
pub mod fee_estimator;
pub mod ledger;
pub mod metrics;
pub mod rate_limiter;
pub mod structured_logging;
pub mod swap_api;
pub mod types;
pub mod wallet;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

// Re-export commonly used types
pub use coordinator::{
    BatchCoordinator, ProgressReport, ProgressSink, RunPhase, RunSettings, RunSummary,
};
pub use errors::OrchestratorError;
pub use types::{Agent, OperationOutcome, RunTally};

#[cfg(test)]
mod tests {
    // Include test modules
    mod config_validation;
    mod scenario_tests;
}
