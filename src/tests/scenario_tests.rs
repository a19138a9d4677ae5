//! End-to-end runs against the scripted swap service and ledger

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;

use crate::coordinator::{BatchCoordinator, ProgressReport, ProgressSink, RunPhase, RunSettings};
use crate::test_utils::{agents, MockLedger, MockSwapApi};
use crate::types::RunTally;

#[derive(Default)]
struct RecordingSink {
    reports: Vec<ProgressReport>,
    phases: Vec<RunPhase>,
}

impl RecordingSink {
    fn pauses(&self) -> usize {
        self.phases
            .iter()
            .filter(|p| **p == RunPhase::BatchPaused)
            .count()
    }
}

impl ProgressSink for RecordingSink {
    fn on_batch(&mut self, report: &ProgressReport) {
        self.reports.push(report.clone());
    }

    fn on_phase(&mut self, phase: RunPhase) {
        self.phases.push(phase);
    }
}

#[tokio::test(start_paused = true)]
async fn test_unfunded_agent_is_skipped() {
    let api = Arc::new(MockSwapApi::new());
    let ledger = Arc::new(MockLedger::new().with_default_balance(0));
    let coordinator = BatchCoordinator::new(api.clone(), ledger, RunSettings::default());

    let mut sink = RecordingSink::default();
    let summary = coordinator
        .run(&agents(1), Pubkey::new_unique(), &mut sink)
        .await
        .unwrap();

    assert_eq!(
        summary.tally,
        RunTally {
            error: 1,
            ..Default::default()
        }
    );
    assert_eq!(api.quote_calls(), 0);
    assert_eq!(summary.success_rate(), 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_single_full_batch_all_confirmed() {
    let ledger = Arc::new(MockLedger::new());
    let coordinator =
        BatchCoordinator::new(Arc::new(MockSwapApi::new()), ledger.clone(), RunSettings::default());

    let mut sink = RecordingSink::default();
    let summary = coordinator
        .run(&agents(5), Pubkey::new_unique(), &mut sink)
        .await
        .unwrap();

    assert_eq!(summary.tally.success, 5);
    assert_eq!(summary.tally.confirmed, 5);
    assert_eq!(summary.tally.error, 0);
    assert_eq!(sink.reports.len(), 1);
    assert_eq!(sink.pauses(), 0);
    assert_eq!(ledger.submitted().len(), 5);
    assert_eq!(sink.phases.first(), Some(&RunPhase::Idle));
    assert_eq!(sink.phases.last(), Some(&RunPhase::Completed));
    // No fee samples on the mock, so the fallback is used
    assert_eq!(summary.fee, 100_000);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_quotes_recover() {
    let api = Arc::new(MockSwapApi::new().with_rate_limited_calls(2));
    let coordinator =
        BatchCoordinator::new(api.clone(), Arc::new(MockLedger::new()), RunSettings::default());

    let mut sink = RecordingSink::default();
    let summary = coordinator
        .run(&agents(1), Pubkey::new_unique(), &mut sink)
        .await
        .unwrap();

    assert_eq!(summary.tally.success, 1);
    assert_eq!(summary.tally.confirmed, 1);
    assert_eq!(api.quote_calls(), 3);
    assert_eq!(summary.limiter.rate_limited_total, 2);
    assert_eq!(summary.limiter.consecutive_failures, 0);
    assert!(summary.limiter.min_interval > Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn test_partial_last_batch_and_pacing() {
    let pool = agents(12);
    // Mix in two unfunded agents so the tallies are not uniform
    let ledger = MockLedger::new()
        .with_balance(pool[3].pubkey(), 0)
        .with_balance(pool[11].pubkey(), 0);
    let coordinator = BatchCoordinator::new(
        Arc::new(MockSwapApi::new()),
        Arc::new(ledger),
        RunSettings::default(),
    );

    let mut sink = RecordingSink::default();
    let started = tokio::time::Instant::now();
    let summary = coordinator
        .run(&pool, Pubkey::new_unique(), &mut sink)
        .await
        .unwrap();

    let sizes: Vec<u64> = sink.reports.iter().map(|r| r.batch.total()).collect();
    assert_eq!(sizes, vec![5, 5, 2]);
    assert!(sink.reports.iter().all(|r| r.total_batches == 3));
    assert_eq!(
        sink.reports.iter().map(|r| r.batch_index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(sink.pauses(), 2);
    assert!(started.elapsed() >= Duration::from_millis(6_000));

    let folded: RunTally = sink.reports.iter().map(|r| r.batch).sum();
    assert_eq!(sink.reports[2].cumulative, folded);
    assert_eq!(summary.tally, folded);
    assert_eq!(summary.tally.success, 10);
    assert_eq!(summary.tally.error, 2);
    assert_eq!(summary.batches, 3);
}

#[tokio::test(start_paused = true)]
async fn test_batches_run_concurrently() {
    let api = Arc::new(MockSwapApi::new().with_quote_latency(Duration::from_secs(5)));
    let settings = RunSettings {
        inter_batch_delay: Duration::ZERO,
        ..RunSettings::default()
    };
    let coordinator = BatchCoordinator::new(api, Arc::new(MockLedger::new()), settings);

    let mut sink = RecordingSink::default();
    let started = tokio::time::Instant::now();
    let summary = coordinator
        .run(&agents(5), Pubkey::new_unique(), &mut sink)
        .await
        .unwrap();

    assert_eq!(summary.tally.success, 5);
    // Sequential execution would need at least 25s of quote latency
    assert!(started.elapsed() < Duration::from_secs(20));
}
