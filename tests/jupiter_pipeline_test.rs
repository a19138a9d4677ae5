//! Full runs against a local HTTP stand-in for the swap service

use std::sync::Arc;
use std::time::Duration;

use mockito::{Matcher, Server};
use solana_sdk::pubkey::Pubkey;

use volume_sim::confirmation::ConfirmationConfig;
use volume_sim::rate_limiter::RateLimiterConfig;
use volume_sim::swap_api::{JupiterApi, RetryPolicy};
use volume_sim::test_utils::{agents, unsigned_payload, MockLedger};
use volume_sim::{BatchCoordinator, ProgressReport, RunSettings};

fn fast_settings() -> RunSettings {
    RunSettings {
        inter_batch_delay: Duration::from_millis(10),
        rate_limiter: RateLimiterConfig {
            base_interval: Duration::from_millis(1),
            interval_cap: Duration::from_millis(50),
            base_backoff: Duration::from_millis(5),
            backoff_cap: Duration::from_millis(20),
        },
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            call_timeout: Duration::from_secs(5),
        },
        confirmation: ConfirmationConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.5,
            delay_cap: Duration::from_millis(5),
        },
        ..RunSettings::default()
    }
}

#[tokio::test]
async fn test_swap_lands_through_http_service() {
    let pool = agents(1);
    let mut server = Server::new_async().await;
    let quote = server
        .mock("GET", "/quote")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"inAmount":"689500000","outAmount":"42","routePlan":[]}"#)
        .expect(1)
        .create_async()
        .await;
    let swap = server
        .mock("POST", "/swap")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "userPublicKey": pool[0].pubkey().to_string(),
        })))
        .with_status(200)
        .with_body(
            serde_json::json!({
                "swapTransaction": unsigned_payload(&pool[0].pubkey()),
                "lastValidBlockHeight": 1000,
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let api = JupiterApi::new(&server.url(), Duration::from_secs(5)).unwrap();
    let ledger = Arc::new(MockLedger::new());
    let coordinator = BatchCoordinator::new(Arc::new(api), ledger.clone(), fast_settings());

    let summary = coordinator
        .run(&pool, Pubkey::new_unique(), &mut |_: &ProgressReport| {})
        .await
        .unwrap();

    assert_eq!(summary.tally.confirmed, 1);
    assert_eq!(ledger.submitted().len(), 1);
    quote.assert_async().await;
    swap.assert_async().await;
}

#[tokio::test]
async fn test_persistent_429_ends_rate_limited() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/quote")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_body("Too Many Requests")
        .expect(3)
        .create_async()
        .await;

    let api = JupiterApi::new(&server.url(), Duration::from_secs(5)).unwrap();
    let ledger = Arc::new(MockLedger::new());
    let coordinator = BatchCoordinator::new(Arc::new(api), ledger.clone(), fast_settings());

    let summary = coordinator
        .run(&agents(1), Pubkey::new_unique(), &mut |_: &ProgressReport| {})
        .await
        .unwrap();

    assert_eq!(summary.tally.error, 1);
    assert_eq!(summary.tally.rate_limited, 1);
    assert_eq!(summary.limiter.rate_limited_total, 3);
    assert!(ledger.submitted().is_empty());
}

#[tokio::test]
async fn test_no_route_is_no_liquidity() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/quote")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"error":"Could not find any route","errorCode":"COULD_NOT_FIND_ANY_ROUTE"}"#)
        .expect(2)
        .create_async()
        .await;

    let api = Arc::new(JupiterApi::new(&server.url(), Duration::from_secs(5)).unwrap());
    let coordinator = BatchCoordinator::new(api, Arc::new(MockLedger::new()), fast_settings());

    let mut outcomes = Vec::new();
    let summary = coordinator
        .run(&agents(2), Pubkey::new_unique(), &mut |r: &ProgressReport| {
            outcomes.push(r.batch)
        })
        .await
        .unwrap();

    assert_eq!(summary.tally.error, 2);
    assert_eq!(summary.tally.success, 0);
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].rate_limited, 0);
}

#[tokio::test]
async fn test_gateway_error_with_json_body_is_retried() {
    let mut server = Server::new_async().await;
    let quote = server
        .mock("GET", "/quote")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body(r#"{"error":"Service temporarily unavailable"}"#)
        .expect(3)
        .create_async()
        .await;

    let api = Arc::new(JupiterApi::new(&server.url(), Duration::from_secs(5)).unwrap());
    let ledger = Arc::new(MockLedger::new());
    let coordinator = BatchCoordinator::new(api, ledger.clone(), fast_settings());

    let summary = coordinator
        .run(&agents(1), Pubkey::new_unique(), &mut |_: &ProgressReport| {})
        .await
        .unwrap();

    assert_eq!(summary.tally.error, 1);
    assert_eq!(summary.tally.rate_limited, 0);
    assert!(ledger.submitted().is_empty());
    quote.assert_async().await;
}
