mod common;

use common::*;
use ethers::signers::Signer;
use ethers::types::U256;
use learnchain_backend::config::HealthConfig;
use learnchain_backend::errors::{HealthIssue, PipelineError};
use learnchain_backend::health::NetworkHealthMonitor;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn monitor(chain: Arc<MockChain>) -> NetworkHealthMonitor {
    NetworkHealthMonitor::new(chain, signer().address(), HealthConfig::default())
}

#[tokio::test]
async fn reports_a_healthy_network() {
    let report = monitor(MockChain::new()).check_health().await.unwrap();

    assert_eq!(report.block_number, 100);
    assert!((report.gas_price_gwei - 12.0).abs() < 1e-9);
    assert!((report.balance_eth - 1.0).abs() < 1e-9);
    assert!(report.sufficient_balance);
    assert!(!report.congested);
    assert!(report.healthy);
}

#[tokio::test]
async fn thresholds_are_inclusive_of_the_limits() {
    let chain = MockChain::with(|s| {
        s.balance = U256::exp10(16);
        s.gas_prices = vec![gwei(50)];
    });
    let report = monitor(chain).check_health().await.unwrap();
    assert!(report.sufficient_balance);
    assert!(!report.congested);

    let chain = MockChain::with(|s| s.gas_prices = vec![gwei(50) + 1]);
    assert!(monitor(chain).check_health().await.unwrap().congested);
}

#[tokio::test]
async fn low_balance_is_unhealthy_even_on_a_quiet_network() {
    let chain = MockChain::with(|s| {
        s.balance = U256::exp10(16) - 1;
        s.gas_prices = vec![gwei(1)];
    });
    let report = monitor(chain).check_health().await.unwrap();

    assert!(!report.congested);
    assert!(!report.sufficient_balance);
    assert!(!report.healthy);
}

#[tokio::test(start_paused = true)]
async fn low_balance_fails_without_waiting() {
    let chain = MockChain::with(|s| {
        s.balance = U256::exp10(15);
        s.gas_prices = vec![gwei(90)];
    });
    let started = Instant::now();

    let err = monitor(chain).preflight().await.unwrap_err();

    assert!(matches!(err, PipelineError::NetworkUnhealthy(HealthIssue::InsufficientBalance { .. })));
    assert!(!err.is_retryable());
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn persistent_congestion_gives_up_after_three_waits() {
    let chain = MockChain::with(|s| s.gas_prices = vec![gwei(80)]);
    let started = Instant::now();

    let err = monitor(chain).preflight().await.unwrap_err();

    match &err {
        PipelineError::NetworkUnhealthy(HealthIssue::Congested { gas_price_gwei }) => {
            assert!(gas_price_gwei.starts_with("80"));
        }
        other => panic!("expected congestion, got {other:?}"),
    }
    assert!(err.is_retryable());
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(45) && waited < Duration::from_secs(46));
}

#[tokio::test(start_paused = true)]
async fn preflight_proceeds_once_congestion_clears() {
    let chain = MockChain::with(|s| s.gas_prices = vec![gwei(80), gwei(75), gwei(20)]);
    let started = Instant::now();

    let report = monitor(chain).preflight().await.unwrap();

    assert!(report.healthy);
    assert_eq!(report.gas_price_wei, gwei(20));
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(30) && waited < Duration::from_secs(31));
}
