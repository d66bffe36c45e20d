use crate::chain::ChainClient;
use crate::config::HealthConfig;
use crate::errors::{HealthIssue, PipelineError};
use ethers::types::{Address, U256};
use ethers::utils::format_units;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub block_number: u64,
    pub gas_price_gwei: f64,
    pub balance_eth: f64,
    pub sufficient_balance: bool,
    pub congested: bool,
    pub healthy: bool,
    #[serde(skip)]
    pub gas_price_wei: U256,
    #[serde(skip)]
    pub balance_wei: U256,
}

fn display_units(value: U256, unit: &str) -> f64 {
    format_units(value, unit).ok().and_then(|s| s.parse().ok()).unwrap_or(f64::NAN)
}

/// Gates submissions on signer balance and network congestion.
pub struct NetworkHealthMonitor {
    chain: Arc<dyn ChainClient>,
    account: Address,
    config: HealthConfig,
}

impl NetworkHealthMonitor {
    pub fn new(chain: Arc<dyn ChainClient>, account: Address, config: HealthConfig) -> Self {
        Self { chain, account, config }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub async fn check_health(&self) -> Result<HealthReport, PipelineError> {
        let (block_number, gas_price, balance) = tokio::try_join!(
            self.chain.block_number(),
            self.chain.gas_price(),
            self.chain.balance(self.account),
        )?;

        let sufficient_balance = balance >= self.config.min_balance_wei;
        let congested = gas_price > self.config.congestion_gas_price_wei;

        Ok(HealthReport {
            block_number,
            gas_price_gwei: display_units(gas_price, "gwei"),
            balance_eth: display_units(balance, "ether"),
            sufficient_balance,
            congested,
            healthy: sufficient_balance && !congested,
            gas_price_wei: gas_price,
            balance_wei: balance,
        })
    }

    /// Block until the network is fit for a submission.
    ///
    /// Low balance fails at once. Congestion is rechecked after a backoff, a bounded
    /// number of times, before giving up.
    pub async fn preflight(&self) -> Result<HealthReport, PipelineError> {
        let mut waits = 0;
        loop {
            let report = self.check_health().await?;

            if !report.sufficient_balance {
                warn!(account = %self.account, balance_eth = report.balance_eth, "signer balance too low");
                return Err(HealthIssue::InsufficientBalance {
                    balance_eth: format_units(report.balance_wei, "ether").unwrap_or_default(),
                    required_eth: format_units(self.config.min_balance_wei, "ether").unwrap_or_default(),
                }
                .into());
            }

            if !report.congested {
                return Ok(report);
            }

            if waits >= self.config.congestion_waits {
                warn!(gas_price_gwei = report.gas_price_gwei, waits, "network still congested, giving up");
                return Err(HealthIssue::Congested {
                    gas_price_gwei: format_units(report.gas_price_wei, "gwei").unwrap_or_default(),
                }
                .into());
            }

            waits += 1;
            info!(
                gas_price_gwei = report.gas_price_gwei,
                wait = waits,
                backoff_secs = self.config.congestion_backoff.as_secs(),
                "network congested, waiting"
            );
            tokio::time::sleep(self.config.congestion_backoff).await;
        }
    }
}
