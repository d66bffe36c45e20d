//! Signed transaction submission with nonce control, fee escalation and receipt tracking.
//!
//! One submission owns one nonce. Every retry re-signs that nonce with higher fees, so a
//! retry replaces the stuck transaction instead of queueing behind it. All hashes sent
//! for the nonce are watched, since any of them may be the one that gets mined.

use crate::chain::{abi, ChainClient, ReceiptInfo, SignedTransaction};
use crate::config::SubmitConfig;
use crate::errors::{ChainError, PipelineError};
use crate::gas::{GasParams, GasPolicy};
use crate::health::NetworkHealthMonitor;
use crate::nonce::NonceManager;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Eip1559TransactionRequest, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmissionState {
    Building,
    GasEstimating,
    Signing,
    Broadcasting,
    AwaitingReceipt,
    Confirmed,
    Reverted,
    TimedOut,
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubmissionState::Building => "building",
            SubmissionState::GasEstimating => "gas_estimating",
            SubmissionState::Signing => "signing",
            SubmissionState::Broadcasting => "broadcasting",
            SubmissionState::AwaitingReceipt => "awaiting_receipt",
            SubmissionState::Confirmed => "confirmed",
            SubmissionState::Reverted => "reverted",
            SubmissionState::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

/// Final report of one submission.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutcome {
    pub success: bool,
    pub tx_hash: Option<H256>,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
    pub nonce: Option<U256>,
    pub attempts: u32,
    pub token_id: Option<U256>,
    pub proof_hash: Option<H256>,
    pub error: Option<String>,
}

impl TransactionOutcome {
    pub fn from_error(e: &PipelineError) -> Self {
        Self { success: false, tx_hash: e.tx_hash(), error: Some(e.to_string()), ..Self::default() }
    }
}

pub struct TransactionSubmitter {
    chain: Arc<dyn ChainClient>,
    wallet: LocalWallet,
    nonces: Arc<NonceManager>,
    health: Arc<NetworkHealthMonitor>,
    gas: GasPolicy,
    config: SubmitConfig,
}

impl TransactionSubmitter {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        wallet: LocalWallet,
        nonces: Arc<NonceManager>,
        health: Arc<NetworkHealthMonitor>,
        config: SubmitConfig,
    ) -> Self {
        let gas = GasPolicy::default().with_gas_limit_multiplier(config.gas_limit_multiplier);
        Self { chain, wallet, nonces, health, gas, config }
    }

    pub fn account(&self) -> Address {
        self.wallet.address()
    }

    fn transition(&self, state: SubmissionState, attempt: u32, nonce: U256) {
        debug!(%state, attempt, %nonce, "submission state");
    }

    pub async fn submit(&self, to: Address, calldata: Bytes) -> Result<TransactionOutcome, PipelineError> {
        self.health.preflight().await?;

        let account = self.account();
        // A call that would revert fails here, before it can hold a nonce.
        let gas_limit = self.estimate_gas_limit(to, &calldata).await?;
        let nonce = self.nonces.allocate(self.chain.as_ref(), account).await?;
        info!(%account, %to, %nonce, %gas_limit, "submission started");

        let mut sent: Vec<H256> = Vec::new();

        for attempt in 0..self.config.max_attempts {
            match self.attempt(to, &calldata, nonce, attempt, gas_limit, &mut sent).await {
                Ok(Some(receipt)) if receipt.success => {
                    self.transition(SubmissionState::Confirmed, attempt, nonce);
                    let events = abi::parse_mint_events(to, &receipt.logs);
                    info!(
                        tx_hash = ?receipt.tx_hash,
                        block = receipt.block_number,
                        gas_used = %receipt.gas_used,
                        attempts = attempt + 1,
                        "transaction confirmed"
                    );
                    return Ok(TransactionOutcome {
                        success: true,
                        tx_hash: Some(receipt.tx_hash),
                        block_number: Some(receipt.block_number),
                        gas_used: Some(receipt.gas_used),
                        nonce: Some(nonce),
                        attempts: attempt + 1,
                        token_id: events.token_id,
                        proof_hash: events.proof_hash,
                        error: None,
                    });
                }
                Ok(Some(receipt)) => {
                    self.transition(SubmissionState::Reverted, attempt, nonce);
                    warn!(tx_hash = ?receipt.tx_hash, block = receipt.block_number, "transaction reverted");
                    return Err(PipelineError::TransactionReverted {
                        tx_hash: receipt.tx_hash,
                        block_number: receipt.block_number,
                    });
                }
                Ok(None) => {
                    self.transition(SubmissionState::TimedOut, attempt, nonce);
                    warn!(attempt, %nonce, "no receipt in time, escalating fees");
                }
                Err(e) if e.is_transient() => {
                    warn!(attempt, %nonce, error = %e, "attempt failed, retrying");
                    tokio::time::sleep(self.config.receipt_poll).await;
                }
                Err(e) => {
                    warn!(attempt, %nonce, error = %e, "submission aborted");
                    if sent.is_empty() {
                        self.nonces.release(account, nonce).await;
                    }
                    return Err(e.into());
                }
            }
        }

        if sent.is_empty() {
            self.nonces.release(account, nonce).await;
        }
        Err(PipelineError::TransactionTimeout { attempts: self.config.max_attempts, last_tx_hash: sent.last().copied() })
    }

    async fn attempt(
        &self,
        to: Address,
        calldata: &Bytes,
        nonce: U256,
        attempt: u32,
        limit: U256,
        sent: &mut Vec<H256>,
    ) -> Result<Option<ReceiptInfo>, ChainError> {
        self.transition(SubmissionState::Building, attempt, nonce);
        let mut request = self.request(to, calldata).nonce(nonce);

        let fees = self.chain.fee_snapshot().await?;
        let gas = self.gas.params(attempt, fees.base_fee, fees.priority_fee);
        request = request
            .gas(limit)
            .max_fee_per_gas(gas.max_fee_per_gas)
            .max_priority_fee_per_gas(gas.max_priority_fee_per_gas);
        info!(
            attempt,
            %nonce,
            base_fee = %fees.base_fee,
            max_fee = %gas.max_fee_per_gas,
            priority_fee = %gas.max_priority_fee_per_gas,
            gas_limit = %limit,
            "gas parameters"
        );

        self.transition(SubmissionState::Signing, attempt, nonce);
        let signed = self.sign(request.into(), to, calldata, nonce, limit, gas)?;

        self.transition(SubmissionState::Broadcasting, attempt, nonce);
        match self.chain.broadcast(&signed).await {
            Ok(hash) => {
                info!(tx_hash = ?hash, attempt, %nonce, "transaction broadcast");
                sent.push(hash);
            }
            Err(e) if sent.is_empty() => return Err(e),
            Err(e) => warn!(attempt, error = %e, "replacement broadcast failed, watching earlier hashes"),
        }

        self.transition(SubmissionState::AwaitingReceipt, attempt, nonce);
        Ok(self.await_receipt(sent).await)
    }

    fn request(&self, to: Address, calldata: &Bytes) -> Eip1559TransactionRequest {
        Eip1559TransactionRequest::new()
            .from(self.account())
            .to(to)
            .data(calldata.clone())
            .chain_id(self.wallet.chain_id())
    }

    /// Dry-run the call and scale the estimate into a gas limit.
    async fn estimate_gas_limit(&self, to: Address, calldata: &Bytes) -> Result<U256, ChainError> {
        debug!(state = %SubmissionState::GasEstimating, "submission state");
        let probe: TypedTransaction = self.request(to, calldata).into();
        let estimate = self.chain.estimate_gas(&probe).await?;
        Ok(self.gas.gas_limit(estimate))
    }

    fn sign(
        &self,
        tx: TypedTransaction,
        to: Address,
        calldata: &Bytes,
        nonce: U256,
        gas_limit: U256,
        gas: GasParams,
    ) -> Result<SignedTransaction, ChainError> {
        let signature = self.wallet.sign_transaction_sync(&tx).map_err(|e| ChainError::Signing(e.to_string()))?;
        let raw = tx.rlp_signed(&signature);
        let hash = H256::from(keccak256(&raw));

        Ok(SignedTransaction {
            raw,
            hash,
            to,
            data: calldata.clone(),
            nonce,
            gas_limit,
            max_fee_per_gas: gas.max_fee_per_gas,
            max_priority_fee_per_gas: gas.max_priority_fee_per_gas,
        })
    }

    /// Poll every hash sent for this nonce until one has a receipt or the window closes.
    async fn await_receipt(&self, sent: &[H256]) -> Option<ReceiptInfo> {
        let deadline = Instant::now() + self.config.receipt_timeout;
        loop {
            for hash in sent.iter().rev() {
                match self.chain.receipt(*hash).await {
                    Ok(Some(receipt)) => return Some(receipt),
                    Ok(None) => {}
                    Err(e) => debug!(tx_hash = ?hash, error = %e, "receipt poll failed"),
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(self.config.receipt_poll).await;
        }
    }
}
