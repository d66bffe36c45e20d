//! Chain access boundary.
//!
//! Everything above this module talks to the node through [`ChainClient`], so the
//! submitter, health monitor and verifier run unchanged against a real JSON-RPC endpoint
//! or an in-memory chain in tests.

pub mod abi;
pub mod rpc;

use crate::errors::ChainError;
use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Log, H256, U256};

pub use rpc::EthersChain;

/// Fee inputs for one EIP-1559 pricing decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeSnapshot {
    pub base_fee: U256,
    pub priority_fee: U256,
}

/// A fully signed transaction, ready for `eth_sendRawTransaction`.
#[derive(Clone, Debug)]
pub struct SignedTransaction {
    pub raw: Bytes,
    pub hash: H256,
    pub to: Address,
    pub data: Bytes,
    pub nonce: U256,
    pub gas_limit: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

#[derive(Clone, Debug)]
pub struct ReceiptInfo {
    pub tx_hash: H256,
    pub success: bool,
    pub block_number: u64,
    pub gas_used: U256,
    pub logs: Vec<Log>,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// Latest base fee and the node's suggested priority fee.
    async fn fee_snapshot(&self) -> Result<FeeSnapshot, ChainError>;

    async fn gas_price(&self) -> Result<U256, ChainError>;

    async fn balance(&self, account: Address) -> Result<U256, ChainError>;

    /// Transaction count including the pending pool.
    async fn pending_nonce(&self, account: Address) -> Result<U256, ChainError>;

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, ChainError>;

    async fn broadcast(&self, tx: &SignedTransaction) -> Result<H256, ChainError>;

    async fn receipt(&self, tx_hash: H256) -> Result<Option<ReceiptInfo>, ChainError>;

    /// Read-only `eth_call` against the latest block.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;
}
