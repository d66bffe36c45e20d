use super::{ChainClient, FeeSnapshot, ReceiptInfo, SignedTransaction};
use crate::errors::ChainError;
use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, ProviderError};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockId, BlockNumber, Bytes, TransactionRequest, H256, U256};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Used when the node does not implement `eth_maxPriorityFeePerGas`.
const FALLBACK_PRIORITY_FEE_WEI: u64 = 1_500_000_000;

/// JSON-RPC client over HTTP; every call is bounded by `timeout`.
#[derive(Clone, Debug)]
pub struct EthersChain {
    provider: Provider<Http>,
    timeout: Duration,
}

fn classify(e: ProviderError) -> ChainError {
    let msg = e.to_string();
    if msg.to_ascii_lowercase().contains("revert") {
        ChainError::ExecutionReverted(msg)
    } else {
        ChainError::Rpc(msg)
    }
}

impl EthersChain {
    pub fn connect(rpc_url: &str, timeout: Duration) -> Result<Self, ChainError> {
        let provider = Provider::<Http>::try_from(rpc_url).map_err(|e| ChainError::Rpc(format!("bad RPC url: {e}")))?;
        Ok(Self { provider, timeout })
    }

    async fn timed<T, F>(&self, method: &'static str, fut: F) -> Result<T, ChainError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => {
                warn!(method, error = %e, "rpc call failed");
                Err(classify(e))
            }
            Err(_) => {
                warn!(method, timeout_secs = self.timeout.as_secs(), "rpc call timed out");
                Err(ChainError::Timeout(method))
            }
        }
    }
}

#[async_trait]
impl ChainClient for EthersChain {
    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self.timed("eth_blockNumber", self.provider.get_block_number()).await?.as_u64())
    }

    async fn fee_snapshot(&self) -> Result<FeeSnapshot, ChainError> {
        let block = self
            .timed("eth_getBlockByNumber", self.provider.get_block(BlockNumber::Latest))
            .await?
            .ok_or_else(|| ChainError::Decode("latest block missing".to_string()))?;

        let base_fee = match block.base_fee_per_gas {
            Some(fee) => fee,
            // Pre-London chains: price off the legacy gas price.
            None => self.gas_price().await?,
        };

        let priority_fee = match self
            .timed(
                "eth_maxPriorityFeePerGas",
                self.provider.request::<_, U256>("eth_maxPriorityFeePerGas", ()),
            )
            .await
        {
            Ok(fee) => fee,
            Err(e) => {
                debug!(error = %e, "falling back to default priority fee");
                U256::from(FALLBACK_PRIORITY_FEE_WEI)
            }
        };

        Ok(FeeSnapshot { base_fee, priority_fee })
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        self.timed("eth_gasPrice", self.provider.get_gas_price()).await
    }

    async fn balance(&self, account: Address) -> Result<U256, ChainError> {
        self.timed("eth_getBalance", self.provider.get_balance(account, None)).await
    }

    async fn pending_nonce(&self, account: Address) -> Result<U256, ChainError> {
        let pending: BlockId = BlockNumber::Pending.into();
        self.timed(
            "eth_getTransactionCount",
            self.provider.get_transaction_count(account, Some(pending)),
        )
        .await
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, ChainError> {
        self.timed("eth_estimateGas", self.provider.estimate_gas(tx, None)).await
    }

    async fn broadcast(&self, tx: &SignedTransaction) -> Result<H256, ChainError> {
        let sent = self
            .timed(
                "eth_sendRawTransaction",
                self.provider.request::<_, H256>("eth_sendRawTransaction", [tx.raw.clone()]),
            )
            .await;

        match sent {
            Ok(hash) => Ok(hash),
            // A rebroadcast of an identical payload is not a failure.
            Err(ChainError::Rpc(msg)) if msg.contains("already known") => Ok(tx.hash),
            Err(e) => Err(e),
        }
    }

    async fn receipt(&self, tx_hash: H256) -> Result<Option<ReceiptInfo>, ChainError> {
        let receipt = self
            .timed("eth_getTransactionReceipt", self.provider.get_transaction_receipt(tx_hash))
            .await?;

        Ok(receipt.map(|r| ReceiptInfo {
            tx_hash: r.transaction_hash,
            success: r.status.map(|s| s.as_u64() == 1).unwrap_or(false),
            block_number: r.block_number.map(|b| b.as_u64()).unwrap_or_default(),
            gas_used: r.gas_used.unwrap_or_default(),
            logs: r.logs,
        }))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.timed("eth_call", self.provider.call(&tx, None)).await
    }
}
