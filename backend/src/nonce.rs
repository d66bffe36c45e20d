use crate::chain::ChainClient;
use crate::errors::ChainError;
use ethers::types::{Address, U256};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct AccountNonces {
    next: U256,
    /// Issued but never broadcast, below `next`.
    released: BTreeSet<U256>,
}

/// Issues transaction nonces per signing account.
///
/// Allocation holds the lock across the pending-count query, so two concurrent callers
/// can never observe the same `next` value. Nonces handed back out of order are reissued
/// lowest first, so a failed submission never leaves a hole behind later ones.
#[derive(Debug, Default)]
pub struct NonceManager {
    accounts: Mutex<HashMap<Address, AccountNonces>>,
}

impl NonceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a nonce: the lowest released one still ahead of the chain, otherwise
    /// `max(local next, chain pending count)`.
    pub async fn allocate(&self, chain: &dyn ChainClient, account: Address) -> Result<U256, ChainError> {
        let mut accounts = self.accounts.lock().await;
        let pending = chain.pending_nonce(account).await?;
        let entry = accounts.entry(account).or_default();

        entry.released = entry.released.split_off(&pending);
        if let Some(nonce) = entry.released.pop_first() {
            debug!(%account, %nonce, %pending, "released nonce reissued");
            return Ok(nonce);
        }

        let local = entry.next;
        let nonce = local.max(pending);
        entry.next = nonce + 1;

        debug!(%account, %nonce, %pending, %local, "nonce allocated");
        Ok(nonce)
    }

    /// Hand back a nonce that never reached the mempool. `false` if it was never issued.
    pub async fn release(&self, account: Address, nonce: U256) -> bool {
        let mut accounts = self.accounts.lock().await;
        let Some(entry) = accounts.get_mut(&account) else { return false };
        if nonce >= entry.next {
            return false;
        }

        entry.released.insert(nonce);
        while !entry.next.is_zero() && entry.released.remove(&(entry.next - 1)) {
            entry.next -= U256::one();
        }
        debug!(%account, %nonce, next = %entry.next, "nonce released");
        true
    }

    pub async fn peek(&self, account: Address) -> Option<U256> {
        self.accounts.lock().await.get(&account).map(|a| a.next)
    }
}
