//! Chain adapter seam
//!
//! The worker never talks to a chain client directly; it dispatches through
//! this trait. Concrete adapters own the contract call details (which are
//! out of scope here) and the required confirmation depth.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use super::error::ChainOpError;
use super::types::OpPayload;

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Submit one operation, returning the transaction hash.
    /// Must be called at most once per recorded tx hash - the worker
    /// guarantees it never resubmits an op that already carries one.
    async fn submit(&self, payload: &OpPayload) -> Result<String, ChainOpError>;

    /// Whether the transaction has reached the adapter's required
    /// confirmation depth
    async fn is_confirmed(&self, tx_hash: &str) -> Result<bool, ChainOpError>;
}

/// Scriptable adapter for tests
pub struct MockChainAdapter {
    submissions: Mutex<Vec<OpPayload>>,
    confirmed: Mutex<HashSet<String>>,
    /// Fail this many submits before succeeding
    fail_submits: AtomicU32,
    /// Fail this many confirmation checks before succeeding
    fail_confirms: AtomicU32,
    /// Confirm submitted txs immediately
    auto_confirm: bool,
    counter: AtomicU32,
}

impl MockChainAdapter {
    pub fn new() -> Self {
        Self {
            submissions: Mutex::new(Vec::new()),
            confirmed: Mutex::new(HashSet::new()),
            fail_submits: AtomicU32::new(0),
            fail_confirms: AtomicU32::new(0),
            auto_confirm: true,
            counter: AtomicU32::new(0),
        }
    }

    /// Adapter whose submitted txs never confirm (timeout paths)
    pub fn without_auto_confirm() -> Self {
        Self {
            auto_confirm: false,
            ..Self::new()
        }
    }

    pub fn fail_next_submits(&self, count: u32) {
        self.fail_submits.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_confirms(&self, count: u32) {
        self.fail_confirms.store(count, Ordering::SeqCst);
    }

    /// Pre-mark a hash as confirmed (simulates a tx found on-chain)
    pub fn mark_confirmed(&self, tx_hash: &str) {
        self.confirmed
            .lock()
            .expect("confirmed lock poisoned")
            .insert(tx_hash.to_string());
    }

    pub fn submissions(&self) -> Vec<OpPayload> {
        self.submissions
            .lock()
            .expect("submissions lock poisoned")
            .clone()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions
            .lock()
            .expect("submissions lock poisoned")
            .len()
    }
}

impl Default for MockChainAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainAdapter for MockChainAdapter {
    async fn submit(&self, payload: &OpPayload) -> Result<String, ChainOpError> {
        if self
            .fail_submits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ChainOpError::Submit("rpc unavailable".to_string()));
        }

        self.submissions
            .lock()
            .expect("submissions lock poisoned")
            .push(payload.clone());

        let tx_hash = format!("0xmock{:08x}", self.counter.fetch_add(1, Ordering::SeqCst));
        if self.auto_confirm {
            self.mark_confirmed(&tx_hash);
        }
        Ok(tx_hash)
    }

    async fn is_confirmed(&self, tx_hash: &str) -> Result<bool, ChainOpError> {
        if self
            .fail_confirms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ChainOpError::Confirmation("rpc unavailable".to_string()));
        }

        Ok(self
            .confirmed
            .lock()
            .expect("confirmed lock poisoned")
            .contains(tx_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn burn() -> OpPayload {
        OpPayload::Burn {
            token: "0xT0K".to_string(),
            wallet: "0xW4LL".to_string(),
            amount: Decimal::ONE,
        }
    }

    #[tokio::test]
    async fn test_mock_adapter_submit_and_confirm() {
        let adapter = MockChainAdapter::new();
        let tx = adapter.submit(&burn()).await.unwrap();
        assert!(adapter.is_confirmed(&tx).await.unwrap());
        assert_eq!(adapter.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_adapter_scripted_failures() {
        let adapter = MockChainAdapter::new();
        adapter.fail_next_submits(2);

        assert!(adapter.submit(&burn()).await.is_err());
        assert!(adapter.submit(&burn()).await.is_err());
        assert!(adapter.submit(&burn()).await.is_ok());
        assert_eq!(adapter.submission_count(), 1);
    }
}
