use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::types::{
    BlockCommit, CommitOutcome, CurrencyId, PaymentAddress, Watermark, WithdrawalIntent,
};
use crate::error::Result;

#[async_trait::async_trait]
pub trait AddressIndex: Send + Sync {
    /// Every payment address registered under `address`, one per currency.
    async fn lookup_by_address(&self, address: &str) -> Result<Vec<PaymentAddress>>;
    async fn deposit_addresses(&self) -> Result<HashSet<String>>;
    async fn contract_addresses(&self) -> Result<HashSet<String>>;
}

#[async_trait::async_trait]
pub trait WithdrawalStore: Send + Sync {
    /// Outstanding (non-terminal) intents bound to `txid`.
    async fn find_by_currencies_and_txid(
        &self,
        currencies: &[CurrencyId],
        txid: &str,
    ) -> Result<Vec<WithdrawalIntent>>;
    async fn mark_failed(&self, intent: &WithdrawalIntent) -> Result<()>;
}

/// Owner of the per-chain watermark. A commit applies every record of one
/// block and the watermark advance together, or nothing.
#[async_trait::async_trait]
pub trait LedgerSink: Send + Sync {
    async fn watermark(&self, chain: &str) -> Result<Watermark>;
    async fn commit_block(&self, chain: &str, commit: BlockCommit) -> Result<CommitOutcome>;
}

#[async_trait::async_trait]
impl<T: AddressIndex + ?Sized> AddressIndex for Arc<T> {
    async fn lookup_by_address(&self, address: &str) -> Result<Vec<PaymentAddress>> {
        (**self).lookup_by_address(address).await
    }

    async fn deposit_addresses(&self) -> Result<HashSet<String>> {
        (**self).deposit_addresses().await
    }

    async fn contract_addresses(&self) -> Result<HashSet<String>> {
        (**self).contract_addresses().await
    }
}

#[async_trait::async_trait]
impl<T: WithdrawalStore + ?Sized> WithdrawalStore for Arc<T> {
    async fn find_by_currencies_and_txid(
        &self,
        currencies: &[CurrencyId],
        txid: &str,
    ) -> Result<Vec<WithdrawalIntent>> {
        (**self).find_by_currencies_and_txid(currencies, txid).await
    }

    async fn mark_failed(&self, intent: &WithdrawalIntent) -> Result<()> {
        (**self).mark_failed(intent).await
    }
}

#[async_trait::async_trait]
impl<T: LedgerSink + ?Sized> LedgerSink for Arc<T> {
    async fn watermark(&self, chain: &str) -> Result<Watermark> {
        (**self).watermark(chain).await
    }

    async fn commit_block(&self, chain: &str, commit: BlockCommit) -> Result<CommitOutcome> {
        (**self).commit_block(chain, commit).await
    }
}
