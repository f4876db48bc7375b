use std::sync::Arc;

use crate::domain::transfer::Transfer;
use crate::domain::types::{Block, Currency, DecodedTransfer, Receipt, Transaction};
use crate::error::Result;

/// Read-only view of a chain node plus the chain-specific rules for what
/// counts as a transfer.
#[async_trait::async_trait]
pub trait ChainClient: Send + Sync {
    async fn latest_height(&self) -> Result<u64>;
    async fn get_block(&self, number: u64) -> Result<Option<Block>>;
    async fn get_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>>;

    fn is_valid_native_transfer(&self, tx: &Transaction) -> bool;
    fn is_valid_token_transfer(&self, receipt: &Receipt) -> bool;

    /// Normalized addresses that receive value in `transfer`.
    fn destination_addresses(&self, transfer: &Transfer) -> Vec<String>;
    fn normalize_address(&self, address: &str) -> String;
    fn normalize_txid(&self, hash: &str) -> String;

    /// Entries of `transfer` paid to `address` in `currency`, with amounts
    /// already scaled to the currency's units.
    fn decode_entries(
        &self,
        transfer: &Transfer,
        block: &Block,
        address: &str,
        currency: &Currency,
    ) -> Result<DecodedTransfer>;
}

#[async_trait::async_trait]
impl<T: ChainClient + ?Sized> ChainClient for Arc<T> {
    async fn latest_height(&self) -> Result<u64> {
        (**self).latest_height().await
    }

    async fn get_block(&self, number: u64) -> Result<Option<Block>> {
        (**self).get_block(number).await
    }

    async fn get_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>> {
        (**self).get_receipt(tx_hash).await
    }

    fn is_valid_native_transfer(&self, tx: &Transaction) -> bool {
        (**self).is_valid_native_transfer(tx)
    }

    fn is_valid_token_transfer(&self, receipt: &Receipt) -> bool {
        (**self).is_valid_token_transfer(receipt)
    }

    fn destination_addresses(&self, transfer: &Transfer) -> Vec<String> {
        (**self).destination_addresses(transfer)
    }

    fn normalize_address(&self, address: &str) -> String {
        (**self).normalize_address(address)
    }

    fn normalize_txid(&self, hash: &str) -> String {
        (**self).normalize_txid(hash)
    }

    fn decode_entries(
        &self,
        transfer: &Transfer,
        block: &Block,
        address: &str,
        currency: &Currency,
    ) -> Result<DecodedTransfer> {
        (**self).decode_entries(transfer, block, address, currency)
    }
}
