use futures::{StreamExt, TryStreamExt, stream};

use crate::client::traits::ChainClient;
use crate::domain::transfer::{Classified, InvalidReason, Transfer};
use crate::domain::types::{Block, Transaction, TxKind};
use crate::error::Result;

/// Applies the validity predicate for `tx`'s kind. Contract calls are judged
/// by their receipt; a receipt the node does not have is invalid.
pub async fn classify<C: ChainClient + ?Sized>(client: &C, tx: &Transaction) -> Result<Classified> {
    match tx.kind() {
        TxKind::Native => {
            if client.is_valid_native_transfer(tx) {
                Ok(Classified::Valid(Transfer::Native(tx.clone())))
            } else {
                Ok(Classified::Invalid(InvalidReason::NativeRejected))
            }
        }
        TxKind::ContractCall => match client.get_receipt(&tx.hash).await? {
            None => Ok(Classified::Invalid(InvalidReason::ReceiptMissing)),
            Some(receipt) if !client.is_valid_token_transfer(&receipt) => {
                Ok(Classified::Invalid(InvalidReason::TokenRejected))
            }
            Some(receipt) => Ok(Classified::Valid(Transfer::Token {
                transaction: tx.clone(),
                receipt,
            })),
        },
    }
}

/// Classifies every transaction of `block`, in order, with up to `depth`
/// receipt fetches in flight.
pub async fn classify_block<C: ChainClient + ?Sized>(
    client: &C,
    block: &Block,
    depth: usize,
) -> Result<Vec<Classified>> {
    stream::iter(block.transactions.iter())
        .map(|tx| classify(client, tx))
        .buffered(depth.max(1))
        .try_collect()
        .await
}
