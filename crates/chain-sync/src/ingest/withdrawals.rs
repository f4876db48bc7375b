use tracing::{debug, error, warn};

use crate::client::traits::ChainClient;
use crate::domain::transfer::{Classified, Transfer};
use crate::domain::types::{Block, Currency, CurrencyId, Transaction, WithdrawalConfirmation, WithdrawalIntent};
use crate::error::{Error, Result};
use crate::ingest::classify::classify;
use crate::metrics::counters::SyncCounters;
use crate::store::traits::WithdrawalStore;

/// Matches a block's transactions against outstanding withdrawal intents.
/// An intent whose transaction turns out invalid is failed on the spot.
pub struct WithdrawalReconciler<'a, C: ?Sized, W: ?Sized> {
    pub client: &'a C,
    pub store: &'a W,
    pub currencies: &'a [Currency],
    pub counters: &'a SyncCounters,
}

impl<C, W> WithdrawalReconciler<'_, C, W>
where
    C: ChainClient + ?Sized,
    W: WithdrawalStore + ?Sized,
{
    pub async fn reconcile(&self, block: &Block) -> Result<Vec<WithdrawalConfirmation>> {
        let ids = self.currency_ids();
        let mut out = Vec::new();
        for tx in &block.transactions {
            let intents = self.outstanding(&ids, tx).await?;
            if intents.is_empty() {
                continue;
            }
            let classified = classify(self.client, tx).await?;
            self.apply(block, tx, &classified, intents, &mut out).await?;
        }
        Ok(out)
    }

    pub async fn reconcile_classified(
        &self,
        block: &Block,
        classified: &[Classified],
    ) -> Result<Vec<WithdrawalConfirmation>> {
        let ids = self.currency_ids();
        let mut out = Vec::new();
        for (tx, classified) in block.transactions.iter().zip(classified) {
            let intents = self.outstanding(&ids, tx).await?;
            self.apply(block, tx, classified, intents, &mut out).await?;
        }
        Ok(out)
    }

    fn currency_ids(&self) -> Vec<CurrencyId> {
        self.currencies.iter().map(|c| c.id.clone()).collect()
    }

    async fn outstanding(&self, ids: &[CurrencyId], tx: &Transaction) -> Result<Vec<WithdrawalIntent>> {
        let txid = self.client.normalize_txid(&tx.hash);
        self.store.find_by_currencies_and_txid(ids, &txid).await
    }

    async fn apply(
        &self,
        block: &Block,
        tx: &Transaction,
        classified: &Classified,
        intents: Vec<WithdrawalIntent>,
        out: &mut Vec<WithdrawalConfirmation>,
    ) -> Result<()> {
        for intent in intents {
            let transfer = match classified {
                Classified::Valid(transfer) => transfer,
                Classified::Invalid(reason) => {
                    warn!(
                        intent = intent.id,
                        txid = %tx.hash,
                        reason = reason.as_str(),
                        "withdrawal transaction invalid, failing intent"
                    );
                    self.store.mark_failed(&intent).await?;
                    self.counters.inc_withdrawal_failed();
                    continue;
                }
            };
            let Some(currency) = self.currencies.iter().find(|c| c.id == intent.currency) else {
                continue;
            };
            let found = self
                .confirmations_for(transfer, block, &intent, currency)
                .inspect_err(|e| {
                    if let Error::Decode(reason) = e {
                        self.counters.inc_undecodable();
                        error!(intent = intent.id, txid = %tx.hash, %reason, "withdrawal transfer is undecodable");
                    }
                })?;
            debug!(intent = intent.id, entries = found.len(), "withdrawal observed on chain");
            out.extend(found);
        }
        Ok(())
    }

    fn confirmations_for(
        &self,
        transfer: &Transfer,
        block: &Block,
        intent: &WithdrawalIntent,
        currency: &Currency,
    ) -> Result<Vec<WithdrawalConfirmation>> {
        let decoded = self
            .client
            .decode_entries(transfer, block, &intent.rid, currency)?;
        Ok(decoded
            .entries
            .into_iter()
            .map(|entry| WithdrawalConfirmation {
                intent_id: intent.id,
                txid: decoded.txid.clone(),
                rid: entry.address,
                amount: entry.amount,
                block_number: decoded.block_number,
            })
            .collect())
    }
}
