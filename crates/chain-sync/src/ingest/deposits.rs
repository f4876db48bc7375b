use tracing::{debug, error, info};

use crate::client::traits::ChainClient;
use crate::domain::transfer::{Classified, Transfer};
use crate::domain::types::{Block, Currency, DepositCandidate, Transaction};
use crate::error::{Error, Result};
use crate::ingest::classify::classify;
use crate::metrics::counters::SyncCounters;
use crate::store::traits::AddressIndex;

/// Turns a block's transfers into deposits for known payment addresses.
pub struct DepositExtractor<'a, C: ?Sized, A: ?Sized> {
    pub client: &'a C,
    pub index: &'a A,
    pub currencies: &'a [Currency],
    pub counters: &'a SyncCounters,
}

impl<C, A> DepositExtractor<'_, C, A>
where
    C: ChainClient + ?Sized,
    A: AddressIndex + ?Sized,
{
    pub async fn extract(&self, block: &Block) -> Result<Vec<DepositCandidate>> {
        let mut deposits = Vec::new();
        for tx in &block.transactions {
            let classified = classify(self.client, tx).await?;
            self.extract_transaction(block, tx, &classified, &mut deposits)
                .await?;
        }
        Ok(deposits)
    }

    /// Same as [`Self::extract`] over transactions classified up front, one
    /// entry per transaction in block order.
    pub async fn extract_classified(
        &self,
        block: &Block,
        classified: &[Classified],
    ) -> Result<Vec<DepositCandidate>> {
        let mut deposits = Vec::new();
        for (tx, classified) in block.transactions.iter().zip(classified) {
            self.extract_transaction(block, tx, classified, &mut deposits)
                .await?;
        }
        Ok(deposits)
    }

    async fn extract_transaction(
        &self,
        block: &Block,
        tx: &Transaction,
        classified: &Classified,
        out: &mut Vec<DepositCandidate>,
    ) -> Result<()> {
        let transfer = match classified {
            Classified::Valid(transfer) => transfer,
            Classified::Invalid(reason) => {
                debug!(txid = %tx.hash, reason = reason.as_str(), "skipping invalid transaction");
                return Ok(());
            }
        };

        for address in self.client.destination_addresses(transfer) {
            for payment in self.index.lookup_by_address(&address).await? {
                let Some(currency) = self.currencies.iter().find(|c| c.id == payment.currency)
                else {
                    debug!(
                        address = %payment.address,
                        currency = %payment.currency,
                        "payment address currency is not serviced by this chain"
                    );
                    continue;
                };
                // A transfer to a known address must not be skipped: the block
                // stays uncommitted until it decodes.
                let found = self
                    .deposits_for(transfer, block, &payment.address, &payment.account, currency)
                    .inspect_err(|e| {
                        if let Error::Decode(reason) = e {
                            self.counters.inc_undecodable();
                            error!(txid = %tx.hash, currency = %currency.id, %reason, "deposit to known address is undecodable");
                        }
                    })?;
                out.extend(found);
            }
        }
        Ok(())
    }

    fn deposits_for(
        &self,
        transfer: &Transfer,
        block: &Block,
        address: &str,
        account: &str,
        currency: &Currency,
    ) -> Result<Vec<DepositCandidate>> {
        let decoded = self.client.decode_entries(transfer, block, address, currency)?;
        let mut out = Vec::with_capacity(decoded.entries.len());
        for entry in decoded.entries {
            if entry.amount <= currency.min_deposit_amount {
                self.counters.inc_below_minimum();
                info!(
                    txid = %decoded.txid,
                    amount = %entry.amount,
                    address = %entry.address,
                    block = decoded.block_number,
                    "skipped deposit below minimum amount"
                );
                continue;
            }
            out.push(DepositCandidate {
                txid: decoded.txid.clone(),
                txout: entry.txout,
                address: entry.address,
                amount: entry.amount,
                currency: currency.id.clone(),
                account: account.to_string(),
                block_number: decoded.block_number,
            });
        }
        Ok(out)
    }
}
