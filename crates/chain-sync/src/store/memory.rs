use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::domain::keys::DedupKey;
use crate::domain::types::{
    BlockCommit, CommitOutcome, Currency, CurrencyId, DepositCandidate, PaymentAddress, Watermark,
    WithdrawalConfirmation, WithdrawalIntent, WithdrawalStatus,
};
use crate::error::{Error, Result};
use crate::store::traits::{AddressIndex, LedgerSink, WithdrawalStore};

/// Ledger contents shared by the in-memory and file-backed ledgers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct LedgerState {
    pub watermarks: BTreeMap<String, Watermark>,
    pub deposits: Vec<DepositCandidate>,
    pub confirmations: Vec<WithdrawalConfirmation>,
    pub intents: BTreeMap<u64, WithdrawalIntent>,
    #[serde(skip)]
    seen: HashSet<DedupKey>,
}

impl LedgerState {
    pub fn reindex(&mut self) {
        self.seen = self.deposits.iter().map(|d| d.dedup_key()).collect();
    }

    pub fn watermark(&self, chain: &str) -> Watermark {
        self.watermarks.get(chain).copied().unwrap_or_default()
    }

    pub fn apply(&mut self, chain: &str, commit: BlockCommit) -> Result<CommitOutcome> {
        let current = self.watermark(chain);
        if commit.expected_version != current.version {
            return Err(Error::CasConflict {
                expected: commit.expected_version,
                found: current.version,
            });
        }
        if let Some(proposed) = commit.new_height {
            if proposed < current.height {
                return Err(Error::WatermarkRegression {
                    current: current.height,
                    proposed,
                });
            }
            if proposed > commit.latest_height {
                return Err(Error::WatermarkAhead {
                    proposed,
                    latest: commit.latest_height,
                });
            }
        }
        for c in &commit.confirmations {
            if !self.intents.contains_key(&c.intent_id) {
                return Err(Error::UnknownIntent(c.intent_id));
            }
        }

        // Nothing below can fail.
        let mut outcome = CommitOutcome::default();
        for deposit in commit.deposits {
            if self.seen.insert(deposit.dedup_key()) {
                self.deposits.push(deposit);
                outcome.deposits_inserted += 1;
            } else {
                outcome.deposits_duplicate += 1;
            }
        }
        let mut confirmed = HashSet::new();
        for confirmation in commit.confirmations {
            let id = confirmation.intent_id;
            let Some(intent) = self.intents.get_mut(&id) else {
                continue;
            };
            if !confirmed.contains(&id) {
                if intent.status.is_terminal() {
                    outcome.confirmations_ignored += 1;
                    continue;
                }
                intent.status = WithdrawalStatus::Confirmed;
                confirmed.insert(id);
                outcome.withdrawals_confirmed += 1;
            }
            self.confirmations.push(confirmation);
            outcome.confirmations_recorded += 1;
        }

        let next = match commit.new_height {
            Some(height) => Watermark {
                height,
                version: current.version + 1,
            },
            None => current,
        };
        self.watermarks.insert(chain.to_string(), next);
        outcome.watermark = next;
        Ok(outcome)
    }

    pub fn find_outstanding(&self, currencies: &[CurrencyId], txid: &str) -> Vec<WithdrawalIntent> {
        self.intents
            .values()
            .filter(|w| !w.status.is_terminal())
            .filter(|w| currencies.contains(&w.currency))
            .filter(|w| w.txid.as_deref() == Some(txid))
            .cloned()
            .collect()
    }

    pub fn fail_intent(&mut self, id: u64) -> Result<()> {
        let intent = self.intents.get_mut(&id).ok_or(Error::UnknownIntent(id))?;
        if intent.status == WithdrawalStatus::Failed {
            return Ok(());
        }
        intent.transition(WithdrawalStatus::Failed)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    inner: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_intents(intents: impl IntoIterator<Item = WithdrawalIntent>) -> Self {
        let ledger = Self::default();
        if let Ok(mut guard) = ledger.inner.write() {
            for intent in intents {
                guard.intents.insert(intent.id, intent);
            }
        }
        ledger
    }

    /// Seeds a chain's watermark, as bootstrapping does for a fresh chain.
    pub fn set_height(&self, chain: &str, height: u64) -> Result<()> {
        let mut guard = self.write()?;
        let current = guard.watermark(chain);
        guard.watermarks.insert(
            chain.to_string(),
            Watermark {
                height,
                version: current.version + 1,
            },
        );
        Ok(())
    }

    pub fn deposits(&self) -> Result<Vec<DepositCandidate>> {
        Ok(self.read()?.deposits.clone())
    }

    pub fn confirmations(&self) -> Result<Vec<WithdrawalConfirmation>> {
        Ok(self.read()?.confirmations.clone())
    }

    pub fn intent(&self, id: u64) -> Result<Option<WithdrawalIntent>> {
        Ok(self.read()?.intents.get(&id).cloned())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, LedgerState>> {
        self.inner
            .read()
            .map_err(|_| Error::Backend("poisoned lock".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, LedgerState>> {
        self.inner
            .write()
            .map_err(|_| Error::Backend("poisoned lock".to_string()))
    }
}

#[async_trait::async_trait]
impl WithdrawalStore for InMemoryLedger {
    async fn find_by_currencies_and_txid(
        &self,
        currencies: &[CurrencyId],
        txid: &str,
    ) -> Result<Vec<WithdrawalIntent>> {
        Ok(self.read()?.find_outstanding(currencies, txid))
    }

    async fn mark_failed(&self, intent: &WithdrawalIntent) -> Result<()> {
        self.write()?.fail_intent(intent.id)
    }
}

#[async_trait::async_trait]
impl LedgerSink for InMemoryLedger {
    async fn watermark(&self, chain: &str) -> Result<Watermark> {
        Ok(self.read()?.watermark(chain))
    }

    async fn commit_block(&self, chain: &str, commit: BlockCommit) -> Result<CommitOutcome> {
        self.write()?.apply(chain, commit)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAddressIndex {
    addresses: Vec<PaymentAddress>,
    contracts: HashSet<String>,
}

impl InMemoryAddressIndex {
    pub fn new(currencies: &[Currency], addresses: impl IntoIterator<Item = PaymentAddress>) -> Self {
        let contracts = currencies
            .iter()
            .filter_map(|c| c.contract_address.as_deref())
            .map(str::to_lowercase)
            .collect();
        let addresses = addresses
            .into_iter()
            .map(|mut a| {
                a.address = a.address.to_lowercase();
                a
            })
            .collect();
        Self {
            addresses,
            contracts,
        }
    }
}

#[async_trait::async_trait]
impl AddressIndex for InMemoryAddressIndex {
    async fn lookup_by_address(&self, address: &str) -> Result<Vec<PaymentAddress>> {
        let address = address.to_lowercase();
        Ok(self
            .addresses
            .iter()
            .filter(|a| a.address == address)
            .cloned()
            .collect())
    }

    async fn deposit_addresses(&self) -> Result<HashSet<String>> {
        Ok(self.addresses.iter().map(|a| a.address.clone()).collect())
    }

    async fn contract_addresses(&self) -> Result<HashSet<String>> {
        Ok(self.contracts.clone())
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use rust_decimal::Decimal;

    use super::*;

    fn deposit(txid: &str, amount: i64) -> DepositCandidate {
        DepositCandidate {
            txid: txid.to_string(),
            txout: 0,
            address: "0xaa".to_string(),
            amount: Decimal::new(amount, 0),
            currency: "eth".to_string(),
            account: "member-1".to_string(),
            block_number: 10,
        }
    }

    fn commit(block: u64, version: u64, deposits: Vec<DepositCandidate>) -> BlockCommit {
        BlockCommit {
            block_number: block,
            deposits,
            confirmations: Vec::new(),
            new_height: Some(block),
            latest_height: 100,
            expected_version: version,
        }
    }

    #[test]
    fn duplicate_deposits_are_ignored() {
        block_on(async {
            let ledger = InMemoryLedger::new();
            let first = ledger
                .commit_block("eth", commit(10, 0, vec![deposit("0x01", 5)]))
                .await
                .expect("first commit");
            assert_eq!(first.deposits_inserted, 1);

            let again = ledger
                .commit_block("eth", commit(10, 1, vec![deposit("0x01", 5)]))
                .await
                .expect("rescan commit");
            assert_eq!(again.deposits_inserted, 0);
            assert_eq!(again.deposits_duplicate, 1);
            assert_eq!(ledger.deposits().expect("deposits").len(), 1);
        });
    }

    #[test]
    fn stale_version_and_regression_are_rejected() {
        block_on(async {
            let ledger = InMemoryLedger::new();
            ledger.set_height("eth", 50).expect("seed");

            let err = ledger
                .commit_block("eth", commit(51, 0, Vec::new()))
                .await
                .expect_err("stale version");
            assert!(matches!(err, Error::CasConflict { expected: 0, found: 1 }));

            let err = ledger
                .commit_block("eth", commit(49, 1, Vec::new()))
                .await
                .expect_err("regression");
            assert!(matches!(
                err,
                Error::WatermarkRegression {
                    current: 50,
                    proposed: 49
                }
            ));

            let err = ledger
                .commit_block("eth", commit(101, 1, Vec::new()))
                .await
                .expect_err("ahead of latest");
            assert!(matches!(err, Error::WatermarkAhead { .. }));
            assert_eq!(ledger.watermark("eth").await.expect("wm").height, 50);
        });
    }

    #[test]
    fn failed_commit_applies_nothing() {
        block_on(async {
            let ledger = InMemoryLedger::new();
            let mut c = commit(10, 0, vec![deposit("0x01", 5)]);
            c.confirmations.push(WithdrawalConfirmation {
                intent_id: 99,
                txid: "0x01".to_string(),
                rid: "0xbb".to_string(),
                amount: Decimal::ONE,
                block_number: 10,
            });
            let err = ledger.commit_block("eth", c).await.expect_err("unknown intent");
            assert!(matches!(err, Error::UnknownIntent(99)));
            assert!(ledger.deposits().expect("deposits").is_empty());
            assert_eq!(ledger.watermark("eth").await.expect("wm"), Watermark::default());
        });
    }

    #[test]
    fn every_entry_of_a_split_withdrawal_is_recorded() {
        block_on(async {
            let ledger = InMemoryLedger::with_intents([WithdrawalIntent {
                id: 5,
                currency: "usdt".to_string(),
                rid: "0xbb".to_string(),
                txid: Some("0x0a".to_string()),
                status: WithdrawalStatus::Confirming,
            }]);
            let entry = |amount: i64| WithdrawalConfirmation {
                intent_id: 5,
                txid: "0x0a".to_string(),
                rid: "0xbb".to_string(),
                amount: Decimal::new(amount, 0),
                block_number: 10,
            };
            let mut c = commit(10, 0, Vec::new());
            c.confirmations = vec![entry(3), entry(4)];
            let out = ledger.commit_block("eth", c).await.expect("commit");
            assert_eq!(out.withdrawals_confirmed, 1);
            assert_eq!(out.confirmations_recorded, 2);
            let amounts: Vec<Decimal> = ledger
                .confirmations()
                .expect("confirmations")
                .iter()
                .map(|c| c.amount)
                .collect();
            assert_eq!(amounts, vec![Decimal::new(3, 0), Decimal::new(4, 0)]);

            // The intent is terminal now; later entries are reported, not stored.
            let mut again = commit(11, 1, Vec::new());
            again.confirmations = vec![entry(3)];
            let out = ledger.commit_block("eth", again).await.expect("commit");
            assert_eq!(out.withdrawals_confirmed, 0);
            assert_eq!(out.confirmations_recorded, 0);
            assert_eq!(out.confirmations_ignored, 1);
            assert_eq!(ledger.confirmations().expect("confirmations").len(), 2);
        });
    }

    #[test]
    fn address_lookup_is_case_insensitive() {
        block_on(async {
            let usdt = Currency {
                id: "usdt".to_string(),
                contract_address: Some("0xDAC17F958D2ee523a2206206994597C13D831ec7".to_string()),
                precision: 6,
                min_deposit_amount: Decimal::ZERO,
            };
            let index = InMemoryAddressIndex::new(
                &[usdt],
                [PaymentAddress {
                    address: "0xAbC".to_string(),
                    account: "member-1".to_string(),
                    currency: "usdt".to_string(),
                }],
            );
            assert_eq!(index.lookup_by_address("0xabc").await.expect("lookup").len(), 1);
            assert!(
                index
                    .contract_addresses()
                    .await
                    .expect("contracts")
                    .contains("0xdac17f958d2ee523a2206206994597c13d831ec7")
            );
        });
    }
}
