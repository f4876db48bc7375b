use std::pin::pin;

use futures::{StreamExt, stream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::traits::ChainClient;
use crate::config::ChainConfig;
use crate::domain::types::{
    Block, BlockCommit, CommitOutcome, DepositCandidate, WithdrawalConfirmation,
};
use crate::error::{Error, Result};
use crate::ingest::classify::classify_block;
use crate::ingest::deposits::DepositExtractor;
use crate::ingest::prefilter::BlockPreFilter;
use crate::ingest::withdrawals::WithdrawalReconciler;
use crate::metrics::counters::SyncCounters;
use crate::store::traits::{AddressIndex, LedgerSink, WithdrawalStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Inclusive block range selected for the run.
    pub range: Option<(u64, u64)>,
    pub latest: Option<u64>,
    pub last_committed: Option<u64>,
    pub blocks_committed: u64,
    pub deposits_inserted: usize,
    pub deposits_duplicate: usize,
    pub withdrawals_confirmed: usize,
    pub confirmations_recorded: usize,
}

impl BatchReport {
    fn record(&mut self, block: u64, outcome: &CommitOutcome) {
        self.last_committed = Some(block);
        self.blocks_committed += 1;
        self.deposits_inserted += outcome.deposits_inserted;
        self.deposits_duplicate += outcome.deposits_duplicate;
        self.withdrawals_confirmed += outcome.withdrawals_confirmed;
        self.confirmations_recorded += outcome.confirmations_recorded;
    }
}

/// How a batch ended. Errors are reported here rather than returned, the
/// scheduler owns retry.
#[derive(Debug)]
pub enum BatchOutcome {
    /// Not enough new blocks beyond the watermark to start a run.
    Skipped { height: u64, latest: u64 },
    Completed(BatchReport),
    Cancelled(BatchReport),
    Aborted { report: BatchReport, error: Error },
}

impl BatchOutcome {
    pub fn report(&self) -> Option<&BatchReport> {
        match self {
            Self::Skipped { .. } => None,
            Self::Completed(r) | Self::Cancelled(r) => Some(r),
            Self::Aborted { report, .. } => Some(report),
        }
    }
}

#[derive(Debug)]
pub enum SingleBlockOutcome {
    Unconfirmed { latest: u64 },
    /// Nothing in the block touches a known address.
    Filtered,
    Committed(CommitOutcome),
    Aborted(Error),
}

enum BatchEnd {
    Skipped { height: u64, latest: u64 },
    Finished,
    Cancelled,
}

pub struct SyncEngine<C, A, W, L> {
    config: ChainConfig,
    client: C,
    index: A,
    withdrawals: W,
    ledger: L,
    counters: SyncCounters,
}

impl<C, A, W, L> SyncEngine<C, A, W, L>
where
    C: ChainClient,
    A: AddressIndex,
    W: WithdrawalStore,
    L: LedgerSink,
{
    pub fn new(config: ChainConfig, client: C, index: A, withdrawals: W, ledger: L) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            client,
            index,
            withdrawals,
            ledger,
            counters: SyncCounters::default(),
        })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn counters(&self) -> &SyncCounters {
        &self.counters
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Scans `[height, min(latest, height + block_limit)]`, committing block
    /// by block. Confirmations only gate whether the run starts.
    pub async fn run_batch(
        &self,
        block_limit: u64,
        force: bool,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let mut report = BatchReport::default();
        match self.drive_batch(block_limit, force, cancel, &mut report).await {
            Ok(BatchEnd::Skipped { height, latest }) => {
                self.counters.inc_batch_skipped();
                info!(
                    chain = %self.config.key,
                    height,
                    latest,
                    "skip synchronization, no new blocks detected"
                );
                BatchOutcome::Skipped { height, latest }
            }
            Ok(BatchEnd::Finished) => BatchOutcome::Completed(report),
            Ok(BatchEnd::Cancelled) => {
                info!(
                    chain = %self.config.key,
                    last_committed = ?report.last_committed,
                    "batch cancelled at block boundary"
                );
                BatchOutcome::Cancelled(report)
            }
            Err(error) => {
                self.counters.inc_batch_aborted();
                error!(
                    chain = %self.config.key,
                    last_committed = ?report.last_committed,
                    %error,
                    "batch aborted during block processing"
                );
                BatchOutcome::Aborted { report, error }
            }
        }
    }

    async fn drive_batch(
        &self,
        block_limit: u64,
        force: bool,
        cancel: &CancellationToken,
        report: &mut BatchReport,
    ) -> Result<BatchEnd> {
        let chain = self.config.key.as_str();
        let watermark = self.ledger.watermark(chain).await?;
        let latest = self.client.latest_height().await?;
        report.latest = Some(latest);

        let height = watermark.height;
        if height.saturating_add(self.config.min_confirmations) >= latest && !force {
            return Ok(BatchEnd::Skipped { height, latest });
        }

        let from = height;
        let to = latest.min(height.saturating_add(block_limit));
        if from > to {
            return Ok(BatchEnd::Finished);
        }
        report.range = Some((from, to));

        let mut version = watermark.version;
        // Fetches run ahead of processing; commits stay in block order.
        let mut blocks = pin!(
            stream::iter(from..=to)
                .map(|number| async move { (number, self.client.get_block(number).await) })
                .buffered(self.config.prefetch_depth.max(1))
        );

        loop {
            if cancel.is_cancelled() {
                return Ok(BatchEnd::Cancelled);
            }
            let Some((number, fetched)) = blocks.next().await else {
                break;
            };
            if cancel.is_cancelled() {
                return Ok(BatchEnd::Cancelled);
            }
            let block = fetched?.ok_or(Error::BlockNotFound(number))?;
            if block.number != number {
                return Err(Error::Decode(format!(
                    "requested block {number}, node returned {}",
                    block.number
                )));
            }
            let outcome = self.process_block(&block, Some(number), latest, version).await?;
            version = outcome.watermark.version;
            report.record(number, &outcome);
        }
        Ok(BatchEnd::Finished)
    }

    /// Re-processes one block out of band. Records are committed but the
    /// watermark stays where it is.
    pub async fn run_single_block(&self, block_id: u64) -> SingleBlockOutcome {
        match self.drive_single_block(block_id).await {
            Ok(outcome) => outcome,
            Err(error) => {
                error!(chain = %self.config.key, block = block_id, %error, "single block processing failed");
                SingleBlockOutcome::Aborted(error)
            }
        }
    }

    async fn drive_single_block(&self, block_id: u64) -> Result<SingleBlockOutcome> {
        let latest = self.client.latest_height().await?;
        if block_id.saturating_add(self.config.min_confirmations) >= latest {
            return Ok(SingleBlockOutcome::Unconfirmed { latest });
        }

        let block = self
            .client
            .get_block(block_id)
            .await?
            .ok_or(Error::BlockNotFound(block_id))?;
        if block.transactions.is_empty() {
            return Ok(SingleBlockOutcome::Filtered);
        }

        let filter = BlockPreFilter::new(
            self.index.deposit_addresses().await?,
            self.index.contract_addresses().await?,
            self.config.watch_senders.iter().cloned(),
            |a| self.client.normalize_address(a),
        );
        if !filter.matches(&block, |a| self.client.normalize_address(a)) {
            debug!(chain = %self.config.key, block = block_id, "no relevant transactions in block");
            return Ok(SingleBlockOutcome::Filtered);
        }

        let watermark = self.ledger.watermark(&self.config.key).await?;
        let outcome = self
            .process_block(&block, None, latest, watermark.version)
            .await?;
        Ok(SingleBlockOutcome::Committed(outcome))
    }

    /// Deposits the block carries, without committing them.
    pub async fn extract_deposits(&self, block: &Block) -> Result<Vec<DepositCandidate>> {
        self.deposit_extractor().extract(block).await
    }

    /// Confirmations the block carries for outstanding intents. Nothing is
    /// committed, but intents whose transaction is invalid are failed in the
    /// Withdrawal Store on the spot.
    pub async fn reconcile_withdrawals(&self, block: &Block) -> Result<Vec<WithdrawalConfirmation>> {
        self.withdrawal_reconciler().reconcile(block).await
    }

    fn deposit_extractor(&self) -> DepositExtractor<'_, C, A> {
        DepositExtractor {
            client: &self.client,
            index: &self.index,
            currencies: &self.config.currencies,
            counters: &self.counters,
        }
    }

    fn withdrawal_reconciler(&self) -> WithdrawalReconciler<'_, C, W> {
        WithdrawalReconciler {
            client: &self.client,
            store: &self.withdrawals,
            currencies: &self.config.currencies,
            counters: &self.counters,
        }
    }

    async fn process_block(
        &self,
        block: &Block,
        new_height: Option<u64>,
        latest: u64,
        expected_version: u64,
    ) -> Result<CommitOutcome> {
        let chain = self.config.key.as_str();
        info!(chain, block = block.number, txs = block.transactions.len(), "started processing block");

        let (deposits, confirmations) = if block.transactions.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            let classified =
                classify_block(&self.client, block, self.config.prefetch_depth).await?;
            let deposits = self
                .deposit_extractor()
                .extract_classified(block, &classified)
                .await?;
            let confirmations = self
                .withdrawal_reconciler()
                .reconcile_classified(block, &classified)
                .await?;
            (deposits, confirmations)
        };
        self.counters.add_deposits_extracted(deposits.len());

        let outcome = self
            .ledger
            .commit_block(
                chain,
                BlockCommit {
                    block_number: block.number,
                    deposits,
                    confirmations,
                    new_height,
                    latest_height: latest,
                    expected_version,
                },
            )
            .await?;
        self.counters.inc_block_committed();
        if outcome.confirmations_ignored > 0 {
            warn!(
                chain,
                block = block.number,
                ignored = outcome.confirmations_ignored,
                "confirmations for intents that were already settled"
            );
        }
        self.counters
            .add_withdrawals_confirmed(outcome.withdrawals_confirmed);

        info!(
            chain,
            block = block.number,
            deposits = outcome.deposits_inserted,
            duplicates = outcome.deposits_duplicate,
            withdrawals = outcome.withdrawals_confirmed,
            confirmation_entries = outcome.confirmations_recorded,
            height = outcome.watermark.height,
            "finished processing block"
        );
        Ok(outcome)
    }
}
