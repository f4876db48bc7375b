use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct SyncCounters {
    pub blocks_committed: AtomicU64,
    pub deposits_extracted: AtomicU64,
    pub deposits_below_minimum: AtomicU64,
    pub transactions_undecodable: AtomicU64,
    pub withdrawals_confirmed: AtomicU64,
    pub withdrawals_failed: AtomicU64,
    pub batches_skipped: AtomicU64,
    pub batches_aborted: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub blocks_committed: u64,
    pub deposits_extracted: u64,
    pub deposits_below_minimum: u64,
    pub transactions_undecodable: u64,
    pub withdrawals_confirmed: u64,
    pub withdrawals_failed: u64,
    pub batches_skipped: u64,
    pub batches_aborted: u64,
}

impl SyncCounters {
    pub fn inc_block_committed(&self) {
        let _ = self.blocks_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_deposits_extracted(&self, n: usize) {
        let _ = self.deposits_extracted.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn inc_below_minimum(&self) {
        let _ = self.deposits_below_minimum.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_undecodable(&self) {
        let _ = self.transactions_undecodable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_withdrawals_confirmed(&self, n: usize) {
        let _ = self.withdrawals_confirmed.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn inc_withdrawal_failed(&self) {
        let _ = self.withdrawals_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_batch_skipped(&self) {
        let _ = self.batches_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_batch_aborted(&self) {
        let _ = self.batches_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            blocks_committed: self.blocks_committed.load(Ordering::Relaxed),
            deposits_extracted: self.deposits_extracted.load(Ordering::Relaxed),
            deposits_below_minimum: self.deposits_below_minimum.load(Ordering::Relaxed),
            transactions_undecodable: self.transactions_undecodable.load(Ordering::Relaxed),
            withdrawals_confirmed: self.withdrawals_confirmed.load(Ordering::Relaxed),
            withdrawals_failed: self.withdrawals_failed.load(Ordering::Relaxed),
            batches_skipped: self.batches_skipped.load(Ordering::Relaxed),
            batches_aborted: self.batches_aborted.load(Ordering::Relaxed),
        }
    }
}
