use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};

use crate::domain::types::{
    BlockCommit, CommitOutcome, CurrencyId, DepositCandidate, Watermark, WithdrawalIntent,
};
use crate::error::{Error, Result};
use crate::store::memory::LedgerState;
use crate::store::traits::{LedgerSink, WithdrawalStore};

/// Ledger persisted as one JSON snapshot, rewritten through a temp file and
/// a rename so a crash leaves either the old or the new state on disk.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    state: Mutex<LedgerState>,
}

impl FileLedger {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut state = if path.exists() {
            let raw = fs::read(&path).map_err(|e| Error::Backend(format!("ledger read: {e}")))?;
            serde_json::from_slice::<LedgerState>(&raw)
                .map_err(|e| Error::Decode(format!("ledger state: {e}")))?
        } else {
            info!(path = %path.display(), "no ledger state found, starting empty");
            LedgerState::default()
        };
        state.reindex();
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn upsert_intent(&self, intent: WithdrawalIntent) -> Result<()> {
        self.mutate(|state| {
            state.intents.insert(intent.id, intent);
            Ok(())
        })
    }

    /// Sets the starting height of a chain that has never been synced.
    /// Returns false when a watermark already exists.
    pub fn seed_height(&self, chain: &str, height: u64) -> Result<bool> {
        if self.lock()?.watermarks.contains_key(chain) {
            return Ok(false);
        }
        self.mutate(|state| {
            state
                .watermarks
                .insert(chain.to_string(), Watermark { height, version: 1 });
            Ok(true)
        })
    }

    pub fn deposits(&self) -> Result<Vec<DepositCandidate>> {
        Ok(self.lock()?.deposits.clone())
    }

    pub fn intents(&self) -> Result<Vec<WithdrawalIntent>> {
        Ok(self.lock()?.intents.values().cloned().collect())
    }

    pub fn watermark_of(&self, chain: &str) -> Result<Watermark> {
        Ok(self.lock()?.watermark(chain))
    }

    /// Applies `f` to a copy of the state and publishes it only once the copy
    /// is durably written.
    fn mutate<T>(&self, f: impl FnOnce(&mut LedgerState) -> Result<T>) -> Result<T> {
        let mut guard = self.lock()?;
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(out)
    }

    fn persist(&self, state: &LedgerState) -> Result<()> {
        let content = serde_json::to_vec_pretty(state)
            .map_err(|e| Error::Backend(format!("ledger encode: {e}")))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content).map_err(|e| Error::Backend(format!("ledger write: {e}")))?;
        fs::rename(&tmp, &self.path).map_err(|e| Error::Backend(format!("ledger rename: {e}")))?;
        debug!(path = %self.path.display(), "ledger state saved");
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LedgerState>> {
        self.state
            .lock()
            .map_err(|_| Error::Backend("poisoned lock".to_string()))
    }
}

#[async_trait::async_trait]
impl WithdrawalStore for FileLedger {
    async fn find_by_currencies_and_txid(
        &self,
        currencies: &[CurrencyId],
        txid: &str,
    ) -> Result<Vec<WithdrawalIntent>> {
        Ok(self.lock()?.find_outstanding(currencies, txid))
    }

    async fn mark_failed(&self, intent: &WithdrawalIntent) -> Result<()> {
        self.mutate(|state| state.fail_intent(intent.id))
    }
}

#[async_trait::async_trait]
impl LedgerSink for FileLedger {
    async fn watermark(&self, chain: &str) -> Result<Watermark> {
        self.watermark_of(chain)
    }

    async fn commit_block(&self, chain: &str, commit: BlockCommit) -> Result<CommitOutcome> {
        self.mutate(|state| state.apply(chain, commit))
    }
}
