use alloy_primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::keys::DedupKey;
use crate::error::{Error, Result};

pub type CurrencyId = String;
pub type Topic32 = [u8; 32];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub number: u64,
    pub hash: String,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub hash: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub input: Vec<u8>,
    pub value: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    Native,
    ContractCall,
}

impl Transaction {
    /// A transaction with an empty or all-zero payload moves value directly.
    pub fn kind(&self) -> TxKind {
        if self.input.iter().all(|b| *b == 0) {
            TxKind::Native
        } else {
            TxKind::ContractCall
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: String,
    pub block_number: u64,
    pub from: Option<String>,
    pub to: Option<String>,
    pub status: Option<u64>,
    pub logs: Vec<Log>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub address: String,
    pub topics: Vec<Topic32>,
    pub data: Vec<u8>,
    pub log_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub id: CurrencyId,
    #[serde(default)]
    pub contract_address: Option<String>,
    pub precision: u32,
    pub min_deposit_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAddress {
    pub address: String,
    pub account: String,
    pub currency: CurrencyId,
}

/// One logical transfer carried by a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub address: String,
    pub amount: Decimal,
    pub txout: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransfer {
    pub txid: String,
    pub block_number: u64,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositCandidate {
    pub txid: String,
    pub txout: u64,
    pub address: String,
    pub amount: Decimal,
    pub currency: CurrencyId,
    pub account: String,
    pub block_number: u64,
}

impl DepositCandidate {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            txid: self.txid.clone(),
            txout: self.txout,
            address: self.address.clone(),
            currency: self.currency.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Submitted,
    Confirming,
    Confirmed,
    Failed,
}

impl WithdrawalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Confirming => "confirming",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalIntent {
    pub id: u64,
    pub currency: CurrencyId,
    pub rid: String,
    pub txid: Option<String>,
    pub status: WithdrawalStatus,
}

impl WithdrawalIntent {
    /// Moves the intent forward. Terminal states never reopen.
    pub fn transition(&mut self, next: WithdrawalStatus) -> Result<()> {
        let allowed = match (self.status, next) {
            (WithdrawalStatus::Submitted, WithdrawalStatus::Confirming) => true,
            (WithdrawalStatus::Submitted | WithdrawalStatus::Confirming, s) => s.is_terminal(),
            _ => false,
        };
        if !allowed {
            return Err(Error::InvalidTransition {
                id: self.id,
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalConfirmation {
    pub intent_id: u64,
    pub txid: String,
    pub rid: String,
    pub amount: Decimal,
    pub block_number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Watermark {
    pub height: u64,
    pub version: u64,
}

/// Everything one block contributes to the ledger, applied atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockCommit {
    pub block_number: u64,
    pub deposits: Vec<DepositCandidate>,
    pub confirmations: Vec<WithdrawalConfirmation>,
    /// `None` records the block without moving the watermark.
    pub new_height: Option<u64>,
    pub latest_height: u64,
    pub expected_version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitOutcome {
    pub watermark: Watermark,
    pub deposits_inserted: usize,
    pub deposits_duplicate: usize,
    /// Intents moved to `Confirmed`.
    pub withdrawals_confirmed: usize,
    /// Confirmation entries stored; an intent paid by several transfers
    /// contributes one per transfer.
    pub confirmations_recorded: usize,
    /// Entries for intents that were already terminal before this commit.
    pub confirmations_ignored: usize,
}
