use crate::domain::types::{Receipt, Transaction};

/// A transaction that passed its kind's validity predicate, tagged by how
/// its transfers are observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transfer {
    /// Value carried by the transaction itself.
    Native(Transaction),
    /// Value moved by a contract call, visible only in the receipt logs.
    Token {
        transaction: Transaction,
        receipt: Receipt,
    },
}

impl Transfer {
    pub fn transaction(&self) -> &Transaction {
        match self {
            Self::Native(tx) => tx,
            Self::Token { transaction, .. } => transaction,
        }
    }
}

/// Result of classifying one raw transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Valid(Transfer),
    Invalid(InvalidReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    NativeRejected,
    ReceiptMissing,
    TokenRejected,
}

impl InvalidReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NativeRejected => "native_rejected",
            Self::ReceiptMissing => "receipt_missing",
            Self::TokenRejected => "token_rejected",
        }
    }
}
