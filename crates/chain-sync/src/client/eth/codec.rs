use alloy_primitives::U256;
use serde::Deserialize;

use crate::domain::types::{Block, Log, Receipt, Topic32, Transaction};
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
pub(crate) struct RpcBlock {
    number: String,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    transactions: Vec<RpcTransaction>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcTransaction {
    hash: String,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    input: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RpcReceipt {
    transaction_hash: String,
    block_number: String,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RpcLog {
    address: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    data: String,
    log_index: String,
}

pub fn parse_quantity(s: &str) -> Result<u64> {
    let digits = strip_0x(s);
    if digits.is_empty() {
        return Err(Error::Decode(format!("empty quantity {s:?}")));
    }
    u64::from_str_radix(digits, 16).map_err(|e| Error::Decode(format!("quantity {s:?}: {e}")))
}

pub fn parse_u256(s: &str) -> Result<U256> {
    let digits = strip_0x(s);
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16).map_err(|e| Error::Decode(format!("u256 {s:?}: {e}")))
}

pub fn parse_bytes(s: &str) -> Result<Vec<u8>> {
    let digits = strip_0x(s);
    if digits.len() % 2 == 1 {
        return hex::decode(format!("0{digits}"))
            .map_err(|e| Error::Decode(format!("hex {s:?}: {e}")));
    }
    hex::decode(digits).map_err(|e| Error::Decode(format!("hex {s:?}: {e}")))
}

fn parse_topic(s: &str) -> Result<Topic32> {
    let bytes = parse_bytes(s)?;
    <Topic32>::try_from(bytes.as_slice())
        .map_err(|_| Error::Decode(format!("topic {s:?} is not 32 bytes")))
}

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

impl TryFrom<RpcTransaction> for Transaction {
    type Error = Error;

    fn try_from(tx: RpcTransaction) -> Result<Self> {
        Ok(Transaction {
            input: parse_bytes(&tx.input)?,
            value: parse_u256(&tx.value)?,
            hash: tx.hash,
            from: tx.from,
            to: tx.to,
        })
    }
}

impl TryFrom<RpcBlock> for Block {
    type Error = Error;

    fn try_from(block: RpcBlock) -> Result<Self> {
        Ok(Block {
            number: parse_quantity(&block.number)?,
            hash: block.hash.unwrap_or_default(),
            transactions: block
                .transactions
                .into_iter()
                .map(Transaction::try_from)
                .collect::<Result<_>>()?,
        })
    }
}

impl TryFrom<RpcLog> for Log {
    type Error = Error;

    fn try_from(log: RpcLog) -> Result<Self> {
        Ok(Log {
            topics: log
                .topics
                .iter()
                .map(|t| parse_topic(t))
                .collect::<Result<_>>()?,
            data: parse_bytes(&log.data)?,
            log_index: parse_quantity(&log.log_index)?,
            address: log.address,
        })
    }
}

impl TryFrom<RpcReceipt> for Receipt {
    type Error = Error;

    fn try_from(receipt: RpcReceipt) -> Result<Self> {
        Ok(Receipt {
            block_number: parse_quantity(&receipt.block_number)?,
            status: receipt.status.as_deref().map(parse_quantity).transpose()?,
            logs: receipt
                .logs
                .into_iter()
                .map(Log::try_from)
                .collect::<Result<_>>()?,
            transaction_hash: receipt.transaction_hash,
            from: receipt.from,
            to: receipt.to,
        })
    }
}

/// `null` means the node does not know the block yet.
pub fn decode_block(value: serde_json::Value) -> Result<Option<Block>> {
    if value.is_null() {
        return Ok(None);
    }
    let raw: RpcBlock =
        serde_json::from_value(value).map_err(|e| Error::Decode(format!("block: {e}")))?;
    Block::try_from(raw).map(Some)
}

pub fn decode_receipt(value: serde_json::Value) -> Result<Option<Receipt>> {
    if value.is_null() {
        return Ok(None);
    }
    let raw: RpcReceipt =
        serde_json::from_value(value).map_err(|e| Error::Decode(format!("receipt: {e}")))?;
    Receipt::try_from(raw).map(Some)
}
