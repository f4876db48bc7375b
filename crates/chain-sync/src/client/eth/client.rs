use alloy_primitives::{B256, U256, b256};
use rust_decimal::Decimal;
use serde_json::json;

use crate::client::eth::codec::{decode_block, decode_receipt, parse_quantity};
use crate::client::eth::transport::JsonRpcTransport;
use crate::client::traits::ChainClient;
use crate::domain::transfer::Transfer;
use crate::domain::types::{Block, Currency, DecodedTransfer, Entry, Log, Receipt, Transaction};
use crate::error::{Error, Result};

/// topic0 of ERC-20 `Transfer(address,address,uint256)`.
pub const TRANSFER_EVENT_TOPIC: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

#[derive(Debug)]
pub struct EthChainClient<T> {
    transport: T,
}

impl<T: JsonRpcTransport> EthChainClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

fn is_transfer_log(log: &Log) -> bool {
    log.topics.len() == 3 && log.topics[0] == TRANSFER_EVENT_TOPIC.0
}

/// Recipient of a transfer log: the low 20 bytes of the last topic.
fn log_recipient(log: &Log) -> Option<String> {
    let topic = log.topics.last()?;
    Some(format!("0x{}", hex::encode(&topic[12..])))
}

fn normalize(address: &str) -> String {
    address.to_lowercase()
}

/// Scales a base-unit amount down by `10^precision`. Trailing decimal zeros
/// are folded into the scale first, so only amounts with more than 28
/// significant digits are rejected.
pub fn from_base_units(value: U256, precision: u32) -> Result<Decimal> {
    let ten = U256::from(10u8);
    let mut mantissa = value;
    let mut scale = precision;
    while scale > 0 && !mantissa.is_zero() && (mantissa % ten).is_zero() {
        mantissa /= ten;
        scale -= 1;
    }
    let raw = u128::try_from(mantissa)
        .ok()
        .and_then(|v| i128::try_from(v).ok())
        .ok_or_else(|| Error::Decode(format!("amount {value} out of range")))?;
    Decimal::try_from_i128_with_scale(raw, scale)
        .map(|d| d.normalize())
        .map_err(|e| Error::Decode(format!("amount {value} with precision {precision}: {e}")))
}

impl<T> EthChainClient<T> {
    fn decode_native(
        &self,
        tx: &Transaction,
        address: &str,
        currency: &Currency,
    ) -> Result<Vec<Entry>> {
        let Some(to) = tx.to.as_deref().map(normalize) else {
            return Ok(Vec::new());
        };
        if to != address {
            return Ok(Vec::new());
        }
        Ok(vec![Entry {
            address: to,
            amount: from_base_units(tx.value, currency.precision)?,
            txout: 0,
        }])
    }

    fn decode_token(
        &self,
        receipt: &Receipt,
        address: &str,
        currency: &Currency,
        contract: &str,
    ) -> Result<Vec<Entry>> {
        let contract = normalize(contract);
        let mut entries = Vec::new();
        for log in receipt.logs.iter().filter(|l| is_transfer_log(l)) {
            if normalize(&log.address) != contract {
                continue;
            }
            let Some(recipient) = log_recipient(log) else {
                continue;
            };
            if recipient != address {
                continue;
            }
            let value = U256::try_from_be_slice(&log.data).ok_or_else(|| {
                Error::Decode(format!(
                    "transfer log {} data is {} bytes",
                    log.log_index,
                    log.data.len()
                ))
            })?;
            entries.push(Entry {
                address: recipient,
                amount: from_base_units(value, currency.precision)?,
                txout: log.log_index,
            });
        }
        Ok(entries)
    }
}

#[async_trait::async_trait]
impl<T: JsonRpcTransport> ChainClient for EthChainClient<T> {
    async fn latest_height(&self) -> Result<u64> {
        let value = self.transport.call("eth_blockNumber", json!([])).await?;
        let s = value
            .as_str()
            .ok_or_else(|| Error::Decode(format!("eth_blockNumber returned {value}")))?;
        parse_quantity(s)
    }

    async fn get_block(&self, number: u64) -> Result<Option<Block>> {
        let value = self
            .transport
            .call("eth_getBlockByNumber", json!([format!("{number:#x}"), true]))
            .await?;
        decode_block(value)
    }

    async fn get_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>> {
        let value = self
            .transport
            .call("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        decode_receipt(value)
    }

    fn is_valid_native_transfer(&self, tx: &Transaction) -> bool {
        tx.to.is_some() && tx.value > U256::ZERO
    }

    fn is_valid_token_transfer(&self, receipt: &Receipt) -> bool {
        receipt.status == Some(1) && receipt.logs.iter().any(is_transfer_log)
    }

    fn destination_addresses(&self, transfer: &Transfer) -> Vec<String> {
        match transfer {
            Transfer::Native(tx) => tx.to.as_deref().map(normalize).into_iter().collect(),
            Transfer::Token { receipt, .. } => {
                let mut out: Vec<String> = Vec::new();
                for recipient in receipt
                    .logs
                    .iter()
                    .filter(|l| is_transfer_log(l))
                    .filter_map(log_recipient)
                {
                    if !out.contains(&recipient) {
                        out.push(recipient);
                    }
                }
                out
            }
        }
    }

    fn normalize_address(&self, address: &str) -> String {
        normalize(address)
    }

    fn normalize_txid(&self, hash: &str) -> String {
        hash.to_lowercase()
    }

    fn decode_entries(
        &self,
        transfer: &Transfer,
        block: &Block,
        address: &str,
        currency: &Currency,
    ) -> Result<DecodedTransfer> {
        let address = normalize(address);
        let entries = match (transfer, currency.contract_address.as_deref()) {
            (Transfer::Native(tx), None) => self.decode_native(tx, &address, currency)?,
            (Transfer::Token { receipt, .. }, Some(contract)) => {
                self.decode_token(receipt, &address, currency, contract)?
            }
            _ => Vec::new(),
        };
        let block_number = match transfer {
            Transfer::Native(_) => block.number,
            Transfer::Token { receipt, .. } => receipt.block_number,
        };
        Ok(DecodedTransfer {
            txid: self.normalize_txid(&transfer.transaction().hash),
            block_number,
            entries,
        })
    }
}
