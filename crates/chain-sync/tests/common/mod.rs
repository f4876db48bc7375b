#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chain_sync::client::eth::{EthChainClient, JsonRpcTransport};
use chain_sync::config::ChainConfig;
use chain_sync::domain::types::{
    BlockCommit, CommitOutcome, Currency, PaymentAddress, Watermark, WithdrawalIntent,
    WithdrawalStatus,
};
use chain_sync::error::{Error, Result};
use chain_sync::store::memory::{InMemoryAddressIndex, InMemoryLedger};
use chain_sync::store::traits::LedgerSink;
use chain_sync::SyncEngine;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

pub const CHAIN: &str = "eth-test";
pub const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";
pub const WEI: u128 = 1_000_000_000_000_000_000;

pub fn addr(b: u8) -> String {
    format!("0x{}", hex::encode([b; 20]))
}

pub fn txid(b: u8) -> String {
    format!("0x{}", hex::encode([b; 32]))
}

pub fn usdt_contract() -> String {
    addr(0xd0)
}

pub fn hot_wallet() -> String {
    addr(0xee)
}

pub fn currencies() -> Vec<Currency> {
    vec![
        Currency {
            id: "eth".to_string(),
            contract_address: None,
            precision: 18,
            min_deposit_amount: Decimal::new(1, 2),
        },
        Currency {
            id: "usdt".to_string(),
            contract_address: Some(usdt_contract()),
            precision: 6,
            min_deposit_amount: Decimal::ONE,
        },
    ]
}

pub fn chain_config() -> ChainConfig {
    ChainConfig {
        key: CHAIN.to_string(),
        min_confirmations: 6,
        block_batch_size: 250,
        prefetch_depth: 4,
        watch_senders: vec![hot_wallet()],
        currencies: currencies(),
    }
}

pub fn payment_address(b: u8, account: &str, currency: &str) -> PaymentAddress {
    PaymentAddress {
        address: addr(b),
        account: account.to_string(),
        currency: currency.to_string(),
    }
}

pub fn intent(id: u64, currency: &str, rid: u8, tx: u8) -> WithdrawalIntent {
    WithdrawalIntent {
        id,
        currency: currency.to_string(),
        rid: addr(rid),
        txid: Some(txid(tx)),
        status: WithdrawalStatus::Confirming,
    }
}

pub fn native_tx(hash: u8, from: u8, to: u8, wei: u128) -> Value {
    json!({
        "hash": txid(hash),
        "from": addr(from),
        "to": addr(to),
        "input": "0x",
        "value": format!("{wei:#x}"),
    })
}

pub fn token_call(hash: u8, from: u8, contract: &str) -> Value {
    json!({
        "hash": txid(hash),
        "from": addr(from),
        "to": contract,
        "input": "0xa9059cbb",
        "value": "0x0",
    })
}

pub fn transfer_log(contract: &str, from: u8, to: u8, amount: u128, log_index: u64) -> Value {
    transfer_log_data(contract, from, to, &format!("0x{amount:064x}"), log_index)
}

/// Transfer log carrying `data` verbatim as its amount word.
pub fn transfer_log_data(contract: &str, from: u8, to: u8, data: &str, log_index: u64) -> Value {
    json!({
        "address": contract,
        "topics": [
            TRANSFER_TOPIC,
            format!("0x{}{}", "00".repeat(12), hex::encode([from; 20])),
            format!("0x{}{}", "00".repeat(12), hex::encode([to; 20])),
        ],
        "data": data,
        "logIndex": format!("{log_index:#x}"),
    })
}

pub fn receipt(hash: u8, block: u64, status: u64, logs: Vec<Value>) -> Value {
    json!({
        "transactionHash": txid(hash),
        "blockNumber": format!("{block:#x}"),
        "status": format!("{status:#x}"),
        "logs": logs,
    })
}

#[derive(Default)]
struct NodeState {
    latest: u64,
    blocks: HashMap<u64, Vec<Value>>,
    receipts: HashMap<String, Value>,
    fail_blocks: Vec<u64>,
    block_requests: Vec<u64>,
}

/// Scripted JSON-RPC node. Unscripted blocks exist and are empty.
#[derive(Default)]
pub struct MockNode {
    state: Mutex<NodeState>,
}

impl MockNode {
    pub fn new(latest: u64) -> Arc<Self> {
        let node = Self::default();
        node.state.lock().expect("node lock").latest = latest;
        Arc::new(node)
    }

    pub fn set_latest(&self, latest: u64) {
        self.state.lock().expect("node lock").latest = latest;
    }

    pub fn add_block(&self, number: u64, txs: Vec<Value>) {
        self.state
            .lock()
            .expect("node lock")
            .blocks
            .insert(number, txs);
    }

    pub fn add_receipt(&self, hash: u8, receipt: Value) {
        self.state
            .lock()
            .expect("node lock")
            .receipts
            .insert(txid(hash), receipt);
    }

    /// Every fetch of `number` fails until [`Self::heal`].
    pub fn fail_block(&self, number: u64) {
        self.state.lock().expect("node lock").fail_blocks.push(number);
    }

    pub fn heal(&self) {
        self.state.lock().expect("node lock").fail_blocks.clear();
    }

    pub fn block_requests(&self) -> Vec<u64> {
        self.state.lock().expect("node lock").block_requests.clone()
    }
}

#[async_trait::async_trait]
impl JsonRpcTransport for MockNode {
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let mut state = self.state.lock().expect("node lock");
        match method {
            "eth_blockNumber" => Ok(json!(format!("{:#x}", state.latest))),
            "eth_getBlockByNumber" => {
                let raw = params[0].as_str().expect("block number param");
                let number = u64::from_str_radix(raw.trim_start_matches("0x"), 16)
                    .expect("hex block number");
                state.block_requests.push(number);
                if state.fail_blocks.contains(&number) {
                    return Err(Error::Rpc("connection reset by peer".to_string()));
                }
                if number > state.latest {
                    return Ok(Value::Null);
                }
                let txs = state.blocks.get(&number).cloned().unwrap_or_default();
                Ok(json!({
                    "number": format!("{number:#x}"),
                    "hash": format!("0x{number:064x}"),
                    "transactions": txs,
                }))
            }
            "eth_getTransactionReceipt" => {
                let hash = params[0].as_str().expect("hash param").to_lowercase();
                Ok(state.receipts.get(&hash).cloned().unwrap_or(Value::Null))
            }
            other => Err(Error::Rpc(format!("method {other} not supported"))),
        }
    }
}

/// Ledger whose commits fail for chosen blocks.
pub struct FlakyLedger {
    pub inner: InMemoryLedger,
    fail_commits: Mutex<Vec<u64>>,
}

impl FlakyLedger {
    pub fn new(inner: InMemoryLedger) -> Self {
        Self {
            inner,
            fail_commits: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_commit(&self, block: u64) {
        self.fail_commits.lock().expect("flaky lock").push(block);
    }

    pub fn heal(&self) {
        self.fail_commits.lock().expect("flaky lock").clear();
    }
}

#[async_trait::async_trait]
impl LedgerSink for FlakyLedger {
    async fn watermark(&self, chain: &str) -> Result<Watermark> {
        self.inner.watermark(chain).await
    }

    async fn commit_block(&self, chain: &str, commit: BlockCommit) -> Result<CommitOutcome> {
        if self
            .fail_commits
            .lock()
            .expect("flaky lock")
            .contains(&commit.block_number)
        {
            return Err(Error::Backend("serialization failure".to_string()));
        }
        self.inner.commit_block(chain, commit).await
    }
}

/// Ledger that trips a cancellation token once a chosen block is committed.
pub struct CancellingLedger {
    pub inner: InMemoryLedger,
    after: u64,
    token: CancellationToken,
}

impl CancellingLedger {
    pub fn new(inner: InMemoryLedger, after: u64, token: CancellationToken) -> Self {
        Self { inner, after, token }
    }
}

#[async_trait::async_trait]
impl LedgerSink for CancellingLedger {
    async fn watermark(&self, chain: &str) -> Result<Watermark> {
        self.inner.watermark(chain).await
    }

    async fn commit_block(&self, chain: &str, commit: BlockCommit) -> Result<CommitOutcome> {
        let block = commit.block_number;
        let outcome = self.inner.commit_block(chain, commit).await?;
        if block == self.after {
            self.token.cancel();
        }
        Ok(outcome)
    }
}

pub type TestEngine<L> = SyncEngine<
    EthChainClient<Arc<MockNode>>,
    Arc<InMemoryAddressIndex>,
    Arc<InMemoryLedger>,
    L,
>;

pub struct Harness {
    pub node: Arc<MockNode>,
    pub ledger: Arc<InMemoryLedger>,
    pub engine: TestEngine<Arc<InMemoryLedger>>,
}

pub fn harness(
    latest: u64,
    height: u64,
    addresses: Vec<PaymentAddress>,
    intents: Vec<WithdrawalIntent>,
) -> Harness {
    let node = MockNode::new(latest);
    let ledger = Arc::new(InMemoryLedger::with_intents(intents));
    ledger.set_height(CHAIN, height).expect("seed height");
    let index = Arc::new(InMemoryAddressIndex::new(&currencies(), addresses));
    let engine = SyncEngine::new(
        chain_config(),
        EthChainClient::new(node.clone()),
        index,
        ledger.clone(),
        ledger.clone(),
    )
    .expect("engine");
    Harness {
        node,
        ledger,
        engine,
    }
}
