//! Chain sync daemon: polls a node and commits deposits and withdrawal
//! confirmations into a file-backed ledger.

mod config;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chain_sync::client::eth::{EthChainClient, HttpTransport};
use chain_sync::domain::types::DepositCandidate;
use chain_sync::ingest::{BatchOutcome, SingleBlockOutcome, SyncEngine};
use chain_sync::store::file::FileLedger;
use chain_sync::store::memory::InMemoryAddressIndex;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::DaemonConfig;

type Engine =
    SyncEngine<EthChainClient<HttpTransport>, InMemoryAddressIndex, Arc<FileLedger>, Arc<FileLedger>>;

#[derive(Parser)]
#[command(name = "chain-syncd")]
#[command(about = "Synchronizes on-chain deposits and withdrawals into a ledger")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "chain-sync.toml")]
    config: PathBuf,

    /// Log filter used when RUST_LOG is unset
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the node and sync batches until interrupted
    Run,

    /// Run a single batch and exit
    Once {
        /// Start even if the tip is within the confirmation window
        #[arg(long)]
        force: bool,

        /// Maximum number of blocks past the watermark
        #[arg(long)]
        blocks: Option<u64>,
    },

    /// Re-process one block without moving the watermark
    Block {
        /// Block number
        id: u64,
    },

    /// Show the ledger watermark and totals
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = DaemonConfig::from_file(&cli.config)
        .with_context(|| format!("load config from {}", cli.config.display()))?;

    match cli.command {
        Command::Run => run(config).await,
        Command::Once { force, blocks } => once(config, force, blocks).await,
        Command::Block { id } => single_block(config, id).await,
        Command::Status => status(&config),
    }
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn build_engine(config: &DaemonConfig) -> Result<Engine> {
    let ledger = Arc::new(FileLedger::open(&config.state_file)?);
    if let Some(height) = config.start_height
        && ledger.seed_height(&config.chain.key, height)?
    {
        info!(chain = %config.chain.key, height, "seeded watermark for new chain");
    }

    let transport = HttpTransport::new(
        config.rpc_url.clone(),
        Duration::from_secs(config.rpc_timeout_secs),
    )?;
    let index = InMemoryAddressIndex::new(
        &config.chain.currencies,
        config.payment_addresses.iter().cloned(),
    );
    let engine = SyncEngine::new(
        config.chain.clone(),
        EthChainClient::new(transport),
        index,
        ledger.clone(),
        ledger,
    )?;

    info!(
        chain = %config.chain.key,
        config_hash = %config.chain.config_hash()?,
        rpc = %config.rpc_url,
        addresses = config.payment_addresses.len(),
        "sync engine ready"
    );
    Ok(engine)
}

async fn run(config: DaemonConfig) -> Result<()> {
    let engine = build_engine(&config)?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested, finishing current block");
            shutdown.cancel();
        }
    });

    let mut ticker = tokio::time::interval(Duration::from_secs(config.poll_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let batch_size = engine.config().block_batch_size;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        match engine.run_batch(batch_size, false, &cancel).await {
            BatchOutcome::Completed(report) => info!(
                range = ?report.range,
                blocks = report.blocks_committed,
                deposits = report.deposits_inserted,
                withdrawals = report.withdrawals_confirmed,
                "batch complete"
            ),
            BatchOutcome::Aborted { error, .. } if error.is_transient() => {
                warn!(%error, "batch aborted, retrying next tick");
            }
            BatchOutcome::Aborted { error, .. } => {
                error!(%error, "batch aborted");
            }
            BatchOutcome::Skipped { .. } => {}
            BatchOutcome::Cancelled(_) => break,
        }
    }

    info!(counters = ?engine.counters().snapshot(), "sync stopped");
    Ok(())
}

async fn once(config: DaemonConfig, force: bool, blocks: Option<u64>) -> Result<()> {
    let engine = build_engine(&config)?;
    let limit = blocks.unwrap_or(engine.config().block_batch_size);

    match engine.run_batch(limit, force, &CancellationToken::new()).await {
        BatchOutcome::Skipped { height, latest } => {
            println!("Skipped: watermark {height}, chain tip {latest}");
            Ok(())
        }
        BatchOutcome::Completed(report) | BatchOutcome::Cancelled(report) => {
            println!("Range: {:?}", report.range);
            println!("  Blocks committed: {}", report.blocks_committed);
            println!("  Deposits: {} new, {} already known", report.deposits_inserted, report.deposits_duplicate);
            println!("  Withdrawals confirmed: {}", report.withdrawals_confirmed);
            Ok(())
        }
        BatchOutcome::Aborted { report, error } => Err(anyhow!(error).context(format!(
            "batch aborted after block {:?}",
            report.last_committed
        ))),
    }
}

async fn single_block(config: DaemonConfig, id: u64) -> Result<()> {
    let engine = build_engine(&config)?;
    match engine.run_single_block(id).await {
        SingleBlockOutcome::Unconfirmed { latest } => {
            println!("Block {id} is not confirmed yet (chain tip {latest})");
        }
        SingleBlockOutcome::Filtered => println!("Block {id} has no relevant transactions"),
        SingleBlockOutcome::Committed(outcome) => {
            println!("Block {id} processed");
            println!("  Deposits: {} new, {} already known", outcome.deposits_inserted, outcome.deposits_duplicate);
            println!("  Withdrawals confirmed: {}", outcome.withdrawals_confirmed);
        }
        SingleBlockOutcome::Aborted(error) => {
            return Err(anyhow!(error).context(format!("processing block {id}")));
        }
    }
    Ok(())
}

fn status(config: &DaemonConfig) -> Result<()> {
    let ledger = FileLedger::open(&config.state_file)?;
    let watermark = ledger.watermark_of(&config.chain.key)?;

    let totals = deposit_totals(&ledger.deposits()?)?;
    let outstanding = ledger
        .intents()?
        .iter()
        .filter(|i| !i.status.is_terminal())
        .count();

    println!("Chain: {}", config.chain.key);
    println!("  Watermark: {} (version {})", watermark.height, watermark.version);
    for (currency, (count, amount)) in &totals {
        println!("  Deposits {currency}: {count} totalling {amount}");
    }
    println!("  Outstanding withdrawals: {outstanding}");
    Ok(())
}

/// Count and summed amount of deposits per currency.
fn deposit_totals(deposits: &[DepositCandidate]) -> Result<BTreeMap<String, (usize, Decimal)>> {
    let mut totals: BTreeMap<String, (usize, Decimal)> = BTreeMap::new();
    for deposit in deposits {
        let entry = totals.entry(deposit.currency.clone()).or_default();
        entry.0 += 1;
        entry.1 = entry.1.checked_add(deposit.amount).ok_or_else(|| {
            anyhow!("deposit total for {} overflows a decimal", deposit.currency)
        })?;
    }
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deposit(txid: &str, currency: &str, amount: Decimal) -> DepositCandidate {
        DepositCandidate {
            txid: txid.to_string(),
            txout: 0,
            address: "0xaa".to_string(),
            amount,
            currency: currency.to_string(),
            account: "member-1".to_string(),
            block_number: 1,
        }
    }

    #[test]
    fn totals_group_by_currency() {
        let totals = deposit_totals(&[
            deposit("0x01", "eth", Decimal::new(15, 1)),
            deposit("0x02", "eth", Decimal::new(5, 1)),
            deposit("0x03", "usdt", Decimal::TEN),
        ])
        .expect("totals");
        assert_eq!(totals["eth"], (2, Decimal::TWO));
        assert_eq!(totals["usdt"], (1, Decimal::TEN));
    }

    #[test]
    fn overflowing_total_is_an_error() {
        let err = deposit_totals(&[
            deposit("0x01", "usdt", Decimal::MAX),
            deposit("0x02", "usdt", Decimal::MAX),
        ])
        .expect_err("overflow");
        assert!(err.to_string().contains("usdt"));
    }
}
