//! Daemon configuration, loaded from a TOML file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use chain_sync::ChainConfig;
use chain_sync::domain::types::PaymentAddress;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// JSON-RPC endpoint of the chain node.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,

    /// Pause between batches in `run` mode.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Ledger snapshot file.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Watermark for a chain that has never been synced.
    #[serde(default)]
    pub start_height: Option<u64>,

    #[serde(default)]
    pub payment_addresses: Vec<PaymentAddress>,

    pub chain: ChainConfig,
}

fn default_rpc_url() -> String {
    "http://localhost:8545".to_string()
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_state_file() -> PathBuf {
    PathBuf::from("chain-sync-state.json")
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("parse config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.chain.validate()?;
        ensure!(!self.rpc_url.is_empty(), "rpc_url must not be empty");
        ensure!(self.rpc_timeout_secs > 0, "rpc_timeout_secs must be > 0");
        ensure!(self.poll_interval_secs > 0, "poll_interval_secs must be > 0");
        for address in &self.payment_addresses {
            ensure!(
                self.chain.currency(&address.currency).is_some(),
                "payment address {} uses unknown currency {}",
                address.address,
                address.currency
            );
        }
        Ok(())
    }
}
