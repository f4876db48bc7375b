use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::types::Currency;
use crate::error::{Error, Result};

/// Rough number of Ethereum blocks per hour.
pub const DEFAULT_BLOCK_BATCH_SIZE: u64 = 250;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub key: String,
    #[serde(default)]
    pub min_confirmations: u64,
    #[serde(default = "default_block_batch_size")]
    pub block_batch_size: u64,
    #[serde(default = "default_prefetch_depth")]
    pub prefetch_depth: usize,
    /// Senders whose transactions always pass the single-block pre-filter,
    /// typically the custodian's own hot wallets.
    #[serde(default)]
    pub watch_senders: Vec<String>,
    #[serde(default)]
    pub currencies: Vec<Currency>,
}

fn default_block_batch_size() -> u64 {
    DEFAULT_BLOCK_BATCH_SIZE
}

fn default_prefetch_depth() -> usize {
    1
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            key: "eth-mainnet".to_string(),
            min_confirmations: 6,
            block_batch_size: DEFAULT_BLOCK_BATCH_SIZE,
            prefetch_depth: default_prefetch_depth(),
            watch_senders: Vec::new(),
            currencies: Vec::new(),
        }
    }
}

impl ChainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.key.trim().is_empty() {
            return Err(Error::ConfigInvalid("key must not be empty".to_string()));
        }
        if self.block_batch_size < 1 {
            return Err(Error::ConfigInvalid(
                "block_batch_size must be >= 1".to_string(),
            ));
        }
        if self.prefetch_depth < 1 {
            return Err(Error::ConfigInvalid(
                "prefetch_depth must be >= 1".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        let mut contracts = HashSet::new();
        for currency in &self.currencies {
            let id = &currency.id;
            if id.trim().is_empty() {
                return Err(Error::ConfigInvalid(
                    "currencies[].id must not be empty".to_string(),
                ));
            }
            if !ids.insert(id.as_str()) {
                return Err(Error::ConfigInvalid(format!(
                    "currencies.{id} is declared twice"
                )));
            }
            if let Some(contract) = &currency.contract_address
                && !contracts.insert(contract.to_lowercase())
            {
                return Err(Error::ConfigInvalid(format!(
                    "currencies.{id}.contract_address {contract} is shared with another currency"
                )));
            }
            if currency.precision > 28 {
                return Err(Error::ConfigInvalid(format!(
                    "currencies.{id}.precision must be <= 28"
                )));
            }
            if currency.min_deposit_amount < Decimal::ZERO {
                return Err(Error::ConfigInvalid(format!(
                    "currencies.{id}.min_deposit_amount must be >= 0"
                )));
            }
        }
        Ok(())
    }

    pub fn currency(&self, id: &str) -> Option<&Currency> {
        self.currencies.iter().find(|c| c.id == id)
    }

    /// Stable fingerprint of the effective config, logged at startup.
    pub fn config_hash(&self) -> Result<String> {
        let json = serde_json::to_value(self)
            .map_err(|e| Error::ConfigInvalid(format!("json: {e}")))?;
        let canonical = serde_json_canonicalizer::to_vec(&json)
            .map_err(|e| Error::ConfigInvalid(format!("canonical-json: {e}")))?;
        let mut hasher = Sha256::new();
        hasher.update(canonical);
        Ok(format!("{:x}", hasher.finalize()))
    }
}
