//! Blockchain synchronization for a custodial ledger: scans blocks past a
//! per-chain watermark, extracts deposits into known addresses, reconciles
//! outstanding withdrawals, and commits each block atomically to a ledger.

pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod store;

pub use client::ChainClient;
pub use config::ChainConfig;
pub use error::{Error, Result};
pub use ingest::{BatchOutcome, BatchReport, SingleBlockOutcome, SyncEngine};
