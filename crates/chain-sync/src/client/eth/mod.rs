//! Ethereum JSON-RPC chain client: native ether transfers and ERC-20
//! `Transfer` events.

mod client;
pub mod codec;
pub mod transport;

pub use client::{EthChainClient, TRANSFER_EVENT_TOPIC, from_base_units};
pub use transport::JsonRpcTransport;
#[cfg(feature = "http")]
pub use transport::HttpTransport;
