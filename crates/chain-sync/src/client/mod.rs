pub mod eth;
pub mod traits;

pub use traits::ChainClient;
