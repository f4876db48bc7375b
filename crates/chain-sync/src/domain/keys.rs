use serde::{Deserialize, Serialize};

use crate::domain::types::CurrencyId;

/// Identity of a credited deposit. `txout` separates transfers inside one
/// transaction; it is 0 for native transfers and the log index for tokens.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    pub txid: String,
    pub txout: u64,
    pub address: String,
    pub currency: CurrencyId,
}
