use std::collections::HashSet;

use crate::domain::types::Block;

/// Cheap relevance test on raw transaction fields, run before paying for
/// receipts and decoding.
#[derive(Debug, Clone, Default)]
pub struct BlockPreFilter {
    recipients: HashSet<String>,
    senders: HashSet<String>,
}

impl BlockPreFilter {
    pub fn new(
        deposit_addresses: impl IntoIterator<Item = String>,
        contract_addresses: impl IntoIterator<Item = String>,
        watch_senders: impl IntoIterator<Item = String>,
        normalize: impl Fn(&str) -> String,
    ) -> Self {
        let recipients = deposit_addresses
            .into_iter()
            .chain(contract_addresses)
            .map(|a| normalize(&a))
            .collect();
        let senders = watch_senders.into_iter().map(|a| normalize(&a)).collect();
        Self {
            recipients,
            senders,
        }
    }

    pub fn matches(&self, block: &Block, normalize: impl Fn(&str) -> String) -> bool {
        block.transactions.iter().any(|tx| {
            tx.to
                .as_deref()
                .is_some_and(|to| self.recipients.contains(&normalize(to)))
                || tx
                    .from
                    .as_deref()
                    .is_some_and(|from| self.senders.contains(&normalize(from)))
        })
    }
}
