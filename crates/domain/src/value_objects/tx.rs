use serde::{Deserialize, Serialize};
use std::fmt;

/// A ledger transaction hash, normalized to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(String);

impl TxHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into().to_ascii_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one emitted event: (transaction hash, log index).
///
/// Keys the write-once Swap and LiquidityChange records, which doubles as
/// the indexer's replay-deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId {
    pub tx_hash: TxHash,
    pub log_index: u64,
}

impl EventId {
    pub fn new(tx_hash: TxHash, log_index: u64) -> Self {
        Self { tx_hash, log_index }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.tx_hash, self.log_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_display_matches_subgraph_convention() {
        let id = EventId::new(TxHash::new("0xAB"), 3);
        assert_eq!(id.to_string(), "0xab-3");
    }
}
