use crate::events::{LedgerEvent, PoolEvent};
use amm_domain::prelude::{Address, TxHash};
use serde::{Deserialize, Serialize};

/// Receipt of a confirmed transaction with its ordered log list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub logs: Vec<LedgerEvent>,
}

impl Receipt {
    /// Scans the logs for a `PoolCreated` event and returns
    /// (pool, token0, token1).
    #[must_use]
    pub fn find_pool_created(&self) -> Option<(Address, Address, Address)> {
        self.logs.iter().find_map(|log| match &log.body {
            PoolEvent::PoolCreated {
                pool,
                token0,
                token1,
            } => Some((pool.clone(), token0.clone(), token1.clone())),
            _ => None,
        })
    }
}
