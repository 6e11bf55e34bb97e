use amm_domain::prelude::{Address, EventId, TokenAmount, TxHash};
use serde::{Deserialize, Serialize};

/// Block and transaction metadata attached to every emitted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    pub tx_hash: TxHash,
    pub log_index: u64,
    pub block_number: u64,
    pub timestamp: u64,
}

/// The exchange contracts' event surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolEvent {
    PoolCreated {
        pool: Address,
        token0: Address,
        token1: Address,
    },
    LiquidityAdded {
        pool: Address,
        provider: Address,
        amount0: TokenAmount,
        amount1: TokenAmount,
        liquidity_minted: TokenAmount,
    },
    LiquidityRemoved {
        pool: Address,
        provider: Address,
        amount0: TokenAmount,
        amount1: TokenAmount,
        liquidity_burned: TokenAmount,
    },
    LiquiditySwapped {
        pool: Address,
        provider: Address,
        token_in: Address,
        amount_in: TokenAmount,
        token_out: Address,
        amount_out: TokenAmount,
    },
}

impl PoolEvent {
    /// The pool this event addresses. Order must be preserved per pool.
    #[must_use]
    pub fn pool(&self) -> &Address {
        match self {
            Self::PoolCreated { pool, .. }
            | Self::LiquidityAdded { pool, .. }
            | Self::LiquidityRemoved { pool, .. }
            | Self::LiquiditySwapped { pool, .. } => pool,
        }
    }
}

/// One event as delivered by the feed: payload plus emission metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub meta: EventMeta,
    pub body: PoolEvent,
}

impl LedgerEvent {
    /// The event's write-once identity, (tx hash, log index).
    #[must_use]
    pub fn id(&self) -> EventId {
        EventId::new(self.meta.tx_hash.clone(), self.meta.log_index)
    }
}
