//! Entity store for the materialized exchange view.
//!
//! The indexer and the registry reader talk to storage through the
//! [`EntityStore`] trait: keyed get/save per entity plus write-once
//! inserts for the immutable audit records. Two implementations are
//! provided: [`memory::MemoryStore`] for tests and embedding, and
//! [`postgres::Database`] backed by PostgreSQL. No cross-entity
//! transactions are offered or required.

/// In-memory store.
pub mod memory;
/// PostgreSQL store.
pub mod postgres;

use amm_domain::prelude::{Address, LiquidityChange, LiquidityPosition, Pool, Swap, Token};
use async_trait::async_trait;
use thiserror::Error;

/// Storage-layer failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Keyed entity persistence.
///
/// `insert_swap` and `insert_liquidity_change` are write-once: they return
/// `false` when a record with the same (tx hash, log index) id already
/// exists, leaving the stored record untouched. The indexer uses that as
/// its replay-deduplication gate.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get_pool(&self, id: &Address) -> Result<Option<Pool>, StoreError>;
    async fn save_pool(&self, pool: &Pool) -> Result<(), StoreError>;
    async fn list_pools(&self) -> Result<Vec<Pool>, StoreError>;

    async fn get_token(&self, id: &Address) -> Result<Option<Token>, StoreError>;
    async fn save_token(&self, token: &Token) -> Result<(), StoreError>;
    async fn list_tokens(&self) -> Result<Vec<Token>, StoreError>;

    async fn get_position(
        &self,
        user: &Address,
        pool: &Address,
    ) -> Result<Option<LiquidityPosition>, StoreError>;
    async fn save_position(&self, position: &LiquidityPosition) -> Result<(), StoreError>;

    async fn insert_swap(&self, swap: &Swap) -> Result<bool, StoreError>;
    async fn insert_liquidity_change(&self, change: &LiquidityChange) -> Result<bool, StoreError>;
    async fn swaps_for_pool(&self, pool: &Address) -> Result<Vec<Swap>, StoreError>;
    async fn changes_for_pool(&self, pool: &Address) -> Result<Vec<LiquidityChange>, StoreError>;
}
