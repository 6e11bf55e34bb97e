//! In-memory entity store for tests and embedded use.

use crate::{EntityStore, StoreError};
use amm_domain::prelude::{
    Address, EventId, LiquidityChange, LiquidityPosition, Pool, Swap, Token,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    pools: HashMap<Address, Pool>,
    tokens: HashMap<Address, Token>,
    positions: HashMap<(Address, Address), LiquidityPosition>,
    swaps: HashMap<EventId, Swap>,
    changes: HashMap<EventId, LiquidityChange>,
}

/// HashMap-backed store behind an async RwLock.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get_pool(&self, id: &Address) -> Result<Option<Pool>, StoreError> {
        Ok(self.inner.read().await.pools.get(id).cloned())
    }

    async fn save_pool(&self, pool: &Pool) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .pools
            .insert(pool.address.clone(), pool.clone());
        Ok(())
    }

    async fn list_pools(&self) -> Result<Vec<Pool>, StoreError> {
        let mut pools: Vec<Pool> = self.inner.read().await.pools.values().cloned().collect();
        pools.sort_by(|a, b| a.created_at_block.cmp(&b.created_at_block));
        Ok(pools)
    }

    async fn get_token(&self, id: &Address) -> Result<Option<Token>, StoreError> {
        Ok(self.inner.read().await.tokens.get(id).cloned())
    }

    async fn save_token(&self, token: &Token) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .tokens
            .insert(token.address.clone(), token.clone());
        Ok(())
    }

    async fn list_tokens(&self) -> Result<Vec<Token>, StoreError> {
        let mut tokens: Vec<Token> = self.inner.read().await.tokens.values().cloned().collect();
        tokens.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(tokens)
    }

    async fn get_position(
        &self,
        user: &Address,
        pool: &Address,
    ) -> Result<Option<LiquidityPosition>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .positions
            .get(&(user.clone(), pool.clone()))
            .cloned())
    }

    async fn save_position(&self, position: &LiquidityPosition) -> Result<(), StoreError> {
        self.inner.write().await.positions.insert(
            (position.user.clone(), position.pool.clone()),
            position.clone(),
        );
        Ok(())
    }

    async fn insert_swap(&self, swap: &Swap) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.swaps.contains_key(&swap.id) {
            return Ok(false);
        }
        inner.swaps.insert(swap.id.clone(), swap.clone());
        Ok(true)
    }

    async fn insert_liquidity_change(&self, change: &LiquidityChange) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.changes.contains_key(&change.id) {
            return Ok(false);
        }
        inner.changes.insert(change.id.clone(), change.clone());
        Ok(true)
    }

    async fn swaps_for_pool(&self, pool: &Address) -> Result<Vec<Swap>, StoreError> {
        let mut swaps: Vec<Swap> = self
            .inner
            .read()
            .await
            .swaps
            .values()
            .filter(|s| s.pool == *pool)
            .cloned()
            .collect();
        swaps.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));
        Ok(swaps)
    }

    async fn changes_for_pool(&self, pool: &Address) -> Result<Vec<LiquidityChange>, StoreError> {
        let mut changes: Vec<LiquidityChange> = self
            .inner
            .read()
            .await
            .changes
            .values()
            .filter(|c| c.pool == *pool)
            .cloned()
            .collect();
        changes.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));
        Ok(changes)
    }
}
