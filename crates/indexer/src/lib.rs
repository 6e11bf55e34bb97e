//! Event-sourced reconstruction of exchange state.
//!
//! Consumes the ledger's emitted events in emission order and maintains
//! the materialized view in the entity store. Applying the same feed
//! twice, or replaying a prefix after restart, converges to the same
//! state: the write-once activity record keyed by (tx hash, log index)
//! is inserted before any state mutation, and an already-present id makes
//! the whole event a no-op.
//!
//! Order is only required per pool. Events touch disjoint entity sets per
//! pool (the pool row, its positions, its records), so independent pools
//! can be sharded across indexer instances.

use amm_domain::prelude::{
    Address, ChangeKind, ExchangeError, LiquidityChange, LiquidityPosition, Pool, Swap, Token,
    TokenAmount, swap_fee,
};
use amm_ledger::prelude::{EventMeta, LedgerEvent, PoolEvent};
use amm_store::{EntityStore, StoreError};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

/// Indexing failures.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A state transition was rejected by the domain model. The
    /// `Consistency` case (negative reserve, supply, or position balance)
    /// is fatal for the pool.
    #[error(transparent)]
    Domain(#[from] ExchangeError),
}

/// Applies the event feed to the entity store.
pub struct EventIndexer {
    store: Arc<dyn EntityStore>,
    /// Pools frozen after a consistency violation. Events for a halted
    /// pool are dropped until an operator intervenes.
    halted: Mutex<HashSet<Address>>,
}

impl EventIndexer {
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            halted: Mutex::new(HashSet::new()),
        }
    }

    /// Whether indexing for `pool` has been halted by a consistency
    /// violation.
    pub async fn is_halted(&self, pool: &Address) -> bool {
        self.halted.lock().await.contains(pool)
    }

    /// Drains an ordered feed until the sender closes. Apply failures are
    /// logged and do not stop the loop; the per-pool halt set keeps a
    /// corrupted pool from absorbing further events.
    pub async fn run(&self, mut feed: mpsc::Receiver<LedgerEvent>) {
        info!("Indexer feed started");
        while let Some(event) = feed.recv().await {
            if let Err(e) = self.apply(&event).await {
                error!(id = %event.id(), error = %e, "Failed to apply event");
            }
        }
        info!("Indexer feed closed");
    }

    /// Applies one event. Idempotent: a replayed event is a no-op.
    ///
    /// # Errors
    /// Store failures propagate; a consistency violation halts the pool
    /// and propagates.
    pub async fn apply(&self, event: &LedgerEvent) -> Result<(), IndexError> {
        let pool = event.body.pool().clone();
        if self.is_halted(&pool).await {
            warn!(%pool, id = %event.id(), "Dropping event for halted pool");
            return Ok(());
        }

        let result = match &event.body {
            PoolEvent::PoolCreated {
                pool,
                token0,
                token1,
            } => {
                self.on_pool_created(&event.meta, pool, token0, token1)
                    .await
            }
            PoolEvent::LiquidityAdded {
                pool,
                provider,
                amount0,
                amount1,
                liquidity_minted,
            } => {
                self.on_liquidity_changed(
                    event,
                    pool,
                    provider,
                    *amount0,
                    *amount1,
                    *liquidity_minted,
                    ChangeKind::Add,
                )
                .await
            }
            PoolEvent::LiquidityRemoved {
                pool,
                provider,
                amount0,
                amount1,
                liquidity_burned,
            } => {
                self.on_liquidity_changed(
                    event,
                    pool,
                    provider,
                    *amount0,
                    *amount1,
                    *liquidity_burned,
                    ChangeKind::Remove,
                )
                .await
            }
            PoolEvent::LiquiditySwapped {
                pool,
                provider,
                token_in,
                amount_in,
                token_out,
                amount_out,
            } => {
                self.on_swapped(
                    event, pool, provider, token_in, *amount_in, token_out, *amount_out,
                )
                .await
            }
        };

        if let Err(IndexError::Domain(ExchangeError::Consistency { .. })) = &result {
            error!(
                %pool,
                id = %event.id(),
                "Consistency violation, halting indexing for pool"
            );
            self.halted.lock().await.insert(pool);
        }
        result
    }

    /// Pool creation: registers the pool and both tokens. An already-known
    /// pool address means the event was applied before.
    async fn on_pool_created(
        &self,
        meta: &EventMeta,
        pool: &Address,
        token0: &Address,
        token1: &Address,
    ) -> Result<(), IndexError> {
        if self.store.get_pool(pool).await?.is_some() {
            debug!(%pool, "Pool already indexed, skipping");
            return Ok(());
        }

        self.ensure_token(token0).await?;
        self.ensure_token(token1).await?;
        self.store
            .save_pool(&Pool::new(
                pool.clone(),
                token0.clone(),
                token1.clone(),
                meta.timestamp,
                meta.block_number,
            ))
            .await?;

        info!(%pool, %token0, %token1, block = meta.block_number, "Indexed new pool");
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn on_liquidity_changed(
        &self,
        event: &LedgerEvent,
        pool: &Address,
        provider: &Address,
        amount0: TokenAmount,
        amount1: TokenAmount,
        liquidity: TokenAmount,
        kind: ChangeKind,
    ) -> Result<(), IndexError> {
        let Some(mut state) = self.store.get_pool(pool).await? else {
            warn!(%pool, id = %event.id(), "Dropping liquidity event for unknown pool");
            return Ok(());
        };

        let record = LiquidityChange {
            id: event.id(),
            user: provider.clone(),
            pool: pool.clone(),
            kind,
            token0_amount: amount0,
            token1_amount: amount1,
            liquidity_amount: liquidity,
            timestamp: event.meta.timestamp,
        };
        if !self.store.insert_liquidity_change(&record).await? {
            debug!(id = %record.id, "Liquidity event already applied, skipping");
            return Ok(());
        }

        let mut position = self
            .store
            .get_position(provider, pool)
            .await?
            .unwrap_or_else(|| {
                LiquidityPosition::new(provider.clone(), pool.clone(), event.meta.timestamp)
            });

        match kind {
            ChangeKind::Add => {
                state.apply_liquidity_added(amount0, amount1, liquidity)?;
                position.apply_add(amount0, amount1, liquidity, event.meta.timestamp)?;
            }
            ChangeKind::Remove => {
                state.apply_liquidity_removed(amount0, amount1, liquidity)?;
                position.apply_remove(amount0, amount1, liquidity, event.meta.timestamp)?;
            }
        }

        self.store.save_pool(&state).await?;
        self.store.save_position(&position).await?;

        debug!(
            %pool,
            user = %provider,
            %kind,
            liquidity = %liquidity,
            "Indexed liquidity change"
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn on_swapped(
        &self,
        event: &LedgerEvent,
        pool: &Address,
        provider: &Address,
        token_in: &Address,
        amount_in: TokenAmount,
        token_out: &Address,
        amount_out: TokenAmount,
    ) -> Result<(), IndexError> {
        let Some(mut state) = self.store.get_pool(pool).await? else {
            warn!(%pool, id = %event.id(), "Dropping swap event for unknown pool");
            return Ok(());
        };

        // Reporting-only fee; the pool already deducted the real one.
        let fee = swap_fee(amount_in, state.fee_bps);
        let record = Swap {
            id: event.id(),
            user: provider.clone(),
            pool: pool.clone(),
            token_in: token_in.clone(),
            token_out: token_out.clone(),
            amount_in,
            amount_out,
            fee,
            timestamp: event.meta.timestamp,
        };
        if !self.store.insert_swap(&record).await? {
            debug!(id = %record.id, "Swap event already applied, skipping");
            return Ok(());
        }

        self.ensure_token(token_in).await?;
        self.ensure_token(token_out).await?;
        state.apply_swap(token_in, amount_in, amount_out)?;
        self.store.save_pool(&state).await?;

        debug!(%pool, user = %provider, amount_in = %amount_in, fee = %fee, "Indexed swap");
        Ok(())
    }

    /// Creates an address-only token row unless one already exists.
    async fn ensure_token(&self, address: &Address) -> Result<(), IndexError> {
        if self.store.get_token(address).await?.is_none() {
            self.store.save_token(&Token::stub(address.clone())).await?;
        }
        Ok(())
    }
}
