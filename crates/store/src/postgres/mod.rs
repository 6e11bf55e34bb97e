//! PostgreSQL-backed entity store.
//!
//! One repository per entity family over runtime sqlx queries. Base-unit
//! integers are stored as decimal TEXT since the store never does
//! arithmetic on them; addresses are stored normalized.

mod activity_repository;
mod pool_repository;
mod position_repository;
mod token_repository;

pub use activity_repository::ActivityRepository;
pub use pool_repository::PoolRepository;
pub use position_repository::PositionRepository;
pub use token_repository::TokenRepository;

use crate::{EntityStore, StoreError};
use amm_domain::prelude::{
    Address, LiquidityChange, LiquidityPosition, Pool, Swap, Token, TokenAmount,
};
use async_trait::async_trait;
use primitive_types::U256;
use sqlx::PgPool;
use std::sync::Arc;

pub(crate) fn parse_address(value: &str) -> Result<Address, StoreError> {
    Address::parse(value).map_err(|e| StoreError::Corrupt(e.to_string()))
}

pub(crate) fn parse_amount(value: &str) -> Result<TokenAmount, StoreError> {
    U256::from_dec_str(value)
        .map(TokenAmount)
        .map_err(|e| StoreError::Corrupt(format!("bad amount {value}: {e}")))
}

/// Database connection wrapper exposing the repositories.
#[derive(Clone)]
pub struct Database {
    pool: Arc<PgPool>,
}

impl Database {
    /// Creates a new Database wrapper from a connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Creates a new database connection from a connection string.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Runs the schema migration.
    ///
    /// # Errors
    /// Returns an error if the migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(include_str!("../../migrations/001_initial_schema.sql"))
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    #[must_use]
    pub fn pools(&self) -> PoolRepository {
        PoolRepository::new(self.pool.clone())
    }

    #[must_use]
    pub fn tokens(&self) -> TokenRepository {
        TokenRepository::new(self.pool.clone())
    }

    #[must_use]
    pub fn positions(&self) -> PositionRepository {
        PositionRepository::new(self.pool.clone())
    }

    #[must_use]
    pub fn activity(&self) -> ActivityRepository {
        ActivityRepository::new(self.pool.clone())
    }
}

#[async_trait]
impl EntityStore for Database {
    async fn get_pool(&self, id: &Address) -> Result<Option<Pool>, StoreError> {
        self.pools().find(id).await
    }

    async fn save_pool(&self, pool: &Pool) -> Result<(), StoreError> {
        self.pools().upsert(pool).await
    }

    async fn list_pools(&self) -> Result<Vec<Pool>, StoreError> {
        self.pools().all().await
    }

    async fn get_token(&self, id: &Address) -> Result<Option<Token>, StoreError> {
        self.tokens().find(id).await
    }

    async fn save_token(&self, token: &Token) -> Result<(), StoreError> {
        self.tokens().upsert(token).await
    }

    async fn list_tokens(&self) -> Result<Vec<Token>, StoreError> {
        self.tokens().all().await
    }

    async fn get_position(
        &self,
        user: &Address,
        pool: &Address,
    ) -> Result<Option<LiquidityPosition>, StoreError> {
        self.positions().find(user, pool).await
    }

    async fn save_position(&self, position: &LiquidityPosition) -> Result<(), StoreError> {
        self.positions().upsert(position).await
    }

    async fn insert_swap(&self, swap: &Swap) -> Result<bool, StoreError> {
        self.activity().insert_swap(swap).await
    }

    async fn insert_liquidity_change(&self, change: &LiquidityChange) -> Result<bool, StoreError> {
        self.activity().insert_liquidity_change(change).await
    }

    async fn swaps_for_pool(&self, pool: &Address) -> Result<Vec<Swap>, StoreError> {
        self.activity().swaps_for_pool(pool).await
    }

    async fn changes_for_pool(&self, pool: &Address) -> Result<Vec<LiquidityChange>, StoreError> {
        self.activity().changes_for_pool(pool).await
    }
}
