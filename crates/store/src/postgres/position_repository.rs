//! Liquidity position persistence.

use super::{parse_address, parse_amount};
use crate::StoreError;
use amm_domain::prelude::{Address, LiquidityPosition};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;

/// Repository for (user, pool) position rows.
pub struct PositionRepository {
    pool: Arc<PgPool>,
}

impl PositionRepository {
    pub(crate) fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Fetches one position by its (user, pool) key.
    ///
    /// # Errors
    /// Returns an error if the query fails or the row does not decode.
    pub async fn find(
        &self,
        user: &Address,
        pool: &Address,
    ) -> Result<Option<LiquidityPosition>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT user_address, pool_address, balance, token0_amount,
                   token1_amount, created_at, updated_at
            FROM liquidity_positions
            WHERE user_address = $1 AND pool_address = $2
            ",
        )
        .bind(user.as_str())
        .bind(pool.as_str())
        .fetch_optional(self.pool.as_ref())
        .await?;
        row.as_ref().map(position_from_row).transpose()
    }

    /// Inserts or replaces a position row.
    ///
    /// # Errors
    /// Returns an error if the statement fails.
    pub async fn upsert(&self, position: &LiquidityPosition) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO liquidity_positions
                (user_address, pool_address, balance, token0_amount,
                 token1_amount, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_address, pool_address) DO UPDATE SET
                balance = EXCLUDED.balance,
                token0_amount = EXCLUDED.token0_amount,
                token1_amount = EXCLUDED.token1_amount,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(position.user.as_str())
        .bind(position.pool.as_str())
        .bind(position.balance.to_string())
        .bind(position.token0_amount.to_string())
        .bind(position.token1_amount.to_string())
        .bind(i64::try_from(position.created_at).unwrap_or(i64::MAX))
        .bind(i64::try_from(position.updated_at).unwrap_or(i64::MAX))
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }
}

fn position_from_row(row: &PgRow) -> Result<LiquidityPosition, StoreError> {
    let created_at: i64 = row.try_get("created_at")?;
    let updated_at: i64 = row.try_get("updated_at")?;
    Ok(LiquidityPosition {
        user: parse_address(row.try_get("user_address")?)?,
        pool: parse_address(row.try_get("pool_address")?)?,
        balance: parse_amount(row.try_get("balance")?)?,
        token0_amount: parse_amount(row.try_get("token0_amount")?)?,
        token1_amount: parse_amount(row.try_get("token1_amount")?)?,
        created_at: u64::try_from(created_at)
            .map_err(|_| StoreError::Corrupt(format!("negative created_at {created_at}")))?,
        updated_at: u64::try_from(updated_at)
            .map_err(|_| StoreError::Corrupt(format!("negative updated_at {updated_at}")))?,
    })
}
