//! Pool persistence.

use super::{parse_address, parse_amount};
use crate::StoreError;
use amm_domain::prelude::{Address, Pool};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;

const POOL_COLUMNS: &str =
    "address, token0, token1, reserve0, reserve1, total_supply, fee_bps, created_at, created_at_block";

/// Repository for pool rows.
pub struct PoolRepository {
    pool: Arc<PgPool>,
}

impl PoolRepository {
    pub(crate) fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Fetches one pool by address.
    ///
    /// # Errors
    /// Returns an error if the query fails or the row does not decode.
    pub async fn find(&self, address: &Address) -> Result<Option<Pool>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {POOL_COLUMNS} FROM pools WHERE address = $1"
        ))
        .bind(address.as_str())
        .fetch_optional(self.pool.as_ref())
        .await?;
        row.as_ref().map(pool_from_row).transpose()
    }

    /// Fetches all pools in creation order.
    ///
    /// # Errors
    /// Returns an error if the query fails or a row does not decode.
    pub async fn all(&self) -> Result<Vec<Pool>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {POOL_COLUMNS} FROM pools ORDER BY created_at_block, address"
        ))
        .fetch_all(self.pool.as_ref())
        .await?;
        rows.iter().map(pool_from_row).collect()
    }

    /// Inserts or replaces a pool row.
    ///
    /// # Errors
    /// Returns an error if the statement fails.
    pub async fn upsert(&self, pool: &Pool) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO pools
                (address, token0, token1, reserve0, reserve1, total_supply,
                 fee_bps, created_at, created_at_block, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (address) DO UPDATE SET
                reserve0 = EXCLUDED.reserve0,
                reserve1 = EXCLUDED.reserve1,
                total_supply = EXCLUDED.total_supply,
                updated_at = NOW()
            ",
        )
        .bind(pool.address.as_str())
        .bind(pool.token0.as_str())
        .bind(pool.token1.as_str())
        .bind(pool.reserve0.to_string())
        .bind(pool.reserve1.to_string())
        .bind(pool.total_supply.to_string())
        .bind(i32::try_from(pool.fee_bps).unwrap_or(i32::MAX))
        .bind(i64::try_from(pool.created_at).unwrap_or(i64::MAX))
        .bind(i64::try_from(pool.created_at_block).unwrap_or(i64::MAX))
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }
}

fn pool_from_row(row: &PgRow) -> Result<Pool, StoreError> {
    let fee_bps: i32 = row.try_get("fee_bps")?;
    let created_at: i64 = row.try_get("created_at")?;
    let created_at_block: i64 = row.try_get("created_at_block")?;
    Ok(Pool {
        address: parse_address(row.try_get("address")?)?,
        token0: parse_address(row.try_get("token0")?)?,
        token1: parse_address(row.try_get("token1")?)?,
        reserve0: parse_amount(row.try_get("reserve0")?)?,
        reserve1: parse_amount(row.try_get("reserve1")?)?,
        total_supply: parse_amount(row.try_get("total_supply")?)?,
        fee_bps: u32::try_from(fee_bps)
            .map_err(|_| StoreError::Corrupt(format!("negative fee_bps {fee_bps}")))?,
        created_at: u64::try_from(created_at)
            .map_err(|_| StoreError::Corrupt(format!("negative created_at {created_at}")))?,
        created_at_block: u64::try_from(created_at_block).map_err(|_| {
            StoreError::Corrupt(format!("negative created_at_block {created_at_block}"))
        })?,
    })
}
