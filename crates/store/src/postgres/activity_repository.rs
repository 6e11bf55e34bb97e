//! Immutable swap and liquidity-change records.
//!
//! Inserts are write-once on the (tx hash, log index) primary key:
//! `ON CONFLICT DO NOTHING`, with the affected row count reporting
//! whether the record was new.

use super::{parse_address, parse_amount};
use crate::StoreError;
use amm_domain::prelude::{
    Address, ChangeKind, EventId, LiquidityChange, Swap, TxHash,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;

/// Repository for the append-only activity tables.
pub struct ActivityRepository {
    pool: Arc<PgPool>,
}

impl ActivityRepository {
    pub(crate) fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts a swap record. Returns `false` when the id already exists.
    ///
    /// # Errors
    /// Returns an error if the statement fails.
    pub async fn insert_swap(&self, swap: &Swap) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r"
            INSERT INTO swaps
                (tx_hash, log_index, user_address, pool_address, token_in,
                 token_out, amount_in, amount_out, fee, event_timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (tx_hash, log_index) DO NOTHING
            ",
        )
        .bind(swap.id.tx_hash.as_str())
        .bind(i64::try_from(swap.id.log_index).unwrap_or(i64::MAX))
        .bind(swap.user.as_str())
        .bind(swap.pool.as_str())
        .bind(swap.token_in.as_str())
        .bind(swap.token_out.as_str())
        .bind(swap.amount_in.to_string())
        .bind(swap.amount_out.to_string())
        .bind(swap.fee.to_string())
        .bind(i64::try_from(swap.timestamp).unwrap_or(i64::MAX))
        .execute(self.pool.as_ref())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Inserts a liquidity-change record. Returns `false` when the id
    /// already exists.
    ///
    /// # Errors
    /// Returns an error if the statement fails.
    pub async fn insert_liquidity_change(
        &self,
        change: &LiquidityChange,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r"
            INSERT INTO liquidity_changes
                (tx_hash, log_index, user_address, pool_address, kind,
                 token0_amount, token1_amount, liquidity_amount, event_timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (tx_hash, log_index) DO NOTHING
            ",
        )
        .bind(change.id.tx_hash.as_str())
        .bind(i64::try_from(change.id.log_index).unwrap_or(i64::MAX))
        .bind(change.user.as_str())
        .bind(change.pool.as_str())
        .bind(change.kind.to_string())
        .bind(change.token0_amount.to_string())
        .bind(change.token1_amount.to_string())
        .bind(change.liquidity_amount.to_string())
        .bind(i64::try_from(change.timestamp).unwrap_or(i64::MAX))
        .execute(self.pool.as_ref())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fetches all swaps against one pool in event order.
    ///
    /// # Errors
    /// Returns an error if the query fails or a row does not decode.
    pub async fn swaps_for_pool(&self, pool: &Address) -> Result<Vec<Swap>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT tx_hash, log_index, user_address, pool_address, token_in,
                   token_out, amount_in, amount_out, fee, event_timestamp
            FROM swaps
            WHERE pool_address = $1
            ORDER BY event_timestamp, tx_hash, log_index
            ",
        )
        .bind(pool.as_str())
        .fetch_all(self.pool.as_ref())
        .await?;
        rows.iter().map(swap_from_row).collect()
    }

    /// Fetches all liquidity changes against one pool in event order.
    ///
    /// # Errors
    /// Returns an error if the query fails or a row does not decode.
    pub async fn changes_for_pool(
        &self,
        pool: &Address,
    ) -> Result<Vec<LiquidityChange>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT tx_hash, log_index, user_address, pool_address, kind,
                   token0_amount, token1_amount, liquidity_amount, event_timestamp
            FROM liquidity_changes
            WHERE pool_address = $1
            ORDER BY event_timestamp, tx_hash, log_index
            ",
        )
        .bind(pool.as_str())
        .fetch_all(self.pool.as_ref())
        .await?;
        rows.iter().map(change_from_row).collect()
    }
}

fn event_id_from_row(row: &PgRow) -> Result<EventId, StoreError> {
    let tx_hash: String = row.try_get("tx_hash")?;
    let log_index: i64 = row.try_get("log_index")?;
    Ok(EventId::new(
        TxHash::new(tx_hash),
        u64::try_from(log_index)
            .map_err(|_| StoreError::Corrupt(format!("negative log_index {log_index}")))?,
    ))
}

fn swap_from_row(row: &PgRow) -> Result<Swap, StoreError> {
    let timestamp: i64 = row.try_get("event_timestamp")?;
    Ok(Swap {
        id: event_id_from_row(row)?,
        user: parse_address(row.try_get("user_address")?)?,
        pool: parse_address(row.try_get("pool_address")?)?,
        token_in: parse_address(row.try_get("token_in")?)?,
        token_out: parse_address(row.try_get("token_out")?)?,
        amount_in: parse_amount(row.try_get("amount_in")?)?,
        amount_out: parse_amount(row.try_get("amount_out")?)?,
        fee: parse_amount(row.try_get("fee")?)?,
        timestamp: u64::try_from(timestamp)
            .map_err(|_| StoreError::Corrupt(format!("negative timestamp {timestamp}")))?,
    })
}

fn change_from_row(row: &PgRow) -> Result<LiquidityChange, StoreError> {
    let kind: String = row.try_get("kind")?;
    let kind = match kind.as_str() {
        "add" => ChangeKind::Add,
        "remove" => ChangeKind::Remove,
        other => return Err(StoreError::Corrupt(format!("unknown change kind {other}"))),
    };
    let timestamp: i64 = row.try_get("event_timestamp")?;
    Ok(LiquidityChange {
        id: event_id_from_row(row)?,
        user: parse_address(row.try_get("user_address")?)?,
        pool: parse_address(row.try_get("pool_address")?)?,
        kind,
        token0_amount: parse_amount(row.try_get("token0_amount")?)?,
        token1_amount: parse_amount(row.try_get("token1_amount")?)?,
        liquidity_amount: parse_amount(row.try_get("liquidity_amount")?)?,
        timestamp: u64::try_from(timestamp)
            .map_err(|_| StoreError::Corrupt(format!("negative timestamp {timestamp}")))?,
    })
}
