//! Token metadata persistence.

use super::parse_address;
use crate::StoreError;
use amm_domain::prelude::{Address, Token};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;

/// Repository for token rows.
pub struct TokenRepository {
    pool: Arc<PgPool>,
}

impl TokenRepository {
    pub(crate) fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Fetches one token by address.
    ///
    /// # Errors
    /// Returns an error if the query fails or the row does not decode.
    pub async fn find(&self, address: &Address) -> Result<Option<Token>, StoreError> {
        let row = sqlx::query("SELECT address, symbol, name, decimals FROM tokens WHERE address = $1")
            .bind(address.as_str())
            .fetch_optional(self.pool.as_ref())
            .await?;
        row.as_ref().map(token_from_row).transpose()
    }

    /// Fetches all known tokens, ordered by address.
    ///
    /// # Errors
    /// Returns an error if the query fails or a row does not decode.
    pub async fn all(&self) -> Result<Vec<Token>, StoreError> {
        let rows = sqlx::query("SELECT address, symbol, name, decimals FROM tokens ORDER BY address")
            .fetch_all(self.pool.as_ref())
            .await?;
        rows.iter().map(token_from_row).collect()
    }

    /// Inserts or replaces a token row. Later metadata wins: a row saved
    /// from a live lookup overwrites an earlier stub.
    ///
    /// # Errors
    /// Returns an error if the statement fails.
    pub async fn upsert(&self, token: &Token) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO tokens (address, symbol, name, decimals, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (address) DO UPDATE SET
                symbol = EXCLUDED.symbol,
                name = EXCLUDED.name,
                decimals = EXCLUDED.decimals,
                updated_at = NOW()
            ",
        )
        .bind(token.address.as_str())
        .bind(token.symbol.as_deref())
        .bind(token.name.as_deref())
        .bind(token.decimals.map(i16::from))
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }
}

fn token_from_row(row: &PgRow) -> Result<Token, StoreError> {
    let decimals: Option<i16> = row.try_get("decimals")?;
    Ok(Token {
        address: parse_address(row.try_get("address")?)?,
        symbol: row.try_get("symbol")?,
        name: row.try_get("name")?,
        decimals: decimals
            .map(|d| {
                u8::try_from(d).map_err(|_| StoreError::Corrupt(format!("bad decimals {d}")))
            })
            .transpose()?,
    })
}
