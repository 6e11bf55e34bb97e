//! Best-effort read surface over the ledger and the store.
//!
//! Listings aggregate many independent live reads; one pool or token
//! failing to resolve must not take the whole listing down. Failing items
//! are dropped with a warning and the caller gets the partial list.

use amm_domain::prelude::{Address, TokenAmount};
use amm_ledger::prelude::{LedgerError, LedgerReader, PoolEvent};
use amm_store::{EntityStore, StoreError};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Live snapshot of one pool, with wallet-specific share holdings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolSummary {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub token0_symbol: String,
    pub token1_symbol: String,
    pub reserve0: TokenAmount,
    pub reserve1: TokenAmount,
    pub lp_token: Address,
    pub lp_symbol: String,
    pub lp_balance: TokenAmount,
    pub lp_total_supply: TokenAmount,
}

/// A known token enriched with live wallet balance and supply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenSummary {
    pub address: Address,
    pub symbol: String,
    pub name: Option<String>,
    pub decimals: Option<u8>,
    pub balance: TokenAmount,
    pub total_supply: TokenAmount,
}

/// Read-only pool and token listings.
pub struct PoolRegistry {
    ledger: Arc<dyn LedgerReader>,
    store: Arc<dyn EntityStore>,
}

impl PoolRegistry {
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerReader>, store: Arc<dyn EntityStore>) -> Self {
        Self { ledger, store }
    }

    /// Lists every pool ever created, with live reserves and the wallet's
    /// share holdings. Pools whose reads fail are dropped.
    ///
    /// # Errors
    /// Fails only when the creation-event enumeration itself fails.
    pub async fn list_pools(&self, wallet: &Address) -> Result<Vec<PoolSummary>, LedgerError> {
        let events = self.ledger.pool_created_events().await?;

        let mut summaries = Vec::with_capacity(events.len());
        for event in events {
            let PoolEvent::PoolCreated {
                pool,
                token0,
                token1,
            } = event.body
            else {
                continue;
            };
            match self.summarize_pool(wallet, &pool, token0, token1).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => warn!(%pool, error = %e, "Dropping unreadable pool from listing"),
            }
        }
        Ok(summaries)
    }

    /// Lists the tokens known to the store, enriched with the wallet's
    /// live balance and the live total supply. Tokens whose live reads
    /// fail are dropped.
    ///
    /// # Errors
    /// Fails only when the store read itself fails.
    pub async fn list_tokens(&self, wallet: &Address) -> Result<Vec<TokenSummary>, StoreError> {
        let tokens = self.store.list_tokens().await?;

        let mut summaries = Vec::with_capacity(tokens.len());
        for token in tokens {
            let live = async {
                let balance = self.ledger.balance_of(&token.address, wallet).await?;
                let total_supply = self.ledger.total_supply(&token.address).await?;
                Ok::<_, LedgerError>((balance, total_supply))
            }
            .await;
            match live {
                Ok((balance, total_supply)) => summaries.push(TokenSummary {
                    symbol: token.display_symbol().to_string(),
                    address: token.address,
                    name: token.name,
                    decimals: token.decimals,
                    balance,
                    total_supply,
                }),
                Err(e) => {
                    warn!(token = %token.address, error = %e, "Dropping unreadable token from listing");
                }
            }
        }
        Ok(summaries)
    }

    /// Single live balance read.
    ///
    /// # Errors
    /// Propagates the ledger failure.
    pub async fn wallet_balance(
        &self,
        wallet: &Address,
        token: &Address,
    ) -> Result<TokenAmount, LedgerError> {
        self.ledger.balance_of(token, wallet).await
    }

    async fn summarize_pool(
        &self,
        wallet: &Address,
        pool: &Address,
        token0: Address,
        token1: Address,
    ) -> Result<PoolSummary, LedgerError> {
        let (reserve0, reserve1) = self.ledger.reserves(pool).await?;
        let lp_token = self.ledger.lp_token(pool).await?;
        let lp_balance = self.ledger.balance_of(&lp_token, wallet).await?;
        let lp_total_supply = self.ledger.total_supply(&lp_token).await?;

        Ok(PoolSummary {
            address: pool.clone(),
            token0_symbol: self.symbol_or_address(&token0).await,
            token1_symbol: self.symbol_or_address(&token1).await,
            lp_symbol: self.symbol_or_address(&lp_token).await,
            token0,
            token1,
            reserve0,
            reserve1,
            lp_token,
            lp_balance,
            lp_total_supply,
        })
    }

    /// Symbol lookup never fails a listing; an unresolvable symbol falls
    /// back to the address itself.
    async fn symbol_or_address(&self, token: &Address) -> String {
        match self.ledger.token_metadata(token).await {
            Ok(metadata) => metadata.symbol.unwrap_or_else(|| token.to_string()),
            Err(_) => token.to_string(),
        }
    }
}
