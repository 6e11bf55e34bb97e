//! In-process ledger used by tests and local development.
//!
//! Implements the full reader/writer surface over plain data structures:
//! ERC20-style balances and allowances, factory pool creation, and
//! constant-product swap pricing with the fixed 30 bps fee. The pricing
//! lives here, behind the contract boundary, so the control plane only
//! ever observes its effects.

use crate::events::{EventMeta, LedgerEvent, PoolEvent};
use crate::receipt::Receipt;
use crate::{ContractCall, LedgerError, LedgerReader, LedgerWriter, TokenMetadata};
use amm_domain::prelude::{Address, POOL_FEE_BPS, TokenAmount, TxHash, canonical_pair};
use async_trait::async_trait;
use primitive_types::U256;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

const BPS: u64 = 10_000;
const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

#[derive(Debug, Default)]
struct TokenState {
    symbol: Option<String>,
    name: Option<String>,
    decimals: Option<u8>,
    total_supply: U256,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
}

impl TokenState {
    fn balance(&self, owner: &Address) -> U256 {
        self.balances.get(owner).copied().unwrap_or_default()
    }

    fn credit(&mut self, owner: &Address, amount: U256) {
        let entry = self.balances.entry(owner.clone()).or_default();
        *entry = entry.saturating_add(amount);
    }

    fn debit(&mut self, owner: &Address, amount: U256) -> Result<(), LedgerError> {
        let balance = self.balance(owner);
        if balance < amount {
            return Err(LedgerError::Reverted(format!(
                "insufficient balance: {balance} < {amount}"
            )));
        }
        self.balances.insert(owner.clone(), balance - amount);
        Ok(())
    }

    fn spend_allowance(
        &mut self,
        owner: &Address,
        spender: &Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        let key = (owner.clone(), spender.clone());
        let allowance = self.allowances.get(&key).copied().unwrap_or_default();
        if allowance < amount {
            return Err(LedgerError::Reverted(format!(
                "insufficient allowance: {allowance} < {amount}"
            )));
        }
        self.allowances.insert(key, allowance - amount);
        Ok(())
    }
}

#[derive(Debug)]
struct PoolState {
    token0: Address,
    token1: Address,
    reserve0: U256,
    reserve1: U256,
    lp_token: Address,
}

#[derive(Debug, Default)]
struct Inner {
    block_number: u64,
    address_seq: u64,
    tx_seq: u64,
    nonces: HashMap<Address, u64>,
    tokens: HashMap<Address, TokenState>,
    pools: HashMap<Address, PoolState>,
    pairs: HashMap<(Address, Address), Address>,
    events: Vec<LedgerEvent>,
    receipts: HashMap<TxHash, Receipt>,
}

impl Inner {
    fn fresh_address(&mut self) -> Address {
        self.address_seq += 1;
        Address::from_low_u64(0x1000 + self.address_seq)
    }

    fn fresh_tx_hash(&mut self) -> TxHash {
        self.tx_seq += 1;
        TxHash::new(format!("0x{:064x}", self.tx_seq))
    }

    fn token_mut(&mut self, address: &Address) -> Result<&mut TokenState, LedgerError> {
        self.tokens
            .get_mut(address)
            .ok_or_else(|| LedgerError::UnknownContract(address.clone()))
    }

    fn token(&self, address: &Address) -> Result<&TokenState, LedgerError> {
        self.tokens
            .get(address)
            .ok_or_else(|| LedgerError::UnknownContract(address.clone()))
    }

    fn pool(&self, address: &Address) -> Result<&PoolState, LedgerError> {
        self.pools
            .get(address)
            .ok_or_else(|| LedgerError::UnknownContract(address.clone()))
    }

    /// transferFrom: spends the owner's allowance for `spender`, then moves
    /// the balance.
    fn transfer_from(
        &mut self,
        token: &Address,
        owner: &Address,
        spender: &Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        let state = self.token_mut(token)?;
        state.spend_allowance(owner, spender, amount)?;
        state.debit(owner, amount)?;
        state.credit(spender, amount);
        Ok(())
    }

    fn transfer(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        let state = self.token_mut(token)?;
        state.debit(from, amount)?;
        state.credit(to, amount);
        Ok(())
    }
}

/// An in-process stand-in for the dev chain: single-block-per-transaction,
/// strict nonce checking, synchronous confirmation.
pub struct MemoryLedger {
    signer: Address,
    inner: Mutex<Inner>,
}

impl MemoryLedger {
    /// Creates a ledger whose writer is bound to `signer`, mirroring a
    /// wallet-bound contract handle.
    #[must_use]
    pub fn new(signer: Address) -> Self {
        Self {
            signer,
            inner: Mutex::new(Inner::default()),
        }
    }

    #[must_use]
    pub fn signer(&self) -> &Address {
        &self.signer
    }

    /// Deploys an ERC20-style token and mints the initial supply to the
    /// signer.
    pub async fn deploy_token(
        &self,
        symbol: &str,
        name: &str,
        decimals: u8,
        initial_supply: TokenAmount,
    ) -> Address {
        let mut inner = self.inner.lock().await;
        let address = inner.fresh_address();
        let mut state = TokenState {
            symbol: Some(symbol.to_string()),
            name: Some(name.to_string()),
            decimals: Some(decimals),
            total_supply: initial_supply.0,
            ..TokenState::default()
        };
        let signer = self.signer.clone();
        state.credit(&signer, initial_supply.0);
        inner.tokens.insert(address.clone(), state);
        debug!(token = %address, symbol, "Deployed token");
        address
    }

    /// Snapshot of every event emitted so far, in emission order.
    pub async fn events(&self) -> Vec<LedgerEvent> {
        self.inner.lock().await.events.clone()
    }

    fn execute(
        inner: &mut Inner,
        signer: &Address,
        call: ContractCall,
    ) -> Result<Vec<PoolEvent>, LedgerError> {
        match call {
            ContractCall::CreatePool { token0, token1 } => {
                if !inner.tokens.contains_key(&token0) || !inner.tokens.contains_key(&token1) {
                    return Err(LedgerError::Reverted("unknown token".into()));
                }
                let (token0, token1) = canonical_pair(token0, token1);
                if token0 == token1 {
                    return Err(LedgerError::Reverted("identical tokens".into()));
                }
                let key = (token0.clone(), token1.clone());
                if inner.pairs.contains_key(&key) {
                    return Err(LedgerError::Reverted("pool exists".into()));
                }
                let pool = inner.fresh_address();
                let lp_token = inner.fresh_address();
                inner.tokens.insert(
                    lp_token.clone(),
                    TokenState {
                        symbol: Some(format!("LP-{}", inner.pairs.len() + 1)),
                        name: Some("Pool Share".to_string()),
                        decimals: Some(18),
                        ..TokenState::default()
                    },
                );
                inner.pools.insert(
                    pool.clone(),
                    PoolState {
                        token0: token0.clone(),
                        token1: token1.clone(),
                        reserve0: U256::zero(),
                        reserve1: U256::zero(),
                        lp_token,
                    },
                );
                inner.pairs.insert(key, pool.clone());
                Ok(vec![PoolEvent::PoolCreated {
                    pool,
                    token0,
                    token1,
                }])
            }
            ContractCall::AddLiquidity {
                pool,
                amount0,
                amount1,
            } => {
                let state = inner.pool(&pool)?;
                let (token0, token1, lp_token) = (
                    state.token0.clone(),
                    state.token1.clone(),
                    state.lp_token.clone(),
                );
                let (reserve0, reserve1) = (state.reserve0, state.reserve1);
                let total_supply = inner.token(&lp_token)?.total_supply;

                let minted = if total_supply.is_zero() {
                    integer_sqrt(amount0.0.saturating_mul(amount1.0))
                } else {
                    if reserve0.is_zero() || reserve1.is_zero() {
                        return Err(LedgerError::Reverted("empty reserves".into()));
                    }
                    let share0 = amount0
                        .0
                        .checked_mul(total_supply)
                        .ok_or_else(|| LedgerError::Reverted("amount overflow".into()))?
                        / reserve0;
                    let share1 = amount1
                        .0
                        .checked_mul(total_supply)
                        .ok_or_else(|| LedgerError::Reverted("amount overflow".into()))?
                        / reserve1;
                    share0.min(share1)
                };
                if minted.is_zero() {
                    return Err(LedgerError::Reverted("insufficient liquidity minted".into()));
                }

                inner.transfer_from(&token0, signer, &pool, amount0.0)?;
                inner.transfer_from(&token1, signer, &pool, amount1.0)?;

                let lp = inner.token_mut(&lp_token)?;
                lp.total_supply = lp.total_supply.saturating_add(minted);
                lp.credit(signer, minted);

                let pool_state = inner.pools.get_mut(&pool).expect("pool checked above");
                pool_state.reserve0 += amount0.0;
                pool_state.reserve1 += amount1.0;

                Ok(vec![PoolEvent::LiquidityAdded {
                    pool,
                    provider: signer.clone(),
                    amount0,
                    amount1,
                    liquidity_minted: TokenAmount(minted),
                }])
            }
            ContractCall::RemoveLiquidity { pool, shares } => {
                let state = inner.pool(&pool)?;
                let (token0, token1, lp_token) = (
                    state.token0.clone(),
                    state.token1.clone(),
                    state.lp_token.clone(),
                );
                let (reserve0, reserve1) = (state.reserve0, state.reserve1);
                let total_supply = inner.token(&lp_token)?.total_supply;
                if total_supply.is_zero() || shares.0 > total_supply {
                    return Err(LedgerError::Reverted("insufficient total supply".into()));
                }

                let amount0 = shares.0.saturating_mul(reserve0) / total_supply;
                let amount1 = shares.0.saturating_mul(reserve1) / total_supply;

                let lp = inner.token_mut(&lp_token)?;
                lp.debit(signer, shares.0)?;
                lp.total_supply -= shares.0;

                inner.transfer(&token0, &pool, signer, amount0)?;
                inner.transfer(&token1, &pool, signer, amount1)?;

                let pool_state = inner.pools.get_mut(&pool).expect("pool checked above");
                pool_state.reserve0 -= amount0;
                pool_state.reserve1 -= amount1;

                Ok(vec![PoolEvent::LiquidityRemoved {
                    pool,
                    provider: signer.clone(),
                    amount0: TokenAmount(amount0),
                    amount1: TokenAmount(amount1),
                    liquidity_burned: shares,
                }])
            }
            ContractCall::Swap {
                pool,
                token_in,
                amount_in,
            } => {
                let state = inner.pool(&pool)?;
                let (token0, token1) = (state.token0.clone(), state.token1.clone());
                if token_in != token0 && token_in != token1 {
                    return Err(LedgerError::Reverted("token not in pool".into()));
                }
                let token_out = if token_in == token0 {
                    token1.clone()
                } else {
                    token0.clone()
                };
                let (reserve_in, reserve_out) = if token_in == token0 {
                    (state.reserve0, state.reserve1)
                } else {
                    (state.reserve1, state.reserve0)
                };

                let amount_out = swap_output(amount_in.0, reserve_in, reserve_out)?;
                if amount_out.is_zero() {
                    return Err(LedgerError::Reverted("insufficient output".into()));
                }

                inner.transfer_from(&token_in, signer, &pool, amount_in.0)?;
                inner.transfer(&token_out, &pool, signer, amount_out)?;

                let pool_state = inner.pools.get_mut(&pool).expect("pool checked above");
                if token_in == pool_state.token0 {
                    pool_state.reserve0 += amount_in.0;
                    pool_state.reserve1 -= amount_out;
                } else {
                    pool_state.reserve1 += amount_in.0;
                    pool_state.reserve0 -= amount_out;
                }

                Ok(vec![PoolEvent::LiquiditySwapped {
                    pool,
                    provider: signer.clone(),
                    token_in,
                    amount_in,
                    token_out,
                    amount_out: TokenAmount(amount_out),
                }])
            }
            ContractCall::Approve {
                token,
                spender,
                amount,
            } => {
                let signer = signer.clone();
                let state = inner.token_mut(&token)?;
                state.allowances.insert((signer, spender), amount.0);
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl LedgerWriter for MemoryLedger {
    async fn submit(&self, call: ContractCall, nonce: u64) -> Result<TxHash, LedgerError> {
        let mut inner = self.inner.lock().await;

        let expected = inner.nonces.get(&self.signer).copied().unwrap_or(0);
        if nonce != expected {
            return Err(LedgerError::NonceMismatch {
                submitted: nonce,
                expected,
            });
        }
        inner.nonces.insert(self.signer.clone(), expected + 1);

        inner.block_number += 1;
        let block_number = inner.block_number;
        let timestamp = GENESIS_TIMESTAMP + block_number;
        let tx_hash = inner.fresh_tx_hash();

        let bodies = Self::execute(&mut inner, &self.signer, call)?;

        let logs: Vec<LedgerEvent> = bodies
            .into_iter()
            .enumerate()
            .map(|(log_index, body)| LedgerEvent {
                meta: EventMeta {
                    tx_hash: tx_hash.clone(),
                    log_index: log_index as u64,
                    block_number,
                    timestamp,
                },
                body,
            })
            .collect();

        inner.events.extend(logs.iter().cloned());
        inner.receipts.insert(
            tx_hash.clone(),
            Receipt {
                tx_hash: tx_hash.clone(),
                block_number,
                logs,
            },
        );

        debug!(tx = %tx_hash, nonce, block = block_number, "Transaction mined");
        Ok(tx_hash)
    }

    async fn await_receipt(&self, tx_hash: &TxHash) -> Result<Receipt, LedgerError> {
        self.inner
            .lock()
            .await
            .receipts
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownTransaction(tx_hash.clone()))
    }
}

#[async_trait]
impl LedgerReader for MemoryLedger {
    async fn transaction_count(&self, account: &Address) -> Result<u64, LedgerError> {
        Ok(self
            .inner
            .lock()
            .await
            .nonces
            .get(account)
            .copied()
            .unwrap_or(0))
    }

    async fn pool_for_pair(
        &self,
        token0: &Address,
        token1: &Address,
    ) -> Result<Option<Address>, LedgerError> {
        let key = canonical_pair(token0.clone(), token1.clone());
        Ok(self.inner.lock().await.pairs.get(&key).cloned())
    }

    async fn pool_tokens(&self, pool: &Address) -> Result<(Address, Address), LedgerError> {
        let inner = self.inner.lock().await;
        let state = inner.pool(pool)?;
        Ok((state.token0.clone(), state.token1.clone()))
    }

    async fn reserves(&self, pool: &Address) -> Result<(TokenAmount, TokenAmount), LedgerError> {
        let inner = self.inner.lock().await;
        let state = inner.pool(pool)?;
        Ok((TokenAmount(state.reserve0), TokenAmount(state.reserve1)))
    }

    async fn lp_token(&self, pool: &Address) -> Result<Address, LedgerError> {
        let inner = self.inner.lock().await;
        Ok(inner.pool(pool)?.lp_token.clone())
    }

    async fn balance_of(
        &self,
        token: &Address,
        owner: &Address,
    ) -> Result<TokenAmount, LedgerError> {
        let inner = self.inner.lock().await;
        Ok(TokenAmount(inner.token(token)?.balance(owner)))
    }

    async fn allowance(
        &self,
        token: &Address,
        owner: &Address,
        spender: &Address,
    ) -> Result<TokenAmount, LedgerError> {
        let inner = self.inner.lock().await;
        let state = inner.token(token)?;
        Ok(TokenAmount(
            state
                .allowances
                .get(&(owner.clone(), spender.clone()))
                .copied()
                .unwrap_or_default(),
        ))
    }

    async fn total_supply(&self, token: &Address) -> Result<TokenAmount, LedgerError> {
        let inner = self.inner.lock().await;
        Ok(TokenAmount(inner.token(token)?.total_supply))
    }

    async fn decimals(&self, token: &Address) -> Result<u8, LedgerError> {
        let inner = self.inner.lock().await;
        inner
            .token(token)?
            .decimals
            .ok_or_else(|| LedgerError::Decode("decimals unavailable".into()))
    }

    async fn token_metadata(&self, token: &Address) -> Result<TokenMetadata, LedgerError> {
        let inner = self.inner.lock().await;
        let state = inner.token(token)?;
        Ok(TokenMetadata {
            symbol: state.symbol.clone(),
            name: state.name.clone(),
            decimals: state.decimals,
            total_supply: TokenAmount(state.total_supply),
        })
    }

    async fn pool_created_events(&self) -> Result<Vec<LedgerEvent>, LedgerError> {
        Ok(self
            .inner
            .lock()
            .await
            .events
            .iter()
            .filter(|e| matches!(e.body, PoolEvent::PoolCreated { .. }))
            .cloned()
            .collect())
    }
}

/// Constant-product output with the pool fee applied to the input:
/// `dy = y * dx' / (x + dx')` where `dx' = dx * (10000 - fee) / 10000`.
fn swap_output(amount_in: U256, reserve_in: U256, reserve_out: U256) -> Result<U256, LedgerError> {
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(LedgerError::Reverted("empty reserves".into()));
    }
    let amount_in_with_fee = amount_in
        .checked_mul(U256::from(BPS - u64::from(POOL_FEE_BPS)))
        .ok_or_else(|| LedgerError::Reverted("amount overflow".into()))?;
    let numerator = amount_in_with_fee
        .checked_mul(reserve_out)
        .ok_or_else(|| LedgerError::Reverted("amount overflow".into()))?;
    let denominator = reserve_in
        .checked_mul(U256::from(BPS))
        .ok_or_else(|| LedgerError::Reverted("amount overflow".into()))?
        .checked_add(amount_in_with_fee)
        .ok_or_else(|| LedgerError::Reverted("amount overflow".into()))?;
    Ok(numerator / denominator)
}

/// Babylonian integer square root, used for the first liquidity mint.
fn integer_sqrt(value: U256) -> U256 {
    if value.is_zero() {
        return U256::zero();
    }
    let two = U256::from(2u64);
    let mut x = value;
    let mut y = (x + U256::one()) / two;
    while y < x {
        x = y;
        y = (x + value / x) / two;
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> Address {
        Address::from_low_u64(0xbeef)
    }

    async fn ledger_with_pool() -> (MemoryLedger, Address, Address, Address) {
        let ledger = MemoryLedger::new(signer());
        let token_a = ledger
            .deploy_token("TKA", "Token A", 18, TokenAmount::from(1_000_000u64))
            .await;
        let token_b = ledger
            .deploy_token("TKB", "Token B", 18, TokenAmount::from(1_000_000u64))
            .await;
        let tx = ledger
            .submit(
                ContractCall::CreatePool {
                    token0: token_a.clone(),
                    token1: token_b.clone(),
                },
                0,
            )
            .await
            .unwrap();
        let receipt = ledger.await_receipt(&tx).await.unwrap();
        let (pool, _, _) = receipt.find_pool_created().unwrap();
        (ledger, pool, token_a, token_b)
    }

    #[tokio::test]
    async fn test_create_pool_emits_event_and_registers_pair() {
        let (ledger, pool, token_a, token_b) = ledger_with_pool().await;

        assert_eq!(
            ledger.pool_for_pair(&token_a, &token_b).await.unwrap(),
            Some(pool.clone())
        );
        // Reversed argument order resolves to the same pool.
        assert_eq!(
            ledger.pool_for_pair(&token_b, &token_a).await.unwrap(),
            Some(pool)
        );
    }

    #[tokio::test]
    async fn test_duplicate_pool_reverts() {
        let (ledger, _, token_a, token_b) = ledger_with_pool().await;
        let err = ledger
            .submit(
                ContractCall::CreatePool {
                    token0: token_b,
                    token1: token_a,
                },
                1,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Reverted(_)));
    }

    #[tokio::test]
    async fn test_nonce_mismatch_is_rejected() {
        let (ledger, _, token_a, _) = ledger_with_pool().await;
        let err = ledger
            .submit(
                ContractCall::Approve {
                    token: token_a,
                    spender: signer(),
                    amount: TokenAmount::from(1u64),
                },
                5,
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::NonceMismatch {
                submitted: 5,
                expected: 1
            }
        );
    }

    #[tokio::test]
    async fn test_add_liquidity_requires_allowance() {
        let (ledger, pool, token_a, token_b) = ledger_with_pool().await;

        let err = ledger
            .submit(
                ContractCall::AddLiquidity {
                    pool: pool.clone(),
                    amount0: TokenAmount::from(1000u64),
                    amount1: TokenAmount::from(1000u64),
                },
                1,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Reverted(_)));

        for (nonce, token) in [(2u64, &token_a), (3u64, &token_b)] {
            ledger
                .submit(
                    ContractCall::Approve {
                        token: token.clone(),
                        spender: pool.clone(),
                        amount: TokenAmount::from(1000u64),
                    },
                    nonce,
                )
                .await
                .unwrap();
        }
        ledger
            .submit(
                ContractCall::AddLiquidity {
                    pool: pool.clone(),
                    amount0: TokenAmount::from(1000u64),
                    amount1: TokenAmount::from(1000u64),
                },
                4,
            )
            .await
            .unwrap();

        let (r0, r1) = ledger.reserves(&pool).await.unwrap();
        assert_eq!(r0, TokenAmount::from(1000u64));
        assert_eq!(r1, TokenAmount::from(1000u64));

        let lp = ledger.lp_token(&pool).await.unwrap();
        // sqrt(1000 * 1000) = 1000 shares on first mint.
        assert_eq!(
            ledger.balance_of(&lp, &signer()).await.unwrap(),
            TokenAmount::from(1000u64)
        );
    }

    #[tokio::test]
    async fn test_swap_moves_reserves_through_constant_product() {
        let (ledger, pool, token_a, token_b) = ledger_with_pool().await;
        for (nonce, token) in [(1u64, &token_a), (2u64, &token_b)] {
            ledger
                .submit(
                    ContractCall::Approve {
                        token: token.clone(),
                        spender: pool.clone(),
                        amount: TokenAmount::from(10_000u64),
                    },
                    nonce,
                )
                .await
                .unwrap();
        }
        ledger
            .submit(
                ContractCall::AddLiquidity {
                    pool: pool.clone(),
                    amount0: TokenAmount::from(1000u64),
                    amount1: TokenAmount::from(1000u64),
                },
                3,
            )
            .await
            .unwrap();

        ledger
            .submit(
                ContractCall::Swap {
                    pool: pool.clone(),
                    token_in: token_a.clone(),
                    amount_in: TokenAmount::from(10u64),
                },
                4,
            )
            .await
            .unwrap();

        // out = 1000 * (10 * 0.997) / (1000 + 10 * 0.997) = 9 (floored)
        let (r0, r1) = ledger.reserves(&pool).await.unwrap();
        assert_eq!(r0, TokenAmount::from(1010u64));
        assert_eq!(r1, TokenAmount::from(991u64));

        let events = ledger.events().await;
        let swapped = events
            .iter()
            .find(|e| matches!(e.body, PoolEvent::LiquiditySwapped { .. }))
            .unwrap();
        match &swapped.body {
            PoolEvent::LiquiditySwapped {
                amount_out,
                token_out,
                ..
            } => {
                assert_eq!(*amount_out, TokenAmount::from(9u64));
                assert_eq!(*token_out, token_b);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_integer_sqrt() {
        assert_eq!(integer_sqrt(U256::zero()), U256::zero());
        assert_eq!(integer_sqrt(U256::from(1u64)), U256::from(1u64));
        assert_eq!(integer_sqrt(U256::from(99u64)), U256::from(9u64));
        assert_eq!(integer_sqrt(U256::from(100u64)), U256::from(10u64));
    }
}
