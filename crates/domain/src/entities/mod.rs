pub mod liquidity_change;
pub mod pool;
pub mod position;
pub mod swap;
pub mod token;
