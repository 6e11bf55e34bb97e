//! Core data model for the exchange control plane.
//!
//! This crate holds the entities materialized by the event indexer
//! (pools, tokens, positions, the immutable swap/liquidity audit trail),
//! the value objects shared across the workspace (addresses, base-unit
//! amounts, transaction identifiers), the pool share math, and the typed
//! error taxonomy.

/// Materialized entities.
pub mod entities;
/// Shared enums.
pub mod enums;
/// Typed errors.
pub mod errors;
/// Share and fee math.
pub mod math;
/// Prelude module for convenient imports.
pub mod prelude;
/// Value objects.
pub mod value_objects;
