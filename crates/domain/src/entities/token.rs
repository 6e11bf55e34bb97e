use crate::value_objects::address::Address;
use serde::{Deserialize, Serialize};

/// A token known to the indexed view. Metadata is best effort: events carry
/// only the address, so symbol/name/decimals may stay absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<u8>,
}

impl Token {
    pub fn new(
        address: Address,
        symbol: impl Into<String>,
        name: impl Into<String>,
        decimals: u8,
    ) -> Self {
        Self {
            address,
            symbol: Some(symbol.into()),
            name: Some(name.into()),
            decimals: Some(decimals),
        }
    }

    /// A token with nothing but its address, as created from event replay.
    #[must_use]
    pub fn stub(address: Address) -> Self {
        Self {
            address,
            symbol: None,
            name: None,
            decimals: None,
        }
    }

    /// Symbol for display, falling back to the address when unresolved.
    #[must_use]
    pub fn display_symbol(&self) -> &str {
        self.symbol.as_deref().unwrap_or_else(|| self.address.as_str())
    }
}
