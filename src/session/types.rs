//! Session key

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a query session: one transaction on one chain
///
/// Both parts take part in equality, so `("ab", "c")` and `("a", "bc")`
/// are different sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    chain_id: String,
    tx_id: String,
}

impl SessionKey {
    /// Create a key
    pub fn new(chain_id: impl Into<String>, tx_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            tx_id: tx_id.into(),
        }
    }

    /// Chain (channel) id
    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Transaction id
    pub fn tx_id(&self) -> &str {
        &self.tx_id
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.tx_id, self.chain_id)
    }
}
