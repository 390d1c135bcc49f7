//! Ledger result types
//!
//! These are the items a result sequence yields. They are encoded to JSON
//! before they are buffered for a page.

use crate::error::Result;
use crate::types::base64_bytes;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current value of one key, yielded by range queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    /// Namespace (chaincode) the key lives in
    pub namespace: String,
    /// State key
    pub key: String,
    /// Current value
    #[serde(with = "base64_bytes")]
    pub value: Bytes,
}

impl KeyValue {
    /// Create a key/value result
    pub fn new(namespace: impl Into<String>, key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One recorded modification of a key, yielded by history queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyModification {
    /// Transaction that wrote the value
    pub tx_id: String,
    /// Value written (empty for deletes)
    #[serde(with = "base64_bytes")]
    pub value: Bytes,
    /// Commit time of the transaction
    pub timestamp: DateTime<Utc>,
    /// Whether the transaction deleted the key
    #[serde(default)]
    pub is_delete: bool,
}

impl KeyModification {
    /// Create a write
    pub fn write(tx_id: impl Into<String>, value: impl Into<Bytes>, timestamp: DateTime<Utc>) -> Self {
        Self {
            tx_id: tx_id.into(),
            value: value.into(),
            timestamp,
            is_delete: false,
        }
    }

    /// Create a delete marker
    pub fn delete(tx_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            tx_id: tx_id.into(),
            value: Bytes::new(),
            timestamp,
            is_delete: true,
        }
    }
}

/// An item produced by a result sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryResult {
    /// Range query item
    State(KeyValue),
    /// History query item
    History(KeyModification),
}

impl QueryResult {
    /// Decode an item from its wire bytes
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Value carried by the item
    pub fn value(&self) -> &Bytes {
        match self {
            Self::State(kv) => &kv.value,
            Self::History(modification) => &modification.value,
        }
    }
}

impl From<KeyValue> for QueryResult {
    fn from(kv: KeyValue) -> Self {
        Self::State(kv)
    }
}

impl From<KeyModification> for QueryResult {
    fn from(modification: KeyModification) -> Self {
        Self::History(modification)
    }
}

/// Half-open key range `[start, end)`; an empty `end` is unbounded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    /// First key included
    #[serde(default)]
    pub start: String,
    /// First key excluded (empty = no upper bound)
    #[serde(default)]
    pub end: String,
}

impl KeyRange {
    /// Create a range
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Range covering every key
    pub fn all() -> Self {
        Self::default()
    }

    /// Check whether a key falls inside the range
    pub fn contains(&self, key: &str) -> bool {
        key >= self.start.as_str() && (self.end.is_empty() || key < self.end.as_str())
    }
}
