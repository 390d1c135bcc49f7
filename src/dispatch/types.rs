//! Dispatch request and response types

use crate::error::{Error, Result};
use crate::pagination::PageResponse;
use crate::session::SessionKey;
use crate::types::{base64_bytes, QueryMode};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Operations
// ============================================================================

/// Named operation of the positional invocation surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Point lookup: `GetState <namespace> <key>`
    GetState,
    /// History query: `GetHistoryForKey <namespace> <key>`
    GetHistoryForKey,
    /// Range query: `GetStateByRange <namespace> <start> [end]`
    GetStateByRange,
    /// Next page: `QueryStateNext <tx id> <query id>`
    QueryStateNext,
    /// Close: `QueryStateClose <tx id> <query id>`
    QueryStateClose,
}

impl Operation {
    /// Wire name of the operation
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetState => "GetState",
            Self::GetHistoryForKey => "GetHistoryForKey",
            Self::GetStateByRange => "GetStateByRange",
            Self::QueryStateNext => "QueryStateNext",
            Self::QueryStateClose => "QueryStateClose",
        }
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GetState" => Ok(Self::GetState),
            "GetHistoryForKey" => Ok(Self::GetHistoryForKey),
            "GetStateByRange" => Ok(Self::GetStateByRange),
            "QueryStateNext" => Ok(Self::QueryStateNext),
            "QueryStateClose" => Ok(Self::QueryStateClose),
            other => Err(Error::UnknownOperation {
                name: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Parameters of a StartQuery call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartQueryRequest {
    /// Chain whose ledger is queried
    pub chain_id: String,
    /// Transaction the session is opened for
    pub tx_id: String,
    /// Namespace holding the keys
    pub namespace: String,
    /// History: the key. Range: the inclusive start key.
    pub key: String,
    /// Range only: exclusive end key; absent means unbounded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_key: Option<String>,
    /// Kind of query
    #[serde(default)]
    pub mode: QueryMode,
}

impl StartQueryRequest {
    /// History query over one key
    pub fn history(
        chain_id: impl Into<String>,
        tx_id: impl Into<String>,
        namespace: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            tx_id: tx_id.into(),
            namespace: namespace.into(),
            key: key.into(),
            end_key: None,
            mode: QueryMode::History,
        }
    }

    /// Range query over `[start, end)`
    pub fn range(
        chain_id: impl Into<String>,
        tx_id: impl Into<String>,
        namespace: impl Into<String>,
        start: impl Into<String>,
        end: Option<String>,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            tx_id: tx_id.into(),
            namespace: namespace.into(),
            key: start.into(),
            end_key: end,
            mode: QueryMode::Range,
        }
    }

    /// Key of the session this request opens
    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(self.chain_id.clone(), self.tx_id.clone())
    }
}

/// Addresses one query of one session (NextPage / CloseQuery)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryHandle {
    pub chain_id: String,
    pub tx_id: String,
    pub query_id: String,
}

impl QueryHandle {
    pub fn new(chain_id: impl Into<String>, tx_id: impl Into<String>, query_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            tx_id: tx_id.into(),
            query_id: query_id.into(),
        }
    }

    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(self.chain_id.clone(), self.tx_id.clone())
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Outcome of a positional invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvokeResponse {
    /// A page of query results
    Page(PageResponse),
    /// The value of a point lookup
    Value {
        #[serde(with = "base64_bytes")]
        value: Bytes,
    },
    /// Success with no payload
    Ack,
}

impl InvokeResponse {
    /// The page, if this response carries one
    pub fn as_page(&self) -> Option<&PageResponse> {
        match self {
            Self::Page(page) => Some(page),
            _ => None,
        }
    }
}
