//! Page types
//!
//! `Page` is what the builder produces; `PageResponse` is what goes back to
//! the caller, tagged with the ids needed to ask for the next page.

use crate::error::Result;
use crate::ledger::QueryResult;
use crate::types::base64_list;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One bounded chunk of encoded results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Encoded results, in sequence order
    pub results: Vec<Bytes>,
    /// Whether another page can be requested
    pub has_more: bool,
    /// Whether the entry must be torn down after this page
    pub terminal: bool,
}

impl Page {
    /// A page after which the query continues
    pub fn partial(results: Vec<Bytes>) -> Self {
        Self {
            results,
            has_more: true,
            terminal: false,
        }
    }

    /// The last page of a query
    pub fn last(results: Vec<Bytes>) -> Self {
        Self {
            results,
            has_more: false,
            terminal: true,
        }
    }

    /// Number of results on the page
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether the page carries no results
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Tag the page with the ids the caller continues with
    pub fn into_response(self, query_id: impl Into<String>, transaction_id: impl Into<String>) -> PageResponse {
        PageResponse {
            results: self.results,
            has_more: self.has_more,
            query_id: query_id.into(),
            transaction_id: transaction_id.into(),
        }
    }
}

/// Paginated response as sent over the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResponse {
    /// Encoded results, base64 on the wire
    #[serde(with = "base64_list")]
    pub results: Vec<Bytes>,
    /// Whether NextPage may be called
    pub has_more: bool,
    /// Query to continue with
    pub query_id: String,
    /// Transaction the session belongs to
    pub transaction_id: String,
}

impl PageResponse {
    /// Decode every result on the page
    pub fn decode_results(&self) -> Result<Vec<QueryResult>> {
        self.results.iter().map(|bytes| QueryResult::decode(bytes)).collect()
    }
}
