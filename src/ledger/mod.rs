//! Ledger module
//!
//! The boundary to the data store. Everything behind `QuerySource` is
//! opaque to the paging layer: it only opens result sequences and answers
//! point reads.
//!
//! # Overview
//!
//! - `QuerySource` - range, history and point queries for one chain
//! - `LedgerProvider` - resolves a chain id to its `QuerySource`
//! - `ResultSequence` - lazy, forward-only producer of `QueryResult`s
//! - `InMemoryLedger` - bundled implementation, loaded from a `LedgerSeed`

mod memory;
mod seed;
mod sequence;
mod types;

pub use memory::{InMemoryLedger, MemoryLedgerProvider};
pub use seed::{ChainSeed, LedgerSeed, SeedWrite};
pub use sequence::{BoxedSequence, MemorySequence, ResultSequence, SequenceProbe};
pub use types::{KeyModification, KeyRange, KeyValue, QueryResult};

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Queries against the ledger of one chain
#[async_trait]
pub trait QuerySource: Send + Sync {
    /// Open a sequence over the current state of every key in `range`
    async fn open_range_query(&self, namespace: &str, range: &KeyRange) -> Result<BoxedSequence>;

    /// Open a sequence over every modification of `key`
    async fn open_history_query(&self, namespace: &str, key: &str) -> Result<BoxedSequence>;

    /// Read the current value of a single key
    async fn point_get(&self, namespace: &str, key: &str) -> Result<Option<Bytes>>;
}

/// Resolves chain ids to ledgers
pub trait LedgerProvider: Send + Sync {
    /// Ledger for `chain_id`, if the chain is known
    fn ledger(&self, chain_id: &str) -> Option<Arc<dyn QuerySource>>;
}
