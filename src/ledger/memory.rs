//! In-memory ledger
//!
//! Holds the full write history of every key per namespace. Range queries
//! see the latest non-deleted value of each key; history queries see every
//! write in commit order. Each query works on a snapshot taken when it is
//! opened.
//!
//! Sequence probes are only kept when recording is switched on with
//! [`InMemoryLedger::recording`].

use super::sequence::{BoxedSequence, MemorySequence, SequenceProbe};
use super::types::{KeyModification, KeyRange, KeyValue, QueryResult};
use super::{LedgerProvider, QuerySource};
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

type KeyHistory = BTreeMap<String, Vec<KeyModification>>;

/// Ledger for one chain, held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    namespaces: BTreeMap<String, KeyHistory>,
    failure: Option<(usize, String)>,
    opened: Option<Mutex<Vec<SequenceProbe>>>,
}

impl InMemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every sequence opened from now on fail at `position`
    #[must_use]
    pub fn fail_sequences_at(mut self, position: usize, message: impl Into<String>) -> Self {
        self.failure = Some((position, message.into()));
        self
    }

    /// Keep a probe of every sequence opened from now on
    #[must_use]
    pub fn recording(mut self) -> Self {
        self.opened.get_or_insert_with(Mutex::default);
        self
    }

    /// Append a modification to a key's history
    pub fn record(
        &mut self,
        namespace: impl Into<String>,
        key: impl Into<String>,
        modification: KeyModification,
    ) {
        self.namespaces
            .entry(namespace.into())
            .or_default()
            .entry(key.into())
            .or_default()
            .push(modification);
    }

    /// Write a value at the given time
    pub fn put_at(
        &mut self,
        namespace: impl Into<String>,
        key: impl Into<String>,
        tx_id: impl Into<String>,
        value: impl Into<Bytes>,
        timestamp: DateTime<Utc>,
    ) {
        self.record(namespace, key, KeyModification::write(tx_id, value, timestamp));
    }

    /// Write a value now
    pub fn put(
        &mut self,
        namespace: impl Into<String>,
        key: impl Into<String>,
        tx_id: impl Into<String>,
        value: impl Into<Bytes>,
    ) {
        self.put_at(namespace, key, tx_id, value, Utc::now());
    }

    /// Delete a key now
    pub fn delete(
        &mut self,
        namespace: impl Into<String>,
        key: impl Into<String>,
        tx_id: impl Into<String>,
    ) {
        self.record(namespace, key, KeyModification::delete(tx_id, Utc::now()));
    }

    /// Namespaces known to this ledger
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }

    /// Number of keys with at least one recorded write in a namespace
    pub fn key_count(&self, namespace: &str) -> usize {
        self.namespaces.get(namespace).map_or(0, BTreeMap::len)
    }

    /// Probes of every sequence opened while recording, oldest first
    pub fn probes(&self) -> Vec<SequenceProbe> {
        self.opened.as_ref().map_or_else(Vec::new, |opened| {
            opened.lock().unwrap_or_else(PoisonError::into_inner).clone()
        })
    }

    fn latest(&self, namespace: &str, key: &str) -> Option<&KeyModification> {
        self.namespaces.get(namespace)?.get(key)?.last()
    }

    fn open(&self, items: Vec<QueryResult>) -> BoxedSequence {
        let mut sequence = MemorySequence::new(items);
        if let Some((position, message)) = &self.failure {
            sequence = sequence.fail_at(*position, message.clone());
        }
        if let Some(opened) = &self.opened {
            opened
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(sequence.probe());
        }
        sequence.boxed()
    }
}

#[async_trait]
impl QuerySource for InMemoryLedger {
    async fn open_range_query(&self, namespace: &str, range: &KeyRange) -> Result<BoxedSequence> {
        let items: Vec<QueryResult> = self
            .namespaces
            .get(namespace)
            .into_iter()
            .flat_map(|keys| keys.iter())
            .filter(|(key, _)| range.contains(key))
            .filter_map(|(key, history)| {
                history
                    .last()
                    .filter(|latest| !latest.is_delete)
                    .map(|latest| {
                        QueryResult::from(KeyValue::new(
                            namespace,
                            key.clone(),
                            latest.value.clone(),
                        ))
                    })
            })
            .collect();

        tracing::debug!(
            namespace,
            start = %range.start,
            end = %range.end,
            items = items.len(),
            "Opened range query"
        );
        Ok(self.open(items))
    }

    async fn open_history_query(&self, namespace: &str, key: &str) -> Result<BoxedSequence> {
        let items: Vec<QueryResult> = self
            .namespaces
            .get(namespace)
            .and_then(|keys| keys.get(key))
            .map(|history| history.iter().cloned().map(QueryResult::from).collect())
            .unwrap_or_default();

        tracing::debug!(namespace, key, items = items.len(), "Opened history query");
        Ok(self.open(items))
    }

    async fn point_get(&self, namespace: &str, key: &str) -> Result<Option<Bytes>> {
        Ok(self
            .latest(namespace, key)
            .filter(|latest| !latest.is_delete)
            .map(|latest| latest.value.clone()))
    }
}

// ============================================================================
// Provider
// ============================================================================

/// Resolves chain ids to in-memory ledgers
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerProvider {
    ledgers: HashMap<String, Arc<InMemoryLedger>>,
}

impl MemoryLedgerProvider {
    /// Create a provider with no chains
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the ledger of a chain
    pub fn insert(&mut self, chain_id: impl Into<String>, ledger: InMemoryLedger) -> Arc<InMemoryLedger> {
        let ledger = Arc::new(ledger);
        self.ledgers.insert(chain_id.into(), Arc::clone(&ledger));
        ledger
    }

    /// Add a ledger, builder style
    #[must_use]
    pub fn with_chain(mut self, chain_id: impl Into<String>, ledger: InMemoryLedger) -> Self {
        self.insert(chain_id, ledger);
        self
    }

    /// Typed access to a chain's ledger
    pub fn get(&self, chain_id: &str) -> Option<Arc<InMemoryLedger>> {
        self.ledgers.get(chain_id).cloned()
    }

    /// Chain ids, sorted
    pub fn chains(&self) -> Vec<String> {
        let mut chains: Vec<String> = self.ledgers.keys().cloned().collect();
        chains.sort();
        chains
    }
}

impl LedgerProvider for MemoryLedgerProvider {
    fn ledger(&self, chain_id: &str) -> Option<Arc<dyn QuerySource>> {
        self.ledgers
            .get(chain_id)
            .map(|ledger| Arc::clone(ledger) as Arc<dyn QuerySource>)
    }
}
