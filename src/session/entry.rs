//! Iterator entry: one query inside a session

use super::batch::PendingBatch;
use crate::error::{Error, Result};
use crate::ledger::{BoxedSequence, QueryResult};
use std::fmt;

/// State of one paginated query
///
/// Owns its result sequence exclusively. The sequence is closed exactly
/// once: by `close()`, or on drop if nobody closed it.
pub struct IteratorEntry {
    query_id: String,
    sequence: Option<BoxedSequence>,
    batch: PendingBatch,
    total_returned: u64,
}

impl IteratorEntry {
    /// Bind a fresh sequence to `query_id` with an empty batch and a zero count
    pub fn new(query_id: impl Into<String>, sequence: BoxedSequence, max_item_bytes: usize) -> Self {
        Self {
            query_id: query_id.into(),
            sequence: Some(sequence),
            batch: PendingBatch::new(max_item_bytes),
            total_returned: 0,
        }
    }

    /// Query id this entry is registered under
    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    /// Items accepted into the batch so far, across all pages
    pub fn total_returned(&self) -> u64 {
        self.total_returned
    }

    /// Items buffered for the next page
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    /// Whether the sequence has been released
    pub fn is_closed(&self) -> bool {
        self.sequence.is_none()
    }

    /// Pull the next item from the sequence
    ///
    /// A closed entry reports `IteratorNotFound`: it lost a race against a
    /// cleanup and is no longer part of its session.
    pub async fn fetch_next(&mut self) -> Result<Option<QueryResult>> {
        let sequence = self
            .sequence
            .as_mut()
            .ok_or_else(|| Error::iterator_not_found(self.query_id.clone()))?;
        sequence.next().await
    }

    /// Encode `item` into the batch and count it
    pub fn buffer(&mut self, item: &QueryResult) -> Result<()> {
        self.batch.append(item)?;
        self.total_returned += 1;
        Ok(())
    }

    /// Take the buffered items, leaving the batch empty
    pub fn take_batch(&mut self) -> Vec<bytes::Bytes> {
        self.batch.take_and_clear()
    }

    /// Close the sequence if it is still open; returns whether it was
    pub fn close(&mut self) -> bool {
        match self.sequence.take() {
            Some(mut sequence) => {
                sequence.close();
                self.batch.take_and_clear();
                true
            }
            None => false,
        }
    }
}

impl Drop for IteratorEntry {
    fn drop(&mut self) {
        if self.close() {
            tracing::warn!(
                query_id = %self.query_id,
                "Query iterator dropped without cleanup, closed it"
            );
        }
    }
}

impl fmt::Debug for IteratorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IteratorEntry")
            .field("query_id", &self.query_id)
            .field("open", &self.sequence.is_some())
            .field("pending", &self.batch.len())
            .field("total_returned", &self.total_returned)
            .finish()
    }
}
