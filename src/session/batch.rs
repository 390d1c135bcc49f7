//! Pending batch of encoded results

use crate::error::{Error, Result};
use bytes::Bytes;
use serde::Serialize;

/// Default ceiling on a single encoded result (4 MiB)
pub const DEFAULT_MAX_ITEM_BYTES: usize = 4 * 1024 * 1024;

/// Ordered buffer of encoded results not yet handed to the caller
#[derive(Debug, Clone)]
pub struct PendingBatch {
    items: Vec<Bytes>,
    max_item_bytes: usize,
}

impl Default for PendingBatch {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITEM_BYTES)
    }
}

impl PendingBatch {
    /// Create an empty batch that rejects items larger than `max_item_bytes`
    pub fn new(max_item_bytes: usize) -> Self {
        Self {
            items: Vec::new(),
            max_item_bytes,
        }
    }

    /// Encode `item` and append it
    ///
    /// Fails with `Error::Serialization` when the item cannot be encoded or
    /// its encoding exceeds the size ceiling. The batch is unchanged then.
    pub fn append<T: Serialize + ?Sized>(&mut self, item: &T) -> Result<()> {
        let encoded = serde_json::to_vec(item).map_err(|e| {
            tracing::error!("Failed to marshal query result: {e}");
            Error::serialization(e.to_string())
        })?;

        if encoded.len() > self.max_item_bytes {
            return Err(Error::serialization(format!(
                "encoded result is {} bytes, limit is {}",
                encoded.len(),
                self.max_item_bytes
            )));
        }

        self.items.push(Bytes::from(encoded));
        Ok(())
    }

    /// Hand out the buffered items and leave the batch empty
    pub fn take_and_clear(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.items)
    }

    /// Number of buffered items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Size ceiling for one encoded item
    pub fn max_item_bytes(&self) -> usize {
        self.max_item_bytes
    }
}
