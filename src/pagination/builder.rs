//! Page builder
//!
//! Drives an entry's result sequence until one of three things happens:
//! the entry has released `total_cap` results, the sequence runs dry, or a
//! result arrives while the batch already holds `page_cap` results. In the
//! last case the full batch becomes the page and the new result is kept
//! back as the first item of the next one, which is how "more data exists"
//! is known without peeking.

use super::types::Page;
use crate::error::{Error, Result};
use crate::session::IteratorEntry;

/// Default number of results per page
pub const DEFAULT_PAGE_CAP: usize = 100;

/// Builds pages of at most `page_cap` results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBuilder {
    page_cap: usize,
}

impl Default for PageBuilder {
    fn default() -> Self {
        Self {
            page_cap: DEFAULT_PAGE_CAP,
        }
    }
}

impl PageBuilder {
    /// Create a builder; a zero page cap is rejected
    pub fn new(page_cap: usize) -> Result<Self> {
        if page_cap == 0 {
            return Err(Error::config("page_cap must be greater than zero"));
        }
        Ok(Self { page_cap })
    }

    /// Maximum results per page
    pub fn page_cap(&self) -> usize {
        self.page_cap
    }

    /// Build the next page from `entry`
    ///
    /// A terminal page (`has_more == false`) means the caller must clean the
    /// entry up. On error the entry is unusable and must be cleaned up too.
    pub async fn build_page(&self, entry: &mut IteratorEntry, total_cap: u64) -> Result<Page> {
        if entry.is_closed() {
            return Err(Error::iterator_not_found(entry.query_id()));
        }

        loop {
            if entry.total_returned() >= total_cap {
                tracing::debug!(
                    query_id = entry.query_id(),
                    total_returned = entry.total_returned(),
                    total_cap,
                    "Total result limit reached"
                );
                return Ok(Page::last(entry.take_batch()));
            }

            let item = match entry.fetch_next().await {
                Ok(Some(item)) => item,
                Ok(None) => return Ok(Page::last(entry.take_batch())),
                Err(e) => {
                    tracing::error!(
                        query_id = entry.query_id(),
                        "Failed to get query result from iterator: {e}"
                    );
                    return Err(e);
                }
            };

            if entry.pending() >= self.page_cap {
                let page = Page::partial(entry.take_batch());
                entry.buffer(&item)?;
                return Ok(page);
            }

            entry.buffer(&item)?;
        }
    }
}
