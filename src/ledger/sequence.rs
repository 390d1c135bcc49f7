//! Result sequences
//!
//! A result sequence is the lazy, forward-only producer behind every
//! paginated query. `MemorySequence` is the in-memory implementation used
//! by the bundled ledger and by tests; it can fail at a chosen position and
//! reports how often it was pulled and closed through a `SequenceProbe`.

use super::types::QueryResult;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Forward-only producer of query results
///
/// Not reusable after exhaustion, an error, or `close()`.
#[async_trait]
pub trait ResultSequence: Send {
    /// Pull the next item; `Ok(None)` means the sequence is exhausted
    async fn next(&mut self) -> Result<Option<QueryResult>>;

    /// Release the underlying resources
    fn close(&mut self);
}

/// Owned, type-erased result sequence
pub type BoxedSequence = Box<dyn ResultSequence>;

// ============================================================================
// Probe
// ============================================================================

#[derive(Debug, Default)]
struct ProbeCounters {
    fetched: AtomicUsize,
    closes: AtomicUsize,
}

/// Shared view of a sequence's activity, kept by whoever opened it
#[derive(Debug, Clone, Default)]
pub struct SequenceProbe {
    inner: Arc<ProbeCounters>,
}

impl SequenceProbe {
    /// Create a new probe
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items handed out so far
    pub fn fetched(&self) -> usize {
        self.inner.fetched.load(Ordering::SeqCst)
    }

    /// Number of times `close()` was called
    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// Whether the sequence has been closed at least once
    pub fn is_closed(&self) -> bool {
        self.closes() > 0
    }
}

// ============================================================================
// Memory Sequence
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SequenceState {
    Open,
    Exhausted,
    Failed,
    Closed,
}

/// Result sequence over a snapshot of items held in memory
#[derive(Debug)]
pub struct MemorySequence {
    items: VecDeque<QueryResult>,
    position: usize,
    fail_at: Option<(usize, String)>,
    state: SequenceState,
    probe: SequenceProbe,
}

impl MemorySequence {
    /// Create a sequence over a list of items
    pub fn new(items: impl IntoIterator<Item = QueryResult>) -> Self {
        Self {
            items: items.into_iter().collect(),
            position: 0,
            fail_at: None,
            state: SequenceState::Open,
            probe: SequenceProbe::new(),
        }
    }

    /// Fail with `message` when item number `position` (0-based) is pulled
    #[must_use]
    pub fn fail_at(mut self, position: usize, message: impl Into<String>) -> Self {
        self.fail_at = Some((position, message.into()));
        self
    }

    /// Probe sharing this sequence's counters
    pub fn probe(&self) -> SequenceProbe {
        self.probe.clone()
    }

    /// Items not yet handed out
    pub fn remaining(&self) -> usize {
        self.items.len()
    }

    /// Box the sequence
    pub fn boxed(self) -> BoxedSequence {
        Box::new(self)
    }
}

#[async_trait]
impl ResultSequence for MemorySequence {
    async fn next(&mut self) -> Result<Option<QueryResult>> {
        match self.state {
            SequenceState::Closed => return Err(Error::sequence("result sequence is closed")),
            SequenceState::Failed => {
                return Err(Error::sequence("result sequence already failed"))
            }
            SequenceState::Exhausted => return Ok(None),
            SequenceState::Open => {}
        }

        if let Some((position, message)) = &self.fail_at {
            if *position == self.position {
                self.state = SequenceState::Failed;
                return Err(Error::sequence(message.clone()));
            }
        }

        match self.items.pop_front() {
            Some(item) => {
                self.position += 1;
                self.probe.inner.fetched.fetch_add(1, Ordering::SeqCst);
                Ok(Some(item))
            }
            None => {
                self.state = SequenceState::Exhausted;
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        self.probe.inner.closes.fetch_add(1, Ordering::SeqCst);
        self.state = SequenceState::Closed;
        self.items.clear();
    }
}
