//! Session management module
//!
//! Tracks the server-side state of paginated queries between calls.
//! A session is bound to one (chain id, tx id) pair and holds one entry per
//! open query; each entry owns its result sequence, the batch of results
//! waiting for the next page, and the running count of returned results.
//!
//! # Overview
//!
//! The session module provides:
//! - `SessionRegistry` - owns all live sessions, at most one per key
//! - `Session` - per-key container of `IteratorEntry`s
//! - `IteratorEntry` - one query: sequence, `PendingBatch`, counter
//! - `spawn_reaper` - background cleanup of abandoned sessions

mod batch;
mod entry;
mod reaper;
mod registry;
mod types;

pub use batch::{PendingBatch, DEFAULT_MAX_ITEM_BYTES};
pub use entry::IteratorEntry;
pub use reaper::{spawn_reaper, ReaperConfig};
pub use registry::{EntryHandle, Session, SessionRegistry};
pub use types::SessionKey;
