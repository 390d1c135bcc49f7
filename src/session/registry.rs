//! Session registry
//!
//! Lock scopes:
//! - the registry lock covers lookup, check-and-insert and removal only;
//! - a session lock covers every change to that session's entry map;
//! - an entry lock is held while a page is built from it.
//!
//! The session lock is never held while waiting on an entry lock, so a
//! slow `next()` on one query never blocks lookups in the same session.

use super::batch::DEFAULT_MAX_ITEM_BYTES;
use super::entry::IteratorEntry;
use super::types::SessionKey;
use crate::error::{Error, Result};
use crate::ledger::BoxedSequence;
use futures::future::join_all;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// Shared handle to an entry; lock it to build a page
pub type EntryHandle = Arc<Mutex<IteratorEntry>>;

// ============================================================================
// Session
// ============================================================================

struct SessionInner {
    entries: HashMap<String, EntryHandle>,
    last_access: Instant,
}

impl SessionInner {
    fn touch(&mut self) {
        self.last_access = Instant::now();
    }
}

/// Per-transaction container of query entries
pub struct Session {
    key: SessionKey,
    max_item_bytes: usize,
    inner: Mutex<SessionInner>,
}

impl Session {
    fn new(key: SessionKey, max_item_bytes: usize) -> Self {
        Self {
            key,
            max_item_bytes,
            inner: Mutex::new(SessionInner {
                entries: HashMap::new(),
                last_access: Instant::now(),
            }),
        }
    }

    /// Key this session is registered under
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Bind `sequence` to `query_id` with an empty batch and a zero count
    ///
    /// Replaces any entry already registered under the same id; the
    /// displaced entry's sequence is closed.
    pub async fn register(&self, query_id: impl Into<String>, sequence: BoxedSequence) -> EntryHandle {
        let query_id = query_id.into();
        let entry = Arc::new(Mutex::new(IteratorEntry::new(
            query_id.clone(),
            sequence,
            self.max_item_bytes,
        )));

        let displaced = {
            let mut inner = self.inner.lock().await;
            inner.touch();
            inner.entries.insert(query_id.clone(), Arc::clone(&entry))
        };

        if let Some(old) = displaced {
            tracing::warn!(session = %self.key, query_id = %query_id, "Replaced an open query iterator");
            old.lock().await.close();
        }

        entry
    }

    /// Entry registered under `query_id`
    pub async fn get_entry(&self, query_id: &str) -> Option<EntryHandle> {
        let mut inner = self.inner.lock().await;
        inner.touch();
        inner.entries.get(query_id).cloned()
    }

    /// Remove the entry and close its sequence
    ///
    /// Cleaning up an unknown id is a no-op. Returns whether a sequence was
    /// closed by this call.
    pub async fn cleanup(&self, query_id: &str) -> bool {
        let removed = {
            let mut inner = self.inner.lock().await;
            inner.entries.remove(query_id)
        };

        match removed {
            Some(handle) => {
                let closed = handle.lock().await.close();
                tracing::debug!(session = %self.key, query_id, closed, "Cleaned up query iterator");
                closed
            }
            None => false,
        }
    }

    /// Remove and close every entry; returns how many sequences were closed
    pub async fn cleanup_all(&self) -> usize {
        let removed: Vec<EntryHandle> = {
            let mut inner = self.inner.lock().await;
            inner.entries.drain().map(|(_, handle)| handle).collect()
        };

        let mut closed = 0;
        for handle in removed {
            if handle.lock().await.close() {
                closed += 1;
            }
        }
        closed
    }

    /// Number of registered entries
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// Whether no entries are registered
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// Time since the session was last registered into or looked up
    pub async fn idle_for(&self) -> Duration {
        self.inner.lock().await.last_access.elapsed()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Owns every live session, keyed by (chain id, tx id)
///
/// Cloning shares the underlying map.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionKey, Arc<Session>>>>,
    max_item_bytes: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::with_max_item_bytes(DEFAULT_MAX_ITEM_BYTES)
    }

    /// Create an empty registry whose entries reject results above `max_item_bytes`
    pub fn with_max_item_bytes(max_item_bytes: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_item_bytes,
        }
    }

    /// Insert an empty session for `key`
    ///
    /// Fails with `SessionExists` if one is already live; the existing
    /// session is left untouched.
    pub async fn create(&self, key: SessionKey) -> Result<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        match sessions.entry(key) {
            Entry::Occupied(occupied) => Err(Error::session_exists(occupied.key())),
            Entry::Vacant(vacant) => {
                let session = Arc::new(Session::new(vacant.key().clone(), self.max_item_bytes));
                tracing::info!(session = %vacant.key(), "Created query session");
                vacant.insert(Arc::clone(&session));
                Ok(session)
            }
        }
    }

    /// Session for `key`, if live; never creates one
    pub async fn get(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.sessions.read().await.get(key).cloned()
    }

    /// Remove the session for `key`
    ///
    /// Does not close contained sequences; clean up entries first.
    pub async fn delete(&self, key: &SessionKey) -> Option<Arc<Session>> {
        let removed = self.sessions.write().await.remove(key);
        if removed.is_some() {
            tracing::info!(session = %key, "Deleted query session");
        }
        removed
    }

    /// Remove the session for `key` only if it is still `session`
    ///
    /// A successor created under the same key after `session` was removed
    /// is left in place.
    pub async fn delete_if_same(&self, key: &SessionKey, session: &Arc<Session>) -> bool {
        let mut sessions = self.sessions.write().await;
        let same = sessions
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, session));
        if same {
            sessions.remove(key);
            tracing::info!(session = %key, "Deleted query session");
        }
        same
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no sessions are live
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Keys of live sessions, sorted
    pub async fn keys(&self) -> Vec<SessionKey> {
        let mut keys: Vec<SessionKey> = self.sessions.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Close and delete every session idle for at least `max_idle`
    ///
    /// Returns the reaped keys, sorted.
    pub async fn reap_idle(&self, max_idle: Duration) -> Vec<SessionKey> {
        let snapshot: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();

        let mut idle = Vec::new();
        for session in snapshot {
            if session.idle_for().await >= max_idle {
                idle.push(session);
            }
        }
        if idle.is_empty() {
            return Vec::new();
        }

        // Sessions replaced or deleted since the snapshot are not ours to reap
        let mut reaped = Vec::with_capacity(idle.len());
        {
            let mut sessions = self.sessions.write().await;
            for session in idle {
                let key = session.key();
                if sessions.get(key).is_some_and(|current| Arc::ptr_eq(current, &session)) {
                    sessions.remove(key);
                    reaped.push(session);
                }
            }
        }

        let closed = join_all(reaped.iter().map(|session| session.cleanup_all())).await;

        let mut keys = Vec::with_capacity(reaped.len());
        for (session, closed) in reaped.iter().zip(closed) {
            tracing::warn!(session = %session.key(), closed, "Reaped idle query session");
            keys.push(session.key().clone());
        }
        keys.sort();
        keys
    }
}

impl Clone for SessionRegistry {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            max_item_bytes: self.max_item_bytes,
        }
    }
}
