//! Operation dispatcher
//!
//! Owns the session registry and maps each operation onto it:
//!
//! - StartQuery: create session, open sequence, register entry, first page
//! - NextPage: look up session and entry, next page
//! - CloseQuery: clean up entries, delete session, always ack
//!
//! Sessions are only ever deleted if the registry still maps their key to
//! the session the operation started with.
//! - PointLookup: stateless single-key read
//!
//! After every page the entry is cleaned up if the page was terminal or the
//! builder failed, so a sequence is closed exactly once however its query
//! ends.

use super::ids::{QueryIdGenerator, UuidGenerator};
use super::types::{InvokeResponse, Operation, QueryHandle, StartQueryRequest};
use crate::config::{QueryLimits, ServiceConfig};
use crate::error::{Error, Result};
use crate::ledger::{KeyRange, LedgerProvider, QuerySource};
use crate::pagination::{PageBuilder, PageResponse};
use crate::session::{EntryHandle, Session, SessionRegistry};
use crate::types::QueryMode;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// Entry point for all query operations
#[derive(Clone)]
pub struct Dispatcher {
    ledgers: Arc<dyn LedgerProvider>,
    registry: SessionRegistry,
    builder: PageBuilder,
    ids: Arc<dyn QueryIdGenerator>,
    limits: QueryLimits,
    delete_session_on_exhaustion: bool,
}

impl Dispatcher {
    /// Create a dispatcher over `ledgers` configured from `config`
    pub fn new(ledgers: Arc<dyn LedgerProvider>, config: &ServiceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ledgers,
            registry: SessionRegistry::with_max_item_bytes(config.max_result_bytes),
            builder: PageBuilder::new(config.page_cap)?,
            ids: Arc::new(UuidGenerator),
            limits: config.limits(),
            delete_session_on_exhaustion: config.delete_session_on_exhaustion,
        })
    }

    /// Use a different query id generator
    #[must_use]
    pub fn with_id_generator(mut self, ids: Arc<dyn QueryIdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Share an existing limits handle
    #[must_use]
    pub fn with_limits(mut self, limits: QueryLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Session registry
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Runtime limits
    pub fn limits(&self) -> &QueryLimits {
        &self.limits
    }

    /// Maximum results per page
    pub fn page_cap(&self) -> usize {
        self.builder.page_cap()
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Open a session and a query and return the first page
    ///
    /// Fails with `SessionExists` if the (chain, tx) pair already has a live
    /// session; that session is left untouched.
    pub async fn start_query(&self, request: &StartQueryRequest) -> Result<PageResponse> {
        let ledger = self.resolve(&request.chain_id)?;
        let key = request.session_key();
        let session = self.registry.create(key.clone()).await?;

        let opened = match request.mode {
            QueryMode::History => {
                ledger
                    .open_history_query(&request.namespace, &request.key)
                    .await
            }
            QueryMode::Range => {
                let range = KeyRange::new(
                    request.key.clone(),
                    request.end_key.clone().unwrap_or_default(),
                );
                ledger.open_range_query(&request.namespace, &range).await
            }
        };

        let sequence = match opened {
            Ok(sequence) => sequence,
            Err(e) => {
                tracing::error!(
                    session = %key,
                    namespace = %request.namespace,
                    mode = %request.mode,
                    "Failed to open query iterator: {e}"
                );
                self.registry.delete_if_same(&key, &session).await;
                return Err(e);
            }
        };

        let query_id = self.ids.next_id();
        tracing::info!(
            session = %key,
            query_id = %query_id,
            namespace = %request.namespace,
            mode = %request.mode,
            "Started query"
        );
        let entry = session.register(query_id.clone(), sequence).await;
        self.drive(&session, &entry, &query_id).await
    }

    /// Return the next page of an open query
    pub async fn next_page(&self, handle: &QueryHandle) -> Result<PageResponse> {
        let key = handle.session_key();
        let session = self
            .registry
            .get(&key)
            .await
            .ok_or_else(|| Error::session_not_found(&key))?;
        let entry = session
            .get_entry(&handle.query_id)
            .await
            .ok_or_else(|| Error::iterator_not_found(&handle.query_id))?;

        self.drive(&session, &entry, &handle.query_id).await
    }

    /// Release a query and its session
    ///
    /// Unknown sessions and ids are not errors.
    pub async fn close_query(&self, handle: &QueryHandle) {
        let key = handle.session_key();
        match self.registry.get(&key).await {
            Some(session) => {
                session.cleanup(&handle.query_id).await;
                let others = session.cleanup_all().await;
                if others > 0 {
                    tracing::debug!(session = %key, closed = others, "Closed remaining query iterators");
                }
                self.registry.delete_if_same(&key, &session).await;
            }
            None => {
                tracing::warn!(session = %key, "Can't find any query session to close");
            }
        }
    }

    /// Current value of a single key
    pub async fn point_lookup(&self, chain_id: &str, namespace: &str, key: &str) -> Result<Bytes> {
        let ledger = self.resolve(chain_id)?;
        ledger
            .point_get(namespace, key)
            .await?
            .ok_or_else(|| Error::not_found(namespace, key))
    }

    /// Positional invocation: `args[0]` names the operation
    ///
    /// | Operation          | args[1]    | args[2]   | args[3]     |
    /// |--------------------|------------|-----------|-------------|
    /// | `GetState`         | namespace  | key       |             |
    /// | `GetHistoryForKey` | namespace  | key       |             |
    /// | `GetStateByRange`  | namespace  | start key | end key (opt) |
    /// | `QueryStateNext`   | tx id      | query id  |             |
    /// | `QueryStateClose`  | tx id      | query id  |             |
    pub async fn invoke(&self, chain_id: &str, tx_id: &str, args: &[String]) -> Result<InvokeResponse> {
        tracing::debug!(chain_id, tx_id, args = args.len(), "Invoke");

        if args.len() < 2 {
            return Err(Error::invalid_args(format!(
                "Incorrect number of arguments, {}",
                args.len()
            )));
        }
        self.resolve(chain_id)?;

        let operation: Operation = args[0].parse()?;
        if args.len() < 3 {
            return Err(Error::invalid_args(format!(
                "missing 3rd argument for {operation}"
            )));
        }

        match operation {
            Operation::GetState => {
                if args[2].is_empty() {
                    return Err(Error::invalid_args("State key must not be nil"));
                }
                let value = self.point_lookup(chain_id, &args[1], &args[2]).await?;
                Ok(InvokeResponse::Value { value })
            }
            Operation::GetHistoryForKey => {
                let request = StartQueryRequest::history(chain_id, tx_id, &args[1], &args[2]);
                Ok(InvokeResponse::Page(self.start_query(&request).await?))
            }
            Operation::GetStateByRange => {
                let request =
                    StartQueryRequest::range(chain_id, tx_id, &args[1], &args[2], args.get(3).cloned());
                Ok(InvokeResponse::Page(self.start_query(&request).await?))
            }
            Operation::QueryStateNext => {
                let handle = QueryHandle::new(chain_id, &args[1], &args[2]);
                Ok(InvokeResponse::Page(self.next_page(&handle).await?))
            }
            Operation::QueryStateClose => {
                let handle = QueryHandle::new(chain_id, &args[1], &args[2]);
                self.close_query(&handle).await;
                Ok(InvokeResponse::Ack)
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn resolve(&self, chain_id: &str) -> Result<Arc<dyn QuerySource>> {
        self.ledgers
            .ledger(chain_id)
            .ok_or_else(|| Error::unknown_chain(chain_id))
    }

    /// Build one page and release the entry if the query is over
    async fn drive(&self, session: &Arc<Session>, entry: &EntryHandle, query_id: &str) -> Result<PageResponse> {
        let total_cap = self.limits.total_cap();
        let built = {
            let mut guard = entry.lock().await;
            let built = self.builder.build_page(&mut guard, total_cap).await;
            // Close before releasing the lock so a queued caller finds it closed
            if !matches!(&built, Ok(page) if !page.terminal) {
                guard.close();
            }
            built
        };

        match built {
            Ok(page) => {
                tracing::debug!(
                    session = %session.key(),
                    query_id,
                    results = page.len(),
                    has_more = page.has_more,
                    "Built page"
                );
                if page.terminal {
                    session.cleanup(query_id).await;
                    if self.delete_session_on_exhaustion && session.is_empty().await {
                        self.registry.delete_if_same(session.key(), session).await;
                    }
                }
                Ok(page.into_response(query_id, session.key().tx_id()))
            }
            Err(e) => {
                if e.is_iteration_failure() {
                    tracing::warn!(session = %session.key(), query_id, "Query iterator failed: {e}");
                } else {
                    tracing::debug!(session = %session.key(), query_id, "Page not built: {e}");
                }
                session.cleanup(query_id).await;
                Err(e)
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("page_cap", &self.builder.page_cap())
            .field("limits", &self.limits)
            .field("delete_session_on_exhaustion", &self.delete_session_on_exhaustion)
            .finish_non_exhaustive()
    }
}
