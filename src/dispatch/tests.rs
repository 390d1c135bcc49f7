//! Tests for dispatch module

use super::*;
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::ledger::{
    BoxedSequence, InMemoryLedger, KeyRange, LedgerProvider, MemoryLedgerProvider, QueryResult,
    QuerySource, ResultSequence,
};
use crate::pagination::PageResponse;
use crate::session::SessionKey;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use futures::future::join_all;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

const CHAIN: &str = "mychannel";

fn config(page_cap: usize, total_cap: u64) -> ServiceConfig {
    ServiceConfig {
        page_cap,
        total_cap,
        ..ServiceConfig::default()
    }
}

/// `marbles/marble1` has `writes` history entries, `assets/m000..m029` hold current state
fn seeded_ledger(writes: usize) -> InMemoryLedger {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut ledger = InMemoryLedger::new();
    for i in 0..writes {
        ledger.put_at(
            "marbles",
            "marble1",
            format!("tx-{i:03}"),
            format!("v{i}"),
            base + chrono::Duration::seconds(i as i64),
        );
    }
    for i in 0..30 {
        ledger.put_at("assets", format!("m{i:03}"), "tx-seed", format!("asset {i}"), base);
    }
    ledger
}

fn dispatcher_with(ledger: InMemoryLedger, config: &ServiceConfig) -> (Dispatcher, Arc<InMemoryLedger>) {
    let mut provider = MemoryLedgerProvider::new();
    let ledger = provider.insert(CHAIN, ledger.recording());
    let dispatcher = Dispatcher::new(Arc::new(provider), config)
        .unwrap()
        .with_id_generator(Arc::new(SequentialIds::new("q")));
    (dispatcher, ledger)
}

fn history_request(tx_id: &str) -> StartQueryRequest {
    StartQueryRequest::history(CHAIN, tx_id, "marbles", "marble1")
}

fn history_tx_ids(page: &PageResponse) -> Vec<String> {
    page.decode_results()
        .unwrap()
        .into_iter()
        .map(|result| match result {
            QueryResult::History(modification) => modification.tx_id,
            QueryResult::State(_) => panic!("Expected history item"),
        })
        .collect()
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

struct BrokenLedger;

#[async_trait]
impl QuerySource for BrokenLedger {
    async fn open_range_query(&self, _namespace: &str, _range: &KeyRange) -> Result<BoxedSequence> {
        Err(Error::ledger("history database unavailable"))
    }

    async fn open_history_query(&self, _namespace: &str, _key: &str) -> Result<BoxedSequence> {
        Err(Error::ledger("history database unavailable"))
    }

    async fn point_get(&self, _namespace: &str, _key: &str) -> Result<Option<Bytes>> {
        Err(Error::ledger("state database unavailable"))
    }
}

struct BrokenProvider;

impl LedgerProvider for BrokenProvider {
    fn ledger(&self, _chain_id: &str) -> Option<Arc<dyn QuerySource>> {
        Some(Arc::new(BrokenLedger))
    }
}

/// Empty sequence whose first pull waits for `release`
struct HeldSequence {
    entered: Arc<Notify>,
    release: Arc<Notify>,
    pulled: bool,
}

#[async_trait]
impl ResultSequence for HeldSequence {
    async fn next(&mut self) -> Result<Option<QueryResult>> {
        if !self.pulled {
            self.pulled = true;
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(None)
    }

    fn close(&mut self) {}
}

/// Hands out one held sequence, then serves `inner`
struct HeldLedger {
    inner: InMemoryLedger,
    held: AtomicBool,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl QuerySource for HeldLedger {
    async fn open_range_query(&self, namespace: &str, range: &KeyRange) -> Result<BoxedSequence> {
        self.inner.open_range_query(namespace, range).await
    }

    async fn open_history_query(&self, namespace: &str, key: &str) -> Result<BoxedSequence> {
        if self.held.swap(true, Ordering::SeqCst) {
            return self.inner.open_history_query(namespace, key).await;
        }
        Ok(Box::new(HeldSequence {
            entered: Arc::clone(&self.entered),
            release: Arc::clone(&self.release),
            pulled: false,
        }))
    }

    async fn point_get(&self, namespace: &str, key: &str) -> Result<Option<Bytes>> {
        self.inner.point_get(namespace, key).await
    }
}

struct HeldProvider(Arc<HeldLedger>);

impl LedgerProvider for HeldProvider {
    fn ledger(&self, _chain_id: &str) -> Option<Arc<dyn QuerySource>> {
        Some(Arc::clone(&self.0) as Arc<dyn QuerySource>)
    }
}

// ============================================================================
// Construction Tests
// ============================================================================

#[test]
fn test_invalid_config_is_rejected() {
    let provider = Arc::new(MemoryLedgerProvider::new());
    let err = Dispatcher::new(provider, &config(0, 10)).unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}

// ============================================================================
// StartQuery / NextPage Tests
// ============================================================================

#[tokio::test]
async fn test_history_query_pages_through() {
    let (dispatcher, ledger) = dispatcher_with(seeded_ledger(25), &config(10, 1000));

    let first = dispatcher.start_query(&history_request("tx1")).await.unwrap();
    assert_eq!(first.query_id, "q-1");
    assert_eq!(first.transaction_id, "tx1");
    assert_eq!(first.results.len(), 10);
    assert!(first.has_more);

    let handle = QueryHandle::new(CHAIN, "tx1", &first.query_id);
    let second = dispatcher.next_page(&handle).await.unwrap();
    let third = dispatcher.next_page(&handle).await.unwrap();
    assert_eq!((second.results.len(), second.has_more), (10, true));
    assert_eq!((third.results.len(), third.has_more), (5, false));

    let mut all = history_tx_ids(&first);
    all.extend(history_tx_ids(&second));
    all.extend(history_tx_ids(&third));
    let expected: Vec<String> = (0..25).map(|i| format!("tx-{i:03}")).collect();
    assert_eq!(all, expected);

    assert_eq!(ledger.probes()[0].closes(), 1);

    // The entry is gone but the session stays
    let err = dispatcher.next_page(&handle).await.unwrap_err();
    assert!(matches!(err, Error::IteratorNotFound { .. }));
    assert_eq!(dispatcher.registry().len().await, 1);
}

#[tokio::test]
async fn test_exhaustion_can_delete_the_session() {
    let config = ServiceConfig {
        delete_session_on_exhaustion: true,
        ..config(10, 1000)
    };
    let (dispatcher, _ledger) = dispatcher_with(seeded_ledger(5), &config);

    let page = dispatcher.start_query(&history_request("tx1")).await.unwrap();
    assert!(!page.has_more);
    assert!(dispatcher.registry().is_empty().await);

    // The key is free again
    assert!(dispatcher.start_query(&history_request("tx1")).await.is_ok());
}

#[tokio::test]
async fn test_total_cap_ends_the_query_early() {
    let (dispatcher, ledger) = dispatcher_with(seeded_ledger(250), &config(100, 50));

    let page = dispatcher.start_query(&history_request("tx1")).await.unwrap();
    assert_eq!(page.results.len(), 50);
    assert!(!page.has_more);

    let probe = &ledger.probes()[0];
    assert_eq!(probe.fetched(), 50);
    assert_eq!(probe.closes(), 1);
}

#[tokio::test]
async fn test_total_cap_is_read_per_call() {
    let (dispatcher, _ledger) = dispatcher_with(seeded_ledger(40), &config(10, 1000));

    let first = dispatcher.start_query(&history_request("tx1")).await.unwrap();
    assert_eq!(first.results.len(), 10);

    // 11 released so far (10 on the page, one held back)
    dispatcher.limits().set_total_cap(13);
    let handle = QueryHandle::new(CHAIN, "tx1", &first.query_id);
    let second = dispatcher.next_page(&handle).await.unwrap();
    assert_eq!(second.results.len(), 3);
    assert!(!second.has_more);
}

#[tokio::test]
async fn test_range_query() {
    let (dispatcher, _ledger) = dispatcher_with(seeded_ledger(0), &config(10, 1000));
    let request = StartQueryRequest::range(CHAIN, "tx1", "assets", "m005", Some("m008".to_string()));

    let page = dispatcher.start_query(&request).await.unwrap();
    let keys: Vec<String> = page
        .decode_results()
        .unwrap()
        .into_iter()
        .map(|result| match result {
            QueryResult::State(kv) => kv.key,
            QueryResult::History(_) => panic!("Expected state item"),
        })
        .collect();

    assert_eq!(keys, vec!["m005", "m006", "m007"]);
    assert!(!page.has_more);
}

#[tokio::test]
async fn test_empty_history_is_a_single_empty_page() {
    let (dispatcher, _ledger) = dispatcher_with(seeded_ledger(0), &config(10, 1000));

    let page = dispatcher.start_query(&history_request("tx1")).await.unwrap();
    assert!(page.results.is_empty());
    assert!(!page.has_more);
}

#[tokio::test]
async fn test_duplicate_start_leaves_existing_session() {
    let (dispatcher, ledger) = dispatcher_with(seeded_ledger(30), &config(10, 1000));
    let first = dispatcher.start_query(&history_request("tx1")).await.unwrap();

    let err = dispatcher.start_query(&history_request("tx1")).await.unwrap_err();
    assert!(matches!(err, Error::SessionExists { .. }));
    assert_eq!(ledger.probes().len(), 1);

    let handle = QueryHandle::new(CHAIN, "tx1", &first.query_id);
    let next = dispatcher.next_page(&handle).await.unwrap();
    assert_eq!(history_tx_ids(&next)[0], "tx-010");
    assert_eq!(ledger.probes()[0].closes(), 0);
}

#[tokio::test]
async fn test_same_tx_on_other_chain_is_independent() {
    let mut provider = MemoryLedgerProvider::new();
    provider.insert("a", seeded_ledger(3));
    provider.insert("b", seeded_ledger(3));
    let dispatcher = Dispatcher::new(Arc::new(provider), &config(10, 100)).unwrap();

    for chain in ["a", "b"] {
        let request = StartQueryRequest::history(chain, "tx1", "marbles", "marble1");
        assert!(dispatcher.start_query(&request).await.is_ok());
    }
    assert_eq!(dispatcher.registry().len().await, 2);
}

#[tokio::test]
async fn test_unknown_lookups_do_not_mutate() {
    let (dispatcher, ledger) = dispatcher_with(seeded_ledger(30), &config(10, 1000));
    let first = dispatcher.start_query(&history_request("tx1")).await.unwrap();

    let err = dispatcher
        .next_page(&QueryHandle::new(CHAIN, "tx-other", &first.query_id))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SessionNotFound { .. }));

    let err = dispatcher
        .next_page(&QueryHandle::new(CHAIN, "tx1", "q-999"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::IteratorNotFound { .. }));

    assert_eq!(dispatcher.registry().keys().await, vec![SessionKey::new(CHAIN, "tx1")]);
    assert_eq!(ledger.probes()[0].closes(), 0);
    assert_eq!(ledger.probes()[0].fetched(), 11);
}

#[tokio::test]
async fn test_unknown_chain() {
    let (dispatcher, _ledger) = dispatcher_with(seeded_ledger(3), &config(10, 1000));
    let request = StartQueryRequest::history("nochannel", "tx1", "marbles", "marble1");

    let err = dispatcher.start_query(&request).await.unwrap_err();
    assert!(matches!(err, Error::UnknownChain { .. }));
    assert!(dispatcher.registry().is_empty().await);
}

#[tokio::test]
async fn test_open_failure_releases_the_session() {
    let dispatcher = Dispatcher::new(Arc::new(BrokenProvider), &config(10, 100)).unwrap();

    let err = dispatcher.start_query(&history_request("tx1")).await.unwrap_err();
    assert!(matches!(err, Error::Ledger { .. }));
    assert!(dispatcher.registry().is_empty().await);
}

#[tokio::test]
async fn test_sequence_failure_cleans_up_entry() {
    let ledger = seeded_ledger(30).fail_sequences_at(15, "history iterator broke");
    let (dispatcher, ledger) = dispatcher_with(ledger, &config(10, 1000));

    let first = dispatcher.start_query(&history_request("tx1")).await.unwrap();
    assert_eq!(first.results.len(), 10);

    let handle = QueryHandle::new(CHAIN, "tx1", &first.query_id);
    let err = dispatcher.next_page(&handle).await.unwrap_err();
    assert!(matches!(err, Error::Sequence { .. }));
    assert_eq!(ledger.probes()[0].closes(), 1);

    let err = dispatcher.next_page(&handle).await.unwrap_err();
    assert!(matches!(err, Error::IteratorNotFound { .. }));
}

#[tokio::test]
async fn test_serialization_failure_cleans_up_entry() {
    let config = ServiceConfig {
        max_result_bytes: 16,
        ..config(10, 1000)
    };
    let (dispatcher, ledger) = dispatcher_with(seeded_ledger(3), &config);

    let err = dispatcher.start_query(&history_request("tx1")).await.unwrap_err();
    assert!(matches!(err, Error::Serialization { .. }));
    assert_eq!(ledger.probes()[0].closes(), 1);
    assert!(dispatcher.registry().get(&SessionKey::new(CHAIN, "tx1")).await.unwrap().is_empty().await);
}

// ============================================================================
// CloseQuery Tests
// ============================================================================

#[tokio::test]
async fn test_close_mid_query() {
    let (dispatcher, ledger) = dispatcher_with(seeded_ledger(30), &config(10, 1000));
    let first = dispatcher.start_query(&history_request("tx1")).await.unwrap();
    let handle = QueryHandle::new(CHAIN, "tx1", &first.query_id);

    dispatcher.close_query(&handle).await;
    assert!(dispatcher.registry().is_empty().await);
    assert_eq!(ledger.probes()[0].closes(), 1);

    let err = dispatcher.next_page(&handle).await.unwrap_err();
    assert!(matches!(err, Error::SessionNotFound { .. }));

    // Closing twice is harmless
    dispatcher.close_query(&handle).await;
    assert_eq!(ledger.probes()[0].closes(), 1);
}

#[tokio::test]
async fn test_close_after_exhaustion_removes_session() {
    let (dispatcher, ledger) = dispatcher_with(seeded_ledger(3), &config(10, 1000));
    let page = dispatcher.start_query(&history_request("tx1")).await.unwrap();
    assert!(!page.has_more);
    assert_eq!(dispatcher.registry().len().await, 1);

    dispatcher
        .close_query(&QueryHandle::new(CHAIN, "tx1", &page.query_id))
        .await;
    assert!(dispatcher.registry().is_empty().await);
    assert_eq!(ledger.probes()[0].closes(), 1);
}

#[tokio::test]
async fn test_close_unknown_session_is_an_ack() {
    let (dispatcher, _ledger) = dispatcher_with(seeded_ledger(3), &config(10, 1000));
    dispatcher
        .close_query(&QueryHandle::new(CHAIN, "tx-none", "q-1"))
        .await;
    assert!(dispatcher.registry().is_empty().await);
}

// ============================================================================
// PointLookup Tests
// ============================================================================

#[tokio::test]
async fn test_point_lookup() {
    let mut ledger = seeded_ledger(3);
    ledger.delete("marbles", "marble2", "tx-del");
    let (dispatcher, _ledger) = dispatcher_with(ledger, &config(10, 1000));

    let value = dispatcher.point_lookup(CHAIN, "marbles", "marble1").await.unwrap();
    assert_eq!(value, Bytes::from("v2"));

    let err = dispatcher.point_lookup(CHAIN, "marbles", "marble2").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));

    let err = dispatcher.point_lookup("nochannel", "marbles", "marble1").await.unwrap_err();
    assert!(matches!(err, Error::UnknownChain { .. }));
}

#[tokio::test]
async fn test_point_lookup_store_failure() {
    let dispatcher = Dispatcher::new(Arc::new(BrokenProvider), &config(10, 100)).unwrap();
    let err = dispatcher.point_lookup(CHAIN, "marbles", "marble1").await.unwrap_err();
    assert!(matches!(err, Error::Ledger { .. }));
}

// ============================================================================
// Invoke Tests
// ============================================================================

#[tokio::test]
async fn test_invoke_argument_checks() {
    let (dispatcher, _ledger) = dispatcher_with(seeded_ledger(3), &config(10, 1000));

    let err = dispatcher.invoke(CHAIN, "tx1", &args(&["GetState"])).await.unwrap_err();
    assert_eq!(err.to_string(), "Incorrect number of arguments, 1");

    let err = dispatcher
        .invoke(CHAIN, "tx1", &args(&["GetHistoryForKey", "marbles"]))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "missing 3rd argument for GetHistoryForKey");

    let err = dispatcher
        .invoke(CHAIN, "tx1", &args(&["PutState", "marbles", "k"]))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Requested function PutState not found.");

    let err = dispatcher
        .invoke("nochannel", "tx1", &args(&["GetState", "marbles", "k"]))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid chain ID, nochannel");

    let err = dispatcher
        .invoke(CHAIN, "tx1", &args(&["GetState", "marbles", ""]))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "State key must not be nil");
}

#[tokio::test]
async fn test_invoke_get_state() {
    let (dispatcher, _ledger) = dispatcher_with(seeded_ledger(3), &config(10, 1000));

    let response = dispatcher
        .invoke(CHAIN, "tx1", &args(&["GetState", "marbles", "marble1"]))
        .await
        .unwrap();
    assert_eq!(
        response,
        InvokeResponse::Value {
            value: Bytes::from("v2")
        }
    );
}

#[tokio::test]
async fn test_invoke_protocol() {
    let (dispatcher, ledger) = dispatcher_with(seeded_ledger(15), &config(10, 1000));

    let response = dispatcher
        .invoke(CHAIN, "tx1", &args(&["GetHistoryForKey", "marbles", "marble1"]))
        .await
        .unwrap();
    let first = response.as_page().unwrap();
    assert!(first.has_more);

    // The follow-up calls carry the same tx id as an argument
    let response = dispatcher
        .invoke(CHAIN, "tx-caller", &args(&["QueryStateNext", "tx1", &first.query_id]))
        .await
        .unwrap();
    let second = response.as_page().unwrap();
    assert_eq!(second.results.len(), 5);
    assert!(!second.has_more);

    let response = dispatcher
        .invoke(CHAIN, "tx-caller", &args(&["QueryStateClose", "tx1", &first.query_id]))
        .await
        .unwrap();
    assert_eq!(response, InvokeResponse::Ack);
    assert!(dispatcher.registry().is_empty().await);
    assert_eq!(ledger.probes()[0].closes(), 1);
}

#[tokio::test]
async fn test_invoke_range_with_open_end() {
    let (dispatcher, _ledger) = dispatcher_with(seeded_ledger(0), &config(100, 1000));

    let response = dispatcher
        .invoke(CHAIN, "tx1", &args(&["GetStateByRange", "assets", "m020"]))
        .await
        .unwrap();
    assert_eq!(response.as_page().unwrap().results.len(), 10);
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_next_page_calls() {
    let (dispatcher, ledger) = dispatcher_with(seeded_ledger(100), &config(10, 1000));
    let first = dispatcher.start_query(&history_request("tx1")).await.unwrap();
    let handle = QueryHandle::new(CHAIN, "tx1", &first.query_id);

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            let handle = handle.clone();
            tokio::spawn(async move { dispatcher.next_page(&handle).await })
        })
        .collect();

    let mut seen = history_tx_ids(&first);
    let mut last_pages = 0;
    for outcome in join_all(tasks).await {
        match outcome.unwrap() {
            Ok(page) => {
                assert_eq!(page.results.len(), 10);
                if !page.has_more {
                    last_pages += 1;
                }
                seen.extend(history_tx_ids(&page));
            }
            Err(e) => assert!(matches!(e, Error::IteratorNotFound { .. })),
        }
    }

    seen.sort();
    let expected: Vec<String> = (0..100).map(|i| format!("tx-{i:03}")).collect();
    assert_eq!(seen, expected);
    assert_eq!(last_pages, 1);
    assert_eq!(ledger.probes()[0].closes(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stale_query_does_not_delete_successor_session() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let ledger = Arc::new(HeldLedger {
        inner: seeded_ledger(5),
        held: AtomicBool::new(false),
        entered: Arc::clone(&entered),
        release: Arc::clone(&release),
    });
    let config = ServiceConfig {
        delete_session_on_exhaustion: true,
        ..config(2, 1000)
    };
    let dispatcher = Dispatcher::new(Arc::new(HeldProvider(ledger)), &config)
        .unwrap()
        .with_id_generator(Arc::new(SequentialIds::new("q")));

    let first = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move { dispatcher.start_query(&history_request("tx1")).await }
    });
    entered.notified().await;

    // The reaper takes the session out, then waits on the held entry
    let reaper = tokio::spawn({
        let registry = dispatcher.registry().clone();
        async move { registry.reap_idle(Duration::ZERO).await }
    });
    while !dispatcher.registry().is_empty().await {
        tokio::task::yield_now().await;
    }

    let successor = dispatcher.start_query(&history_request("tx1")).await.unwrap();
    assert_eq!(successor.query_id, "q-2");
    assert!(successor.has_more);

    release.notify_one();
    let first = first.await.unwrap().unwrap();
    assert!(!first.has_more);
    assert_eq!(reaper.await.unwrap(), vec![SessionKey::new(CHAIN, "tx1")]);

    let handle = QueryHandle::new(CHAIN, "tx1", &successor.query_id);
    let next = dispatcher.next_page(&handle).await.unwrap();
    assert_eq!(history_tx_ids(&next), vec!["tx-002", "tx-003"]);
    assert_eq!(dispatcher.registry().len().await, 1);
}
