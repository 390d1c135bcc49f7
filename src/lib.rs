// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Ledger Pager
//!
//! Cursor pagination over lazily produced ledger query results.
//!
//! Every call is stateless at the transport level. The state needed to
//! resume a query lives in a session registry keyed by (chain id, tx id):
//! a query is opened with StartQuery, continued with NextPage until
//! `has_more` is false, and released with CloseQuery.
//!
//! ## Features
//!
//! - **Bounded pages**: a per-page cap and a per-query total cap
//! - **No look-ahead leakage**: the item that proves more data exists is
//!   held back as the first item of the next page
//! - **Exactly-once release**: every result sequence is closed exactly once,
//!   whether the query is exhausted, fails, is closed or is abandoned
//! - **Range and history queries** over any `QuerySource`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ledger_pager::{Dispatcher, LedgerSeed, QueryHandle, ServiceConfig, StartQueryRequest};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> ledger_pager::Result<()> {
//!     let provider = LedgerSeed::from_file("ledger.yaml")?.into_provider();
//!     let dispatcher = Dispatcher::new(Arc::new(provider), &ServiceConfig::default())?;
//!
//!     let request = StartQueryRequest::history("mychannel", "tx1", "marbles", "marble1");
//!     let mut page = dispatcher.start_query(&request).await?;
//!     let handle = QueryHandle::new("mychannel", "tx1", &page.query_id);
//!     while page.has_more {
//!         page = dispatcher.next_page(&handle).await?;
//!     }
//!     dispatcher.close_query(&handle).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Dispatcher                             │
//! │  StartQuery   NextPage   CloseQuery   PointLookup   invoke(args) │
//! └─────────────────────────────────────────────────────────────────┘
//!                 │                          │
//! ┌───────────────┴──────────┐   ┌───────────┴───────────┐
//! │     SessionRegistry      │   │      PageBuilder      │
//! │  Session → IteratorEntry │   │  page cap / total cap │
//! │  (sequence, batch, count)│   │                       │
//! └───────────────┬──────────┘   └───────────────────────┘
//!                 │
//! ┌───────────────┴──────────────────────────────────────┐
//! │      LedgerProvider → QuerySource → ResultSequence    │
//! └──────────────────────────────────────────────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and serde helpers
pub mod types;

/// Service configuration and runtime limits
pub mod config;

/// Query sources, result sequences and the in-memory ledger
pub mod ledger;

/// Query sessions and their iterator entries
pub mod session;

/// Page building
pub mod pagination;

/// Operation dispatch
pub mod dispatch;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use config::{QueryLimits, ServiceConfig};
pub use dispatch::{Dispatcher, InvokeResponse, QueryHandle, StartQueryRequest};
pub use ledger::{LedgerProvider, LedgerSeed, QueryResult, QuerySource, ResultSequence};
pub use pagination::{PageBuilder, PageResponse};
pub use session::{SessionKey, SessionRegistry};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
