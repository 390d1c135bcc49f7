//! Pagination module
//!
//! Turns a lazily produced result sequence into bounded pages.
//!
//! # Overview
//!
//! Two independent limits end a query: the page cap bounds each page, the
//! total cap bounds all pages of one query together. A query is finished
//! when the total cap is reached, the sequence is exhausted, or it fails.

mod builder;
mod types;

pub use builder::{PageBuilder, DEFAULT_PAGE_CAP};
pub use types::{Page, PageResponse};
