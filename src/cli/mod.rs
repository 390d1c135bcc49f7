//! CLI module
//!
//! Command-line interface for the query service.
//!
//! # Commands
//!
//! - `serve` - Start HTTP server mode
//! - `query` - Page through a query against the seeded ledger
//! - `get` - Point lookup
//! - `validate` - Check config and seed files

mod commands;
mod runner;
mod server;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
pub use server::{router, serve, ServerConfig};
