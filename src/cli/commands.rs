//! CLI commands and argument parsing

use crate::types::QueryMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Paginated ledger query service
#[derive(Parser, Debug)]
#[command(name = "ledger-pager")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Service configuration file (YAML)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Ledger seed file (YAML)
    #[arg(short, long, global = true)]
    pub ledger: Option<PathBuf>,

    /// Override the maximum results per page
    #[arg(long, global = true)]
    pub page_cap: Option<usize>,

    /// Override the maximum results per query
    #[arg(long, global = true)]
    pub total_cap: Option<u64>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server mode
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Run a paginated query to the end and print every page
    Query {
        /// Chain id
        #[arg(long)]
        chain: String,

        /// Transaction id the session is opened under
        #[arg(long, default_value = "cli")]
        tx: String,

        /// Namespace
        #[arg(long)]
        namespace: String,

        /// Key (history) or start key (range)
        #[arg(long)]
        key: String,

        /// Exclusive end key (range only)
        #[arg(long)]
        end_key: Option<String>,

        /// Query mode
        #[arg(long, default_value = "history")]
        mode: QueryMode,
    },

    /// Read the current value of a key
    Get {
        /// Chain id
        #[arg(long)]
        chain: String,

        /// Namespace
        #[arg(long)]
        namespace: String,

        /// Key
        #[arg(long)]
        key: String,
    },

    /// Validate the config and ledger seed files
    Validate,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}
