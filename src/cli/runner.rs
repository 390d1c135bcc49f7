//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::cli::server::{serve, ServerConfig};
use crate::config::ServiceConfig;
use crate::dispatch::{Dispatcher, QueryHandle, StartQueryRequest};
use crate::error::Result;
use crate::ledger::{LedgerSeed, MemoryLedgerProvider};
use crate::types::QueryMode;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Serve { port } => {
                let config = self.load_config()?;
                let dispatcher = self.build_dispatcher(&config)?;
                serve(ServerConfig::new(*port, config), dispatcher).await
            }
            Commands::Query {
                chain,
                tx,
                namespace,
                key,
                end_key,
                mode,
            } => {
                let request = StartQueryRequest {
                    chain_id: chain.clone(),
                    tx_id: tx.clone(),
                    namespace: namespace.clone(),
                    key: key.clone(),
                    end_key: end_key.clone(),
                    mode: *mode,
                };
                self.query(&request).await
            }
            Commands::Get {
                chain,
                namespace,
                key,
            } => self.get(chain, namespace, key).await,
            Commands::Validate => self.validate(),
        }
    }

    /// Load the service config and apply command-line overrides
    pub fn load_config(&self) -> Result<ServiceConfig> {
        let mut config = match &self.cli.config {
            Some(path) => ServiceConfig::from_file(path)?,
            None => ServiceConfig::default(),
        };

        if let Some(page_cap) = self.cli.page_cap {
            config.page_cap = page_cap;
        }
        if let Some(total_cap) = self.cli.total_cap {
            config.total_cap = total_cap;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load the ledger seed, or an empty one if none was given
    fn load_seed(&self) -> Result<LedgerSeed> {
        match &self.cli.ledger {
            Some(path) => LedgerSeed::from_file(path),
            None => {
                tracing::warn!("No ledger seed given (use -l), every chain is unknown");
                Ok(LedgerSeed::default())
            }
        }
    }

    fn build_dispatcher(&self, config: &ServiceConfig) -> Result<Dispatcher> {
        let provider: MemoryLedgerProvider = self.load_seed()?.into_provider();
        tracing::info!(chains = ?provider.chains(), "Loaded ledger");
        Dispatcher::new(Arc::new(provider), config)
    }

    /// Run a query to the end, one output message per page
    async fn query(&self, request: &StartQueryRequest) -> Result<()> {
        let config = self.load_config()?;
        let dispatcher = self.build_dispatcher(&config)?;
        let started = Instant::now();

        let mut page = dispatcher.start_query(request).await?;
        let handle = QueryHandle::new(&request.chain_id, &request.tx_id, &page.query_id);
        let mut pages = 0usize;
        let mut results = 0usize;

        loop {
            pages += 1;
            results += page.results.len();
            let decoded = page.decode_results()?;
            self.output_message(&json!({
                "type": "PAGE",
                "page": pages,
                "query_id": page.query_id,
                "has_more": page.has_more,
                "results": decoded,
            }));

            if !page.has_more {
                break;
            }
            page = match dispatcher.next_page(&handle).await {
                Ok(page) => page,
                Err(e) => {
                    dispatcher.close_query(&handle).await;
                    return Err(e);
                }
            };
        }

        dispatcher.close_query(&handle).await;

        let label = match request.mode {
            QueryMode::Range => format!("{}..{}", request.key, request.end_key.as_deref().unwrap_or("")),
            QueryMode::History => request.key.clone(),
        };
        self.output_message(&json!({
            "type": "SUMMARY",
            "mode": request.mode,
            "namespace": request.namespace,
            "key": label,
            "pages": pages,
            "results": results,
            "duration_ms": started.elapsed().as_millis() as u64,
        }));

        Ok(())
    }

    /// Point lookup
    async fn get(&self, chain: &str, namespace: &str, key: &str) -> Result<()> {
        let config = self.load_config()?;
        let dispatcher = self.build_dispatcher(&config)?;
        let value = dispatcher.point_lookup(chain, namespace, key).await?;

        self.output_message(&json!({
            "type": "VALUE",
            "namespace": namespace,
            "key": key,
            "value": String::from_utf8_lossy(&value),
        }));

        Ok(())
    }

    /// Validate config and seed
    fn validate(&self) -> Result<()> {
        let config = self.load_config()?;
        let seed = self.load_seed()?;

        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!(
                    "Config is valid (page_cap {}, total_cap {}); ledger has {} chains and {} writes",
                    config.page_cap,
                    config.total_cap,
                    seed.chains.len(),
                    seed.write_count()
                )
            }
        }));

        Ok(())
    }

    /// Output a message
    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}
