//! Ledger seed files
//!
//! The bundled in-memory ledger is populated from a YAML document:
//!
//! ```yaml
//! chains:
//!   mychannel:
//!     namespaces:
//!       marbles:
//!         marble1:
//!           - tx_id: tx-100
//!             value: '{"color":"blue"}'
//!             timestamp: 2024-01-01T00:00:00Z
//!           - tx_id: tx-101
//!             delete: true
//! ```

use super::memory::{InMemoryLedger, MemoryLedgerProvider};
use super::types::KeyModification;
use crate::error::{Error, Result, ResultExt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Complete seed document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSeed {
    /// Ledgers by chain id
    #[serde(default)]
    pub chains: BTreeMap<String, ChainSeed>,
}

/// Seed for one chain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainSeed {
    /// namespace -> key -> writes in commit order
    #[serde(default)]
    pub namespaces: BTreeMap<String, BTreeMap<String, Vec<SeedWrite>>>,
}

/// One write in a key's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedWrite {
    /// Writing transaction
    pub tx_id: String,
    /// UTF-8 value (ignored for deletes)
    #[serde(default)]
    pub value: String,
    /// Commit time (defaults to load time)
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Whether this write deletes the key
    #[serde(default)]
    pub delete: bool,
}

impl LedgerSeed {
    /// Parse a seed from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let seed: Self = serde_yaml::from_str(yaml)?;
        seed.validate()?;
        Ok(seed)
    }

    /// Load a seed file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
            .with_context(|| format!("Invalid ledger seed {}", path.display()))
    }

    /// Reject writes without a transaction id
    pub fn validate(&self) -> Result<()> {
        for (chain_id, chain) in &self.chains {
            for (namespace, keys) in &chain.namespaces {
                for (key, writes) in keys {
                    if writes.iter().any(|w| w.tx_id.is_empty()) {
                        return Err(Error::config(format!(
                            "{chain_id}/{namespace}/{key}: every write needs a tx_id"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Total number of writes across all chains
    pub fn write_count(&self) -> usize {
        self.chains
            .values()
            .flat_map(|chain| chain.namespaces.values())
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    /// Build one in-memory ledger per chain
    pub fn into_provider(self) -> MemoryLedgerProvider {
        let loaded_at = Utc::now();
        let mut provider = MemoryLedgerProvider::new();

        for (chain_id, chain) in self.chains {
            let mut ledger = InMemoryLedger::new();
            for (namespace, keys) in chain.namespaces {
                for (key, writes) in keys {
                    for write in writes {
                        let timestamp = write.timestamp.unwrap_or(loaded_at);
                        let modification = if write.delete {
                            KeyModification::delete(write.tx_id, timestamp)
                        } else {
                            KeyModification::write(write.tx_id, write.value.into_bytes(), timestamp)
                        };
                        ledger.record(namespace.clone(), key.clone(), modification);
                    }
                }
            }
            provider.insert(chain_id, ledger);
        }

        provider
    }
}
