//! Service configuration
//!
//! This module contains the settings that shape pagination and session
//! housekeeping, loaded from YAML and overridable from the command line.

use crate::error::{Error, Result, ResultExt};
use crate::pagination::DEFAULT_PAGE_CAP;
use crate::session::DEFAULT_MAX_ITEM_BYTES;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Service Config
// ============================================================================

/// Complete service configuration loaded from YAML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Maximum results per page
    #[serde(default = "default_page_cap")]
    pub page_cap: usize,

    /// Maximum results across all pages of one query
    #[serde(default = "default_total_cap")]
    pub total_cap: u64,

    /// Largest encoded size of a single result
    #[serde(default = "default_max_result_bytes")]
    pub max_result_bytes: usize,

    /// Delete the session once its query is exhausted
    #[serde(default)]
    pub delete_session_on_exhaustion: bool,

    /// Reap sessions untouched for this long; unset disables the reaper
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,

    /// How often the reaper looks for idle sessions
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            page_cap: default_page_cap(),
            total_cap: default_total_cap(),
            max_result_bytes: default_max_result_bytes(),
            delete_session_on_exhaustion: false,
            idle_timeout_secs: None,
            reap_interval_secs: default_reap_interval(),
        }
    }
}

fn default_page_cap() -> usize {
    DEFAULT_PAGE_CAP
}

fn default_total_cap() -> u64 {
    100_000
}

fn default_max_result_bytes() -> usize {
    DEFAULT_MAX_ITEM_BYTES
}

fn default_reap_interval() -> u64 {
    30
}

impl ServiceConfig {
    /// Parse and validate a config from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.page_cap == 0 {
            return Err(Error::config("page_cap must be greater than zero"));
        }
        if self.max_result_bytes == 0 {
            return Err(Error::config("max_result_bytes must be greater than zero"));
        }
        if self.reap_interval_secs == 0 {
            return Err(Error::config("reap_interval_secs must be greater than zero"));
        }
        if self.idle_timeout_secs == Some(0) {
            return Err(Error::config("idle_timeout_secs must be greater than zero"));
        }
        Ok(())
    }

    /// Idle timeout, if the reaper is enabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    /// Interval between reaper passes
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    /// Shared limits handle seeded from this config
    pub fn limits(&self) -> QueryLimits {
        QueryLimits::new(self.total_cap)
    }
}

// ============================================================================
// Runtime Limits
// ============================================================================

/// Limits read on every StartQuery / NextPage call
///
/// Cloning shares the underlying values, so a change made through one
/// handle is seen by every dispatcher holding another.
#[derive(Debug, Clone)]
pub struct QueryLimits {
    total_cap: Arc<AtomicU64>,
}

impl QueryLimits {
    pub fn new(total_cap: u64) -> Self {
        Self {
            total_cap: Arc::new(AtomicU64::new(total_cap)),
        }
    }

    /// Current total result limit per query
    pub fn total_cap(&self) -> u64 {
        self.total_cap.load(Ordering::Relaxed)
    }

    /// Change the total result limit; applies from the next page on
    pub fn set_total_cap(&self, total_cap: u64) {
        tracing::info!(total_cap, "Updated total query limit");
        self.total_cap.store(total_cap, Ordering::Relaxed);
    }
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self::new(default_total_cap())
    }
}
