//! Idle session reaper
//!
//! Sessions whose caller never sends NextPage or CloseQuery again would
//! hold their result sequences forever. The reaper periodically closes and
//! deletes sessions that have not been touched for a configured time.

use super::registry::SessionRegistry;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Reaper settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperConfig {
    /// Sessions idle at least this long are reaped
    pub max_idle: Duration,
    /// How often the registry is scanned
    pub interval: Duration,
}

impl ReaperConfig {
    /// Create reaper settings
    pub fn new(max_idle: Duration, interval: Duration) -> Self {
        Self { max_idle, interval }
    }
}

/// Spawn a background task reaping idle sessions from `registry`
///
/// The task runs until the returned handle is aborted.
pub fn spawn_reaper(registry: SessionRegistry, config: ReaperConfig) -> JoinHandle<()> {
    tracing::info!(
        max_idle_secs = config.max_idle.as_secs(),
        interval_secs = config.interval.as_secs(),
        "Starting idle session reaper"
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let reaped = registry.reap_idle(config.max_idle).await;
            if !reaped.is_empty() {
                tracing::info!(count = reaped.len(), "Reaped idle query sessions");
            }
        }
    })
}
