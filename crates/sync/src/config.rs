//! Sync engine configuration.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum number of heights fetched concurrently.
    pub pool_size: usize,
    /// Timeout of a single block fetch from one peer.
    pub fetch_timeout: Duration,
    /// Backoff between retries of a failed height.
    pub retry_interval: Duration,
    /// Cadence of the periodic catch-up check.
    pub check_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pool_size: 300,
            fetch_timeout: Duration::from_secs(60),
            retry_interval: Duration::from_secs(10),
            check_interval: Duration::from_secs(30),
        }
    }
}
