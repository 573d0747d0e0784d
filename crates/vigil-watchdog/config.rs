//! Watchdog configuration

use std::time::Duration;

/// Configuration for crash accounting and snapshot scheduling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// Number of crashes tolerated unconditionally before the inter-crash
    /// rate starts being checked
    pub crash_number_limit: usize,

    /// Minimum average time between the most recent crashes for a restart
    /// to still be attempted once `crash_number_limit` is exceeded
    pub minimum_non_error_time: Duration,

    /// Minimum interval between two snapshot captures
    pub save_interval: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            crash_number_limit: 3,
            minimum_non_error_time: Duration::from_secs(5),
            save_interval: Duration::from_secs(5),
        }
    }
}
