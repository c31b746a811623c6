//! Acquisition configuration

use obd_client::LinkConfig;
use serde::{Deserialize, Serialize};

/// Configuration for the acquisition loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Wait between polling cycles (ms)
    pub poll_interval_ms: u64,

    /// Consecutive parameter-query failures before the link is presumed
    /// lost (default: 3)
    pub max_consecutive_failures: u32,

    /// Wait after teardown before the reconnect attempt (ms)
    pub reconnect_wait_ms: u64,

    /// Wait between failed reconnect attempts (ms)
    pub reconnect_retry_wait_ms: u64,

    /// Wait after the first connect before querying identity data (ms)
    pub identity_settle_ms: u64,

    /// Link configuration
    pub link: LinkConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            max_consecutive_failures: 3,
            reconnect_wait_ms: 5_000,
            reconnect_retry_wait_ms: 2_000,
            identity_settle_ms: 3_000,
            link: LinkConfig::default(),
        }
    }
}
