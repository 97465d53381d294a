//! Periodic stale-device eviction.

use std::time::Duration;

use crossdrop_core::registry::now_millis;
use tracing::info;

use crate::server::SharedCore;

/// Every `interval`, evict devices not seen within `timeout_ms`. Runs until the runtime stops.
pub async fn run_sweeper(core: SharedCore, interval: Duration, timeout_ms: u64) {
    loop {
        tokio::time::sleep(interval).await;
        let evicted = core.lock().await.evict_stale(now_millis(), timeout_ms);
        for id in &evicted {
            info!(device = %id, "device timed out");
        }
    }
}
