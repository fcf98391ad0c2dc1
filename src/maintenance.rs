//! Scheduled cache maintenance.
//!
//! A maintenance cycle sweeps entries older than a lenient multiple of the
//! per-read expiry window, then compacts the storage file. The periodic task
//! catches and logs every failure; it never takes the host process down.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::cache::CacheStore;

/// Default spacing between maintenance cycles.
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Sweep window multiplier over the per-read expiry.
///
/// Reads already evict entries past the per-read window; the bulk sweep only
/// needs to catch entries nothing has read for much longer.
pub const SWEEP_EXPIRY_MULTIPLIER: i64 = 10;

/// Runs one maintenance cycle: sweep with the widened window, then compact.
///
/// Failures are logged and swallowed.
pub async fn run_cycle(store: &CacheStore, expiry_minutes: i64) {
    let sweep_window = expiry_minutes.saturating_mul(SWEEP_EXPIRY_MULTIPLIER);
    match store.sweep_expired(sweep_window).await {
        Ok(removed) => info!("cache maintenance swept {} expired entries", removed),
        Err(err) => error!("error during scheduled cache sweep: {}", err),
    }
    if let Err(err) = store.compact().await {
        error!("error during cache compaction: {}", err);
    }
}

/// Spawns the periodic maintenance task.
///
/// The first cycle runs immediately; later cycles follow every `interval`.
/// The returned handle can be aborted during shutdown.
pub fn spawn(store: Arc<CacheStore>, expiry_minutes: i64, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "starting cache maintenance task (every {}s)",
            interval.as_secs()
        );
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            info!("running scheduled cache maintenance");
            run_cycle(&store, expiry_minutes).await;
        }
    })
}
