//! Background task that drops idle connections on an interval.
//!
//! Expired entries are already treated as misses by `get`, but without a
//! sweep their sockets stay open until the key is requested again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::cache::ConnectionCache;
use crate::traits::Disposable;

/// Default sweep interval.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Run until `shutdown_rx` flips to `true`. Returns the total number of
/// entries purged.
pub async fn expiry_sweeper<H>(
    cache: Arc<ConnectionCache<H>>,
    every: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> usize
where
    H: ?Sized + Disposable + 'static,
{
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = every.as_secs(),
        ttl_secs = cache.config().ttl.as_secs(),
        "Connection expiry sweeper started"
    );

    let mut purged_total = 0usize;
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Connection expiry sweeper shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                let purged = cache.purge_expired().await;
                purged_total += purged;
                if purged > 0 {
                    tracing::info!(purged, "Purged idle tenant database connections");
                } else {
                    tracing::trace!("Expiry sweep found nothing to purge");
                }
            }
        }
    }

    purged_total
}
