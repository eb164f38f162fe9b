use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::store::Store;

pub const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact the WAL once at least `threshold` records were appended since the
/// last rewrite. Returns whether a compaction ran.
pub async fn compact_if_due(store: &Store, threshold: u64) -> bool {
    let appended = store.wal_appends_since_compact().await;
    if appended < threshold {
        debug!(appended, threshold, "compaction not due");
        return false;
    }
    match store.compact_wal().await {
        Ok(()) => {
            info!("compacted WAL after {appended} appends");
            true
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}

/// Background task checking the WAL size every [`COMPACT_CHECK_INTERVAL`].
pub async fn run_compactor(store: Arc<Store>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_due(&store, threshold).await;
    }
}
