use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::observability::JOURNAL_COMPACTIONS_TOTAL;
use crate::store::{Store, StoreError};

const CHECK_EVERY: Duration = Duration::from_secs(30);

/// Background task that rewrites the journal once enough appends pile up.
pub async fn run_compactor(store: Arc<Store>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_EVERY);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_due(&store, threshold).await {
            tracing::error!("journal compaction failed: {e}");
        }
    }
}

/// Compact when appends since the last compaction reach `threshold`.
/// Returns whether a compaction ran. A threshold of 0 disables compaction.
pub async fn compact_if_due(store: &Store, threshold: u64) -> Result<bool, StoreError> {
    if threshold == 0 {
        return Ok(false);
    }
    let appends = store.journal_appends_since_compact().await;
    if appends < threshold {
        return Ok(false);
    }
    match store.compact_journal().await {
        Ok(()) => {
            metrics::counter!(JOURNAL_COMPACTIONS_TOTAL, "status" => "ok").increment(1);
            info!("compacted journal after {appends} appends");
            Ok(true)
        }
        Err(e) => {
            metrics::counter!(JOURNAL_COMPACTIONS_TOTAL, "status" => "error").increment(1);
            Err(e)
        }
    }
}
