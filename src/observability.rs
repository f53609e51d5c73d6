use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking attempts through the conflict-checked path. Labels: outcome.
pub const BOOKINGS_TOTAL: &str = "turnero_bookings_total";

/// Counter: appointment writes from any path. Labels: op.
pub const APPOINTMENT_WRITES_TOTAL: &str = "turnero_appointment_writes_total";

/// Counter: catalog writes. Labels: collection, op.
pub const CATALOG_WRITES_TOTAL: &str = "turnero_catalog_writes_total";

/// Counter: slot lists computed for the wizard.
pub const SLOT_QUERIES_TOTAL: &str = "turnero_slot_queries_total";

/// Counter: slot results dropped because the selection moved on.
pub const STALE_SLOT_RESULTS_TOTAL: &str = "turnero_stale_slot_results_total";

/// Histogram: seconds spent computing one slot list.
pub const SLOT_COMPUTE_DURATION_SECONDS: &str = "turnero_slot_compute_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: live feeds currently open.
pub const LIVE_FEEDS_ACTIVE: &str = "turnero_live_feeds_active";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "turnero_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "turnero_journal_flush_batch_size";

/// Counter: journal compactions. Labels: status.
pub const JOURNAL_COMPACTIONS_TOTAL: &str = "turnero_journal_compactions_total";

/// Install the fmt subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init_metrics(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
