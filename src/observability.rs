use std::net::SocketAddr;
use std::time::Instant;

use crate::error::CoreResult;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: core operations executed. Labels: operation, status.
pub const OPERATIONS_TOTAL: &str = "petshop_operations_total";

/// Histogram: operation latency in seconds. Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "petshop_operation_duration_seconds";

/// Counter: appointment creations refused by a schedule block.
pub const SCHEDULE_CONFLICTS_TOTAL: &str = "petshop_schedule_conflicts_total";

/// Counter: identity records left behind after every compensating delete failed.
pub const COMPENSATION_FAILURES_TOTAL: &str = "petshop_compensation_failures_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: organization partitions loaded in the store.
pub const ORGANIZATIONS_ACTIVE: &str = "petshop_organizations_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "petshop_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (records per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "petshop_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Count and time one core operation.
pub fn record<T>(operation: &'static str, started: Instant, result: &CoreResult<T>) {
    let status = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::counter!(OPERATIONS_TOTAL, "operation" => operation, "status" => status).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}
