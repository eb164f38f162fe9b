use std::sync::Arc;

use tracing::{info, warn};

use petshop_core::config::Config;
use petshop_core::notify::InvalidationHub;
use petshop_core::store::Store;
use petshop_core::{compactor, observability};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(Store::open(config.wal_path(), Arc::new(InvalidationHub::new()))?);

    info!("petshop-core started");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  utc_offset: {}", config.utc_offset);
    info!("  compact_threshold: {}", config.compact_threshold);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );
    for summary in store.summaries().await {
        info!("organization {}", serde_json::to_string(&summary)?);
    }

    let compactor = tokio::spawn(compactor::run_compactor(store.clone(), config.compact_threshold));

    shutdown_signal().await?;
    info!("shutdown signal received");
    compactor.abort();

    match store.compact_wal().await {
        Ok(()) => info!("final WAL compaction done"),
        Err(e) => warn!("final WAL compaction failed: {e}"),
    }
    info!("petshop-core stopped");
    Ok(())
}

/// Resolves on ctrl-c, or SIGTERM on unix.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = sigterm.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
