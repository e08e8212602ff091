use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use portscan_rs::{config::Config, logging, service};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::parse();
    logging::init(&cfg.log_level, cfg.log_format).context("failed to install logger")?;

    info!(
        bind = %cfg.bind(),
        base_url = %cfg.base_url,
        concurrency = cfg.scan_settings().concurrency,
        timeout_ms = cfg.timeout_ms,
        cache_dir = %cfg.cache_dir.display(),
        cache_expiry_secs = cfg.cache_expiry_secs,
        discovery_url = cfg.discovery_url.as_deref().unwrap_or("<none>"),
        "portscan-rs starting"
    );

    // Ctrl-C stops the server and both background loops.
    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown requested");
        on_signal.cancel();
    });

    service::run(&cfg, shutdown).await?;
    Ok(())
}
