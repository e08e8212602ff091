//! Wires the query interface, scan orchestrator and discovery manager together.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cache::CacheStore;
use crate::config::Config;
use crate::discovery::{DiscoveryManager, HttpDiscoveryFeed};
use crate::error::Result;
use crate::jobs::JobQueue;
use crate::orchestrator::ScanOrchestrator;
use crate::query::QueryService;
use crate::server::{self, AppState};

/// Delay before a failed orchestrator is started again.
pub const RESTART_BACKOFF: Duration = Duration::from_secs(5);

/// Run every component until `shutdown` fires or the server stops.
pub async fn run(config: &Config, shutdown: CancellationToken) -> Result<()> {
    let cache = CacheStore::open(&config.cache_dir)?;
    let settings = config.scan_settings();
    let query = QueryService::new(cache.clone(), settings);
    let mut background = JoinSet::new();

    let jobs = match &config.discovery_url {
        Some(url) => {
            let jobs = Arc::new(JobQueue::new());
            let orch = ScanOrchestrator::new(jobs.clone(), cache.clone(), settings, config.idle_poll());
            background.spawn(supervise(orch, shutdown.clone(), RESTART_BACKOFF));

            let feed = HttpDiscoveryFeed::new(url.clone(), config.discovery_timeout())?;
            let manager = DiscoveryManager::new(feed, jobs.clone(), cache.clone(), config.manager_settings());
            let stop = shutdown.clone();
            background.spawn(async move { manager.run(stop).await });
            info!(%url, "continuous scanning enabled");
            Some(jobs)
        }
        None => {
            info!("no discovery URL configured, continuous scanning disabled");
            None
        }
    };

    let served = server::serve(
        &config.bind(),
        &config.base_url,
        AppState::new(query, jobs),
        shutdown.clone(),
    )
    .await;

    // Whatever stopped the server also stops the background loops.
    shutdown.cancel();
    while let Some(res) = background.join_next().await {
        if let Err(e) = res {
            error!("background task failed: {e}");
        }
    }
    served
}

/// Keep the orchestrator running, restarting it after a fatal job error.
pub async fn supervise(orch: ScanOrchestrator, shutdown: CancellationToken, backoff: Duration) {
    loop {
        match orch.run(shutdown.clone()).await {
            Ok(()) => return,
            Err(e) => {
                error!("scan orchestrator failed, restarting in {backoff:?}: {e}");
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }
}
