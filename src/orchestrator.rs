//! Background loop that drains the job queue one host at a time.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use crate::cache::CacheStore;
use crate::error::{Error, Result};
use crate::jobs::JobQueue;
use crate::ports::{full_range_targets, FULL_RANGE};
use crate::scanner::{scan, ScanSettings};
use crate::types::{Host, ScanRecord};

#[derive(Debug, Clone)]
pub struct ScanOrchestrator {
    jobs: Arc<JobQueue>,
    cache: CacheStore,
    settings: ScanSettings,
    idle_poll: Duration,
    ports: RangeInclusive<u16>,
}

impl ScanOrchestrator {
    pub fn new(
        jobs: Arc<JobQueue>,
        cache: CacheStore,
        settings: ScanSettings,
        idle_poll: Duration,
    ) -> Self {
        Self {
            jobs,
            cache,
            settings,
            idle_poll,
            ports: FULL_RANGE,
        }
    }

    /// Restrict the ports covered per host (full range by default).
    pub fn with_port_range(mut self, ports: RangeInclusive<u16>) -> Self {
        self.ports = ports;
        self
    }

    /// Run until `shutdown` fires. A failed job ends the loop with its error.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!(
            concurrency = self.settings.concurrency,
            ports = ?self.ports,
            "scan orchestrator started"
        );
        while !shutdown.is_cancelled() {
            match self.jobs.try_pop() {
                Some(host) => {
                    let mac = host.mac.clone();
                    let res = self.process(host).await;
                    self.jobs.finish(&mac);
                    if let Err(e) = res {
                        error!(%mac, "scan job failed: {e}");
                        return Err(e);
                    }
                }
                None if self.jobs.is_empty() => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.idle_poll) => {}
                    }
                }
                None => tokio::task::yield_now().await,
            }
        }
        info!("scan orchestrator stopped");
        Ok(())
    }

    /// Full scan of one host, recorded in the cache. Returns the stored record.
    pub async fn process(&self, host: Host) -> Result<ScanRecord> {
        let span = info_span!("full_scan", mac = %host.mac, ip = %host.ipv4);
        async {
            info!("scanning");
            let targets = full_range_targets(host.ipv4, self.ports.clone());
            let outcome = scan(targets, self.settings).await;
            let record = ScanRecord::new(
                host,
                OffsetDateTime::now_utc(),
                outcome.timings,
                outcome.open.iter().map(|t| t.port),
            );
            self.cache.put(&record.host.mac, &record)?;
            info!(
                open = record.count,
                prep_sec = record.timestamps.phases.prep_sec,
                scan_sec = record.timestamps.phases.scan_sec,
                total_sec = record.timestamps.phases.total_sec,
                "scan recorded"
            );
            Ok::<_, Error>(record)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn drains_queue_into_cache() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();

        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path()).unwrap();
        let jobs = Arc::new(JobQueue::new());
        jobs.put(Host::new(Ipv4Addr::LOCALHOST, "aa:bb:cc:dd:ee:ff").unwrap());

        let orch = ScanOrchestrator::new(
            jobs.clone(),
            cache.clone(),
            ScanSettings::new(4, Duration::from_secs(2)),
            Duration::from_millis(10),
        )
        .with_port_range(open..=open);

        let shutdown = CancellationToken::new();
        let task = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { orch.run(shutdown).await }
        });

        let mut record = None;
        for _ in 0..200 {
            record = cache.get("AA:BB:CC:DD:EE:FF").unwrap();
            if record.is_some() && !jobs.is_pending("AA:BB:CC:DD:EE:FF") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        shutdown.cancel();
        task.await.unwrap().unwrap();

        let record = record.expect("host was scanned");
        assert_eq!(record.ports, vec![open]);
        assert_eq!(record.count, 1);
        assert!(!jobs.is_pending("AA:BB:CC:DD:EE:FF"));
    }

    #[tokio::test]
    async fn idle_loop_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let orch = ScanOrchestrator::new(
            Arc::new(JobQueue::new()),
            CacheStore::open(dir.path()).unwrap(),
            ScanSettings::default(),
            Duration::from_secs(3600),
        );
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        orch.run(shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn cache_failure_is_fatal_and_releases_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path().join("cache")).unwrap();
        let jobs = Arc::new(JobQueue::new());
        jobs.put(Host::new(Ipv4Addr::LOCALHOST, "AA:BB:CC:DD:EE:FF").unwrap());
        // Pull the directory out from under the store.
        std::fs::remove_dir_all(dir.path().join("cache")).unwrap();

        let orch = ScanOrchestrator::new(
            jobs.clone(),
            cache,
            ScanSettings::new(2, Duration::from_millis(200)),
            Duration::from_millis(10),
        )
        .with_port_range(1..=2);
        assert!(orch.run(CancellationToken::new()).await.is_err());
        assert!(!jobs.is_pending("AA:BB:CC:DD:EE:FF"));
    }
}
