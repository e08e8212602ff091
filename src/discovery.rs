//! Discovery feed client and the manager loop that turns discovered hosts
//! into scan jobs.

use std::future::Future;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{record_age, CacheStore};
use crate::error::{Error, Result};
use crate::jobs::JobQueue;
use crate::types::Host;

/// Source of the currently-known hosts.
pub trait DiscoveryFeed: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<Vec<Host>>> + Send;
}

/// Wire shape of the feed: `{"scan": [{"ipv4": .., "mac": ..}, ..]}`.
#[derive(Debug, Deserialize)]
pub struct FeedPayload {
    pub scan: Vec<FeedEntry>,
}

#[derive(Debug, Deserialize)]
pub struct FeedEntry {
    pub ipv4: String,
    pub mac: String,
}

impl FeedPayload {
    /// Valid hosts from the payload; malformed entries are logged and dropped.
    pub fn into_hosts(self) -> Vec<Host> {
        self.scan
            .into_iter()
            .filter_map(|e| {
                let host = e
                    .ipv4
                    .parse::<Ipv4Addr>()
                    .ok()
                    .and_then(|ip| Host::new(ip, &e.mac).ok());
                if host.is_none() {
                    warn!(ipv4 = %e.ipv4, mac = %e.mac, "skipping malformed discovery entry");
                }
                host
            })
            .collect()
    }
}

/// Feed polled over HTTP.
#[derive(Debug, Clone)]
pub struct HttpDiscoveryFeed {
    client: reqwest::Client,
    url: String,
}

impl HttpDiscoveryFeed {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl DiscoveryFeed for HttpDiscoveryFeed {
    async fn fetch(&self) -> Result<Vec<Host>> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let payload: FeedPayload =
            serde_json::from_slice(&body).map_err(|e| Error::FeedPayload(e.to_string()))?;
        Ok(payload.into_hosts())
    }
}

/// Timing knobs for [`DiscoveryManager`].
#[derive(Debug, Clone, Copy)]
pub struct ManagerSettings {
    pub cache_expiry: Duration,
    pub drain_poll: Duration,
    pub cycle_sleep: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            cache_expiry: Duration::from_secs(2 * 24 * 60 * 60),
            drain_poll: Duration::from_secs(60),
            cycle_sleep: Duration::from_secs(1),
        }
    }
}

/// Counts from one manager cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub discovered: usize,
    pub enqueued: usize,
    pub requeued: usize,
}

/// Poll → Enqueue → WaitDrain → Sweep → Sleep, until shut down.
#[derive(Debug)]
pub struct DiscoveryManager<F> {
    feed: F,
    jobs: Arc<JobQueue>,
    cache: CacheStore,
    settings: ManagerSettings,
}

impl<F: DiscoveryFeed> DiscoveryManager<F> {
    pub fn new(feed: F, jobs: Arc<JobQueue>, cache: CacheStore, settings: ManagerSettings) -> Self {
        Self {
            feed,
            jobs,
            cache,
            settings,
        }
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            expiry_secs = self.settings.cache_expiry.as_secs(),
            "discovery manager started"
        );
        while let Some(report) = self.run_cycle(&shutdown).await {
            info!(
                discovered = report.discovered,
                enqueued = report.enqueued,
                requeued = report.requeued,
                "discovery cycle complete"
            );
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.cycle_sleep) => {}
            }
        }
        info!("discovery manager stopped");
    }

    /// One full cycle. `None` if shutdown fired while waiting for the drain.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> Option<CycleReport> {
        let hosts = self.poll().await;
        let enqueued = self.enqueue_discovered(&hosts);
        if !self.wait_for_drain(shutdown).await {
            return None;
        }
        let requeued = self.sweep();
        Some(CycleReport {
            discovered: hosts.len(),
            enqueued,
            requeued,
        })
    }

    /// Current hosts from the feed; a failing feed yields an empty list.
    pub async fn poll(&self) -> Vec<Host> {
        match self.feed.fetch().await {
            Ok(hosts) => hosts,
            Err(e) => {
                warn!("discovery feed unavailable, skipping this cycle: {e}");
                Vec::new()
            }
        }
    }

    /// Queue hosts that have no usable cache entry or an expired one.
    pub fn enqueue_discovered(&self, hosts: &[Host]) -> usize {
        let mut queued = 0;
        for host in hosts {
            if self.jobs.is_pending(&host.mac) {
                continue;
            }
            let needs_scan = match self.cache.age(&host.mac) {
                Ok(None) => true,
                Ok(Some(age)) => age > self.settings.cache_expiry,
                Err(e) => {
                    warn!(mac = %host.mac, "unreadable cache entry, rescanning: {e}");
                    true
                }
            };
            if needs_scan && self.jobs.put(host.clone()) {
                debug!(mac = %host.mac, ip = %host.ipv4, "queued for scan");
                queued += 1;
            }
        }
        queued
    }

    /// Wait until the job queue is empty. `false` if shut down first.
    pub async fn wait_for_drain(&self, shutdown: &CancellationToken) -> bool {
        loop {
            if shutdown.is_cancelled() {
                return false;
            }
            if self.jobs.is_empty() {
                return true;
            }
            debug!(queued = self.jobs.len(), "waiting for scan queue to drain");
            tokio::select! {
                _ = shutdown.cancelled() => return false,
                _ = tokio::time::sleep(self.settings.drain_poll) => {}
            }
        }
    }

    /// Re-queue every cached host whose record is older than the expiry.
    pub fn sweep(&self) -> usize {
        let macs = match self.cache.list_keys() {
            Ok(m) => m,
            Err(e) => {
                warn!("cache sweep skipped: {e}");
                return 0;
            }
        };
        let mut requeued = 0;
        for mac in macs {
            if self.jobs.is_pending(&mac) {
                continue;
            }
            let record = match self.cache.get(&mac) {
                Ok(Some(r)) => r,
                Ok(None) => continue,
                Err(e) => {
                    warn!(%mac, "skipping unreadable cache entry: {e}");
                    continue;
                }
            };
            if record_age(&record) > self.settings.cache_expiry && self.jobs.put(record.host) {
                debug!(%mac, "stale entry queued for rescan");
                requeued += 1;
            }
        }
        requeued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PhaseTimings, ScanRecord};
    use time::OffsetDateTime;

    struct StaticFeed(Vec<Host>);

    impl DiscoveryFeed for StaticFeed {
        async fn fetch(&self) -> Result<Vec<Host>> {
            Ok(self.0.clone())
        }
    }

    struct DownFeed;

    impl DiscoveryFeed for DownFeed {
        async fn fetch(&self) -> Result<Vec<Host>> {
            Err(Error::FeedPayload("feed down".into()))
        }
    }

    fn host(last: u8) -> Host {
        Host::new(Ipv4Addr::new(10, 0, 0, last), &format!("aa:bb:cc:dd:ee:{last:02x}")).unwrap()
    }

    fn cached(cache: &CacheStore, h: &Host, age: time::Duration) {
        let rec = ScanRecord::new(
            h.clone(),
            OffsetDateTime::now_utc() - age,
            PhaseTimings::default(),
            vec![22],
        );
        cache.put(&h.mac, &rec).unwrap();
    }

    fn settings() -> ManagerSettings {
        ManagerSettings {
            cache_expiry: Duration::from_secs(2 * 24 * 60 * 60),
            drain_poll: Duration::from_millis(10),
            cycle_sleep: Duration::from_millis(10),
        }
    }

    fn manager<F: DiscoveryFeed>(feed: F, cache: &CacheStore) -> DiscoveryManager<F> {
        DiscoveryManager::new(feed, Arc::new(JobQueue::new()), cache.clone(), settings())
    }

    #[test]
    fn payload_drops_malformed_entries() {
        let payload: FeedPayload = serde_json::from_str(
            r#"{"scan":[
                {"ipv4":"10.0.0.1","mac":"aa:bb:cc:dd:ee:01"},
                {"ipv4":"10.0.0","mac":"aa:bb:cc:dd:ee:02"},
                {"ipv4":"10.0.0.3","mac":"nope"}
            ]}"#,
        )
        .unwrap();
        let hosts = payload.into_hosts();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].mac, "AA:BB:CC:DD:EE:01");
    }

    #[test]
    fn fresh_cache_entry_is_not_requeued() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path()).unwrap();
        let (fresh, stale, unseen) = (host(1), host(2), host(3));
        cached(&cache, &fresh, time::Duration::hours(1));
        cached(&cache, &stale, time::Duration::days(3));

        let mgr = manager(StaticFeed(vec![]), &cache);
        assert_eq!(mgr.enqueue_discovered(&[fresh, stale.clone(), unseen.clone()]), 2);
        assert_eq!(mgr.jobs.queued_macs(), vec![stale.mac, unseen.mac]);
    }

    #[test]
    fn pending_host_is_not_queued_twice() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path()).unwrap();
        let mgr = manager(StaticFeed(vec![]), &cache);
        assert_eq!(mgr.enqueue_discovered(&[host(1)]), 1);
        assert_eq!(mgr.enqueue_discovered(&[host(1)]), 0);
        assert_eq!(mgr.jobs.len(), 1);
    }

    #[test]
    fn sweep_selects_only_expired_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path()).unwrap();
        cached(&cache, &host(1), time::Duration::days(1));
        cached(&cache, &host(2), time::Duration::days(2) + time::Duration::minutes(5));
        std::fs::write(dir.path().join("AA-BB-CC-DD-EE-09.json"), "{broken").unwrap();

        let mgr = manager(StaticFeed(vec![]), &cache);
        assert_eq!(mgr.sweep(), 1);
        let job = mgr.jobs.try_pop().unwrap();
        assert_eq!(job, host(2));
        assert!(mgr.jobs.is_empty());
    }

    #[tokio::test]
    async fn feed_failure_is_an_empty_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path()).unwrap();
        let mgr = manager(DownFeed, &cache);
        let report = mgr.run_cycle(&CancellationToken::new()).await.unwrap();
        assert_eq!(report, CycleReport::default());
    }

    #[tokio::test]
    async fn cycle_enqueues_unseen_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path()).unwrap();
        cached(&cache, &host(1), time::Duration::hours(1));
        let mgr = manager(StaticFeed(vec![host(1), host(2)]), &cache);

        // Nothing drains the queue, so the cycle parks in WaitDrain until shutdown.
        let shutdown = CancellationToken::new();
        let canceller = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                shutdown.cancel();
            })
        };
        assert_eq!(mgr.run_cycle(&shutdown).await, None);
        canceller.await.unwrap();
        assert_eq!(mgr.jobs.queued_macs(), vec![host(2).mac]);
    }

    #[tokio::test]
    async fn cycle_completes_when_nothing_to_do() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path()).unwrap();
        cached(&cache, &host(1), time::Duration::hours(1));
        let mgr = manager(StaticFeed(vec![host(1)]), &cache);
        let report = mgr.run_cycle(&CancellationToken::new()).await.unwrap();
        assert_eq!(
            report,
            CycleReport {
                discovered: 1,
                enqueued: 0,
                requeued: 0
            }
        );
    }
}
