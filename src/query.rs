//! Operations behind the query interface.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::error::{Error, Result};
use crate::ports::{parse_port, targets_for_ips, targets_for_ports};
use crate::probe::{probe, ProbeResult};
use crate::scanner::{scan, ScanSettings};
use crate::types::{normalize_mac, CachedHosts, RangeScan, ScanRecord, Target};

/// Body returned by an immediate check: the open target, or why it is not open.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum CheckResponse {
    Open(Target),
    Failed { error: String },
}

impl From<ProbeResult> for CheckResponse {
    fn from(res: ProbeResult) -> Self {
        match res {
            ProbeResult::Open(t) => CheckResponse::Open(t),
            other => CheckResponse::Failed {
                error: other.to_string(),
            },
        }
    }
}

/// `{"error": "..."}` body for rejected requests.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }

    pub fn host_not_found() -> Self {
        Self::new("host not found")
    }
}

#[derive(Debug, Clone)]
pub struct QueryService {
    cache: CacheStore,
    settings: ScanSettings,
}

impl QueryService {
    pub fn new(cache: CacheStore, settings: ScanSettings) -> Self {
        Self { cache, settings }
    }

    pub fn settings(&self) -> ScanSettings {
        self.settings
    }

    /// Probe one host:port right now, bypassing cache and queue.
    ///
    /// Only a malformed port is an error; every connect outcome is a value.
    pub async fn immediate_check(&self, host: &str, port: &str) -> Result<ProbeResult> {
        let port = parse_port(port)?;
        Ok(probe(host, port, self.settings.timeout).await)
    }

    /// Scan one port across the last octet of `min_ip..=max_ip`.
    pub async fn range_scan_by_ips(&self, min_ip: &str, max_ip: &str, port: &str) -> Result<RangeScan> {
        let targets = targets_for_ips(min_ip, max_ip, port)?;
        info!(min_ip, max_ip, port, targets = targets.len(), "range scan by ips");
        Ok(self.run(targets).await)
    }

    /// Scan `min_port..=max_port` on one host.
    pub async fn range_scan_by_ports(
        &self,
        host: &str,
        min_port: &str,
        max_port: &str,
    ) -> Result<RangeScan> {
        let targets = targets_for_ports(host, min_port, max_port)?;
        info!(host, min_port, max_port, targets = targets.len(), "range scan by ports");
        Ok(self.run(targets).await)
    }

    /// Latest record for `mac`. Unreadable entries count as never scanned.
    pub fn get_cached_result(&self, mac: &str) -> Result<Option<ScanRecord>> {
        let mac = normalize_mac(mac)?;
        match self.cache.get(&mac) {
            Ok(rec) => Ok(rec),
            Err(e @ (Error::CacheCorrupt { .. } | Error::CacheIo { .. })) => {
                warn!(%mac, "treating unreadable cache entry as missing: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn list_cached_hosts(&self) -> Result<CachedHosts> {
        Ok(CachedHosts {
            macs: self.cache.list_keys()?,
        })
    }

    async fn run(&self, targets: Vec<Target>) -> RangeScan {
        let outcome = scan(targets, self.settings).await;
        RangeScan {
            time: outcome.timings,
            scan: outcome.open,
        }
    }
}
