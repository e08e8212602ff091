use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{Error, Result};

/// One (host, port) pair to probe. Serialized as `{"ip": .., "port": ..}`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Target {
    #[serde(rename = "ip")]
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Target {
    pub fn new(host: Ipv4Addr, port: u16) -> Self {
        Self { host, port }
    }
}

/// A host reported by discovery (or named by a caller), keyed by its MAC.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub ipv4: Ipv4Addr,
    pub mac: String,
}

impl Host {
    /// Build a host, normalizing `mac` so it is stable as a cache key.
    pub fn new(ipv4: Ipv4Addr, mac: &str) -> Result<Self> {
        Ok(Self {
            ipv4,
            mac: normalize_mac(mac)?,
        })
    }
}

/// Normalize a MAC address to uppercase, colon-separated form.
///
/// Accepts `:` or `-` separators and single-digit groups (`a:b:c:d:e:f`).
pub fn normalize_mac(raw: &str) -> Result<String> {
    let groups: Vec<&str> = raw.trim().split([':', '-']).collect();
    if groups.len() != 6 {
        return Err(Error::InvalidMac(raw.to_string()));
    }
    let mut out = String::with_capacity(17);
    for (i, g) in groups.iter().enumerate() {
        if g.is_empty() || g.len() > 2 || !g.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidMac(raw.to_string()));
        }
        if i > 0 {
            out.push(':');
        }
        if g.len() == 1 {
            out.push('0');
        }
        out.push_str(&g.to_ascii_uppercase());
    }
    Ok(out)
}

/// Durations of the three phases of one scan, in seconds.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct PhaseTimings {
    pub prep_sec: f64,
    pub scan_sec: f64,
    pub total_sec: f64,
}

impl PhaseTimings {
    pub fn new(prep: Duration, scan: Duration, total: Duration) -> Self {
        Self {
            prep_sec: round4(prep.as_secs_f64()),
            scan_sec: round4(scan.as_secs_f64()),
            total_sec: round4(total.as_secs_f64()),
        }
    }
}

fn round4(secs: f64) -> f64 {
    (secs * 10_000.0).round() / 10_000.0
}

/// Completion time of a scan plus its phase timings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecordTimestamps {
    #[serde(with = "time::serde::rfc3339")]
    pub utc: OffsetDateTime,
    #[serde(flatten)]
    pub phases: PhaseTimings,
}

/// Most recent full-port scan result for one host.
///
/// `ports` is strictly ascending and `count == ports.len()`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScanRecord {
    pub host: Host,
    pub timestamps: RecordTimestamps,
    pub ports: Vec<u16>,
    pub count: usize,
}

impl ScanRecord {
    pub fn new(
        host: Host,
        utc: OffsetDateTime,
        phases: PhaseTimings,
        open: impl IntoIterator<Item = u16>,
    ) -> Self {
        let mut ports: Vec<u16> = open.into_iter().collect();
        ports.sort_unstable();
        ports.dedup();
        let count = ports.len();
        Self {
            host,
            timestamps: RecordTimestamps { utc, phases },
            ports,
            count,
        }
    }
}

/// Response body of an on-demand range scan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RangeScan {
    pub time: PhaseTimings,
    pub scan: Vec<Target>,
}

/// Response body listing every cached host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct CachedHosts {
    pub macs: Vec<String>,
}
