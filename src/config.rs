use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::discovery::ManagerSettings;
use crate::scanner::ScanSettings;

/// portscan-rs — TCP listener discovery service with a cached, discovery-driven full-port scanner.
///
/// Every option can also be set through the environment variable shown in `--help`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "portscan-rs",
    version,
    about = "TCP listener discovery service with a cached, discovery-driven full-port scanner.",
    long_about = None
)]
pub struct Config {
    /// Address the query interface binds to.
    #[arg(long, env = "MY_REST_API_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Port the query interface listens on.
    #[arg(long, env = "MY_REST_API_PORT", default_value_t = 8004)]
    pub port: u16,

    /// Path prefix for every API route.
    #[arg(long, env = "MY_REST_API_BASE_URL", default_value = "/portscan")]
    pub base_url: String,

    /// Concurrent TCP connect attempts per scan (clamped to 1..=1024).
    #[arg(long, env = "MY_NUM_PROCESSES", default_value_t = 50)]
    pub concurrency: usize,

    /// Connect timeout per probe, in milliseconds.
    #[arg(long = "timeout-ms", env = "MY_PROBE_TIMEOUT_MS", default_value_t = 5000)]
    pub timeout_ms: u64,

    /// Discovery feed URL. Without it only on-demand scans run.
    #[arg(long, env = "MY_DISCOVERY_URL")]
    pub discovery_url: Option<String>,

    /// HTTP timeout for one discovery feed request, in seconds.
    #[arg(long, env = "MY_DISCOVERY_TIMEOUT_SECS", default_value_t = 30)]
    pub discovery_timeout_secs: u64,

    /// Directory holding one cached scan record per MAC.
    #[arg(long, env = "MY_CACHE_DIR", default_value = "./cache")]
    pub cache_dir: PathBuf,

    /// Age after which a cached scan is redone, in seconds.
    #[arg(long, env = "MY_CACHE_EXPIRY_SECS", default_value_t = 2 * 24 * 60 * 60)]
    pub cache_expiry_secs: u64,

    /// Orchestrator sleep when the job queue is empty, in milliseconds.
    #[arg(long, env = "MY_IDLE_POLL_MS", default_value_t = 1000)]
    pub idle_poll_ms: u64,

    /// Manager poll interval while waiting for the job queue to drain, in seconds.
    #[arg(long, env = "MY_DRAIN_POLL_SECS", default_value_t = 60)]
    pub drain_poll_secs: u64,

    /// Manager sleep between discovery cycles, in milliseconds.
    #[arg(long, env = "MY_CYCLE_SLEEP_MS", default_value_t = 1000)]
    pub cycle_sleep_ms: u64,

    /// Log filter (overridden by RUST_LOG).
    #[arg(long, env = "MY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, env = "MY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable multi-line output
    #[default]
    Pretty,
    /// Single-line output
    Compact,
    /// Newline-delimited JSON for log aggregation
    Json,
}

impl Config {
    pub fn bind(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings::new(self.concurrency, Duration::from_millis(self.timeout_ms))
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            cache_expiry: Duration::from_secs(self.cache_expiry_secs),
            drain_poll: Duration::from_secs(self.drain_poll_secs),
            cycle_sleep: Duration::from_millis(self.cycle_sleep_ms),
        }
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }
}
