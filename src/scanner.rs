use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::probe::{probe_target, ProbeResult};
use crate::types::{PhaseTimings, Target};
use crate::workqueue::{drain, WorkQueue};

/// Upper bound on simultaneous sockets per scan, well below common fd limits.
pub const MAX_CONCURRENCY: usize = 1024;

/// Pool size and per-probe timeout for one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    pub concurrency: usize,
    pub timeout: Duration,
}

impl ScanSettings {
    pub fn new(concurrency: usize, timeout: Duration) -> Self {
        Self {
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
            timeout,
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self::new(50, Duration::from_secs(5))
    }
}

/// Open targets found by a scan, sorted by (host, port), plus phase timings.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    pub open: Vec<Target>,
    pub timings: PhaseTimings,
}

/// Probe every target using a fixed pool of workers sharing one queue.
///
/// - `prep_sec` covers spawning the pool, `scan_sec` runs from then until the
///   last worker is joined.
/// - Returns only after every worker has exited, so no target is in flight.
/// - Only `Open` outcomes are kept.
pub async fn scan(targets: Vec<Target>, settings: ScanSettings) -> ScanOutcome {
    let start = Instant::now();
    let total = targets.len();
    let workers = settings.concurrency.min(total);
    let queue: Arc<WorkQueue<Target>> = Arc::new(targets.into_iter().collect());
    let open: Arc<Mutex<Vec<Target>>> = Arc::new(Mutex::new(Vec::new()));

    let mut set = JoinSet::new();
    for _ in 0..workers {
        let queue = queue.clone();
        let open = open.clone();
        let timeout = settings.timeout;
        set.spawn(async move {
            drain(&queue, |target| {
                let open = open.clone();
                async move {
                    if let ProbeResult::Open(t) = probe_target(target, timeout).await {
                        open.lock().unwrap_or_else(PoisonError::into_inner).push(t);
                    }
                }
            })
            .await;
        });
    }
    let running = Instant::now();
    debug!(targets = total, workers, "worker pool up");

    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            warn!("scan worker failed: {e}");
        }
    }
    let end = Instant::now();

    let mut open = std::mem::take(&mut *open.lock().unwrap_or_else(PoisonError::into_inner));
    open.sort_unstable();
    open.dedup();

    let timings = PhaseTimings::new(running - start, end - running, end - start);
    debug!(
        targets = total,
        open = open.len(),
        total_sec = timings.total_sec,
        "scan finished"
    );
    ScanOutcome { open, timings }
}
