//! Backlog of hosts waiting for a full-port scan.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use crate::types::Host;
use crate::workqueue::WorkQueue;

/// FIFO of hosts with at most one pending job per MAC.
///
/// A MAC counts as pending from [`JobQueue::put`] until the consumer calls
/// [`JobQueue::finish`], which covers the time the host is being scanned.
#[derive(Debug, Default)]
pub struct JobQueue {
    queue: WorkQueue<Host>,
    pending: Mutex<HashSet<String>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `host` unless its MAC is already pending. Returns whether it was queued.
    pub fn put(&self, host: Host) -> bool {
        if !self.pending().insert(host.mac.clone()) {
            return false;
        }
        self.queue.put(host);
        true
    }

    /// Non-waiting pop; `None` can be transient, confirm with [`JobQueue::is_empty`].
    pub fn try_pop(&self) -> Option<Host> {
        self.queue.try_pop()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True if `mac` is queued or currently being scanned.
    pub fn is_pending(&self, mac: &str) -> bool {
        self.pending().contains(mac)
    }

    /// Mark the job for `mac` done so the host may be queued again.
    pub fn finish(&self, mac: &str) {
        self.pending().remove(mac);
    }

    /// MACs still waiting in the queue, front first.
    pub fn queued_macs(&self) -> Vec<String> {
        self.queue
            .with_items(|items| items.iter().map(|h| h.mac.clone()).collect())
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
