//! Thread-safe FIFO shared by pool workers.
//!
//! `try_pop` never waits: when the queue is contended it reports "nothing
//! available" even though items may remain. Consumers must confirm with
//! [`WorkQueue::is_empty`] before treating that as exhaustion; see
//! [`drain`] for the loop every worker runs.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, TryLockError};

#[derive(Debug)]
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for WorkQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: Mutex::new(iter.into_iter().collect()),
        }
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Append an item, waiting for the lock if another thread holds it.
    pub fn put(&self, item: T) {
        self.lock().push_back(item);
    }

    /// Pop the front item without waiting. `None` means either empty or busy.
    pub fn try_pop(&self) -> Option<T> {
        match self.items.try_lock() {
            Ok(mut q) => q.pop_front(),
            Err(TryLockError::Poisoned(p)) => p.into_inner().pop_front(),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Authoritative emptiness check; waits for the lock.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Run `f` with exclusive access to the queued items.
    pub(crate) fn with_items<R>(&self, f: impl FnOnce(&mut VecDeque<T>) -> R) -> R {
        f(&mut self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // A panicking holder cannot leave a VecDeque half-modified.
        self.items.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Worker loop: pop and handle items until the queue is observed empty.
///
/// A failed `try_pop` alone does not end the loop; the worker exits only when
/// the pop fails *and* a separate `is_empty` check agrees.
pub async fn drain<T, F, Fut>(queue: &WorkQueue<T>, mut handle: F)
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        match queue.try_pop() {
            Some(item) => handle(item).await,
            None if queue.is_empty() => return,
            None => tokio::task::yield_now().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn fifo_order() {
        let q: WorkQueue<u32> = (1..=3).collect();
        q.put(4);
        assert_eq!(q.len(), 4);
        let popped: Vec<u32> = std::iter::from_fn(|| q.try_pop()).collect();
        assert_eq!(popped, vec![1, 2, 3, 4]);
        assert!(q.is_empty());
    }

    #[test]
    fn contended_pop_is_not_exhaustion() {
        let q: WorkQueue<u32> = (1..=3).collect();
        let held = q.items.lock().unwrap();
        assert_eq!(q.try_pop(), None);
        drop(held);
        assert!(!q.is_empty());
        assert_eq!(q.try_pop(), Some(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_drain_loses_nothing() {
        let q: Arc<WorkQueue<usize>> = Arc::new((0..10_000).collect());
        let seen = Arc::new(AtomicUsize::new(0));
        let mut set = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let q = q.clone();
            let seen = seen.clone();
            set.spawn(async move {
                drain(&q, |_| {
                    seen.fetch_add(1, Ordering::Relaxed);
                    async {}
                })
                .await;
            });
        }
        while set.join_next().await.is_some() {}
        assert_eq!(seen.load(Ordering::Relaxed), 10_000);
        assert!(q.is_empty());
    }
}
