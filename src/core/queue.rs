//! Bounded-rate work queues and the adaptive drain policy
//!
//! The queues decouple "a point was just discovered" from "do the next unit
//! of work for it" and keep request bursts off the transport. Pop-and-batch
//! is atomic with respect to concurrent producers.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;

/// FIFO work queue shared between producers and one drain loop.
#[derive(Debug, Default)]
pub struct WorkQueue<T> {
    inner: Mutex<VecDeque<T>>,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Append one entry. Single-entry producers (an embedder reacting to an
    /// out-of-band event) use this; the periodic schedulers use `push_all`.
    pub async fn push(&self, item: T) {
        self.inner.lock().await.push_back(item);
    }

    pub async fn push_all(&self, items: impl IntoIterator<Item = T>) {
        let mut queue = self.inner.lock().await;
        queue.extend(items);
    }

    /// Pop up to `max` entries in one atomic step and report the backlog
    /// left behind, so the drain loop can pick its next tick length.
    pub async fn pop_batch(&self, max: usize) -> (Vec<T>, usize) {
        let mut queue = self.inner.lock().await;
        let take = max.min(queue.len());
        let batch = queue.drain(..take).collect();
        (batch, queue.len())
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Emptiness probe for embedders that gate their own work on the
    /// backlog; the drain loops themselves read the `pop_batch` remainder.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

/// Tick policy for a drain loop: short ticks while work is pending, long
/// ticks when idle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainPolicy {
    pub busy_interval: Duration,
    pub idle_interval: Duration,
    /// Entries dispatched per tick
    pub batch_size: usize,
}

impl DrainPolicy {
    pub fn new(busy_interval: Duration, idle_interval: Duration, batch_size: usize) -> Self {
        Self {
            busy_interval,
            idle_interval,
            batch_size,
        }
    }

    /// Delay before the next drain tick given the remaining backlog.
    pub fn next_delay(&self, backlog: usize) -> Duration {
        if backlog > 0 {
            self.busy_interval
        } else {
            self.idle_interval
        }
    }
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            busy_interval: Duration::from_millis(400),
            idle_interval: Duration::from_secs(10),
            batch_size: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = WorkQueue::new();
        queue.push(1u32).await;
        queue.push_all([2, 3]).await;

        let (batch, backlog) = queue.pop_batch(2).await;
        assert_eq!(batch, vec![1, 2]);
        assert_eq!(backlog, 1);
    }

    #[tokio::test]
    async fn test_pop_batch_respects_limit() {
        let queue = WorkQueue::new();
        queue.push_all(["a", "b", "c"]).await;

        // Batch size 1 drains exactly one entry per tick.
        let (batch, backlog) = queue.pop_batch(1).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(backlog, 2);

        let (batch, backlog) = queue.pop_batch(1).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(backlog, 1);
    }

    #[tokio::test]
    async fn test_pop_batch_on_empty_queue() {
        let queue: WorkQueue<u32> = WorkQueue::new();
        let (batch, backlog) = queue.pop_batch(5).await;
        assert!(batch.is_empty());
        assert_eq!(backlog, 0);
    }

    #[tokio::test]
    async fn test_concurrent_producers_lose_nothing() {
        let queue = Arc::new(WorkQueue::new());
        let mut handles = Vec::new();
        for worker in 0..4u32 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..100u32 {
                    queue.push(worker * 100 + i).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(queue.len().await, 400);
    }

    #[test]
    fn test_drain_policy_intervals() {
        let policy = DrainPolicy::new(Duration::from_millis(400), Duration::from_secs(10), 1);
        assert_eq!(policy.next_delay(3), Duration::from_millis(400));
        assert_eq!(policy.next_delay(0), Duration::from_secs(10));
    }
}
