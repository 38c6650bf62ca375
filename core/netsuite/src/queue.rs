//! Named request priorities over the concurrency limiter.

use std::future::Future;

use crate::limiter::{ConcurrencyLimiter, LimiterStats, Permit};

/// Priority tags callers attach to upstream work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Priority {
    /// Numeric admission weight; larger is admitted first.
    pub fn weight(self) -> u8 {
        match self {
            Priority::Critical => 3,
            Priority::High => 2,
            Priority::Normal => 1,
            Priority::Low => 0,
        }
    }
}

/// Thin priority wrapper over the limiter.
#[derive(Clone)]
pub struct RequestQueue {
    limiter: ConcurrencyLimiter,
}

impl RequestQueue {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            limiter: ConcurrencyLimiter::new(max_concurrent),
        }
    }

    /// The underlying limiter, for adaptive concurrency adjustments.
    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Run `work` once a slot is free at the given priority.
    pub async fn enqueue<F, Fut, T>(&self, priority: Priority, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self.limiter.acquire(priority.weight()).await;
        work().await
    }

    /// Hold a slot directly, for spans the closure form cannot express.
    pub async fn acquire(&self, priority: Priority) -> Permit {
        self.limiter.acquire(priority.weight()).await
    }

    pub fn stats(&self) -> LimiterStats {
        self.limiter.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_weights() {
        assert_eq!(Priority::Critical.weight(), 3);
        assert_eq!(Priority::High.weight(), 2);
        assert_eq!(Priority::Normal.weight(), 1);
        assert_eq!(Priority::Low.weight(), 0);
        assert!(Priority::Critical > Priority::Low);
    }

    #[tokio::test]
    async fn test_enqueue_runs_work_and_releases() {
        let queue = RequestQueue::new(1);

        let value = queue.enqueue(Priority::Normal, || async { 7 }).await;
        assert_eq!(value, 7);

        let stats = queue.stats();
        assert_eq!(stats.running, 0);
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.max_allowed, 1);
    }

    #[tokio::test]
    async fn test_critical_work_jumps_queued_low_work() {
        let queue = RequestQueue::new(1);
        let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));

        let held = queue.acquire(Priority::Normal).await;

        let mut handles = Vec::new();
        for (label, priority) in [("low", Priority::Low), ("critical", Priority::Critical)] {
            handles.push({
                let queue = queue.clone();
                let order = order.clone();
                tokio::spawn(async move {
                    queue
                        .enqueue(priority, || async {
                            order.lock().unwrap().push(label);
                        })
                        .await;
                })
            });
            while queue.stats().queued < handles.len() {
                tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            }
        }

        drop(held);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec!["critical", "low"]);
    }
}
