// Concurrency Limiter
// Optional global cap on simultaneously running processes.
// Excess invocations queue in arrival order (tokio's semaphore is fair).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Default)]
struct Counters {
    waiting: AtomicUsize,
    running: AtomicUsize,
}

/// Owned by the coordinator; created at startup, dropped at shutdown
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Option<Arc<Semaphore>>,
    limit: Option<usize>,
    counters: Arc<Counters>,
}

/// Held for the lifetime of one running process
#[derive(Debug)]
pub struct ExecutionPermit {
    _permit: Option<OwnedSemaphorePermit>,
    counters: Arc<Counters>,
}

impl Drop for ExecutionPermit {
    fn drop(&mut self) {
        self.counters.running.fetch_sub(1, Ordering::SeqCst);
    }
}

struct WaitGuard<'a>(&'a Counters);

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.0.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyLimiter {
    /// `None` or `Some(0)` means unlimited
    pub fn new(max_concurrent: Option<usize>) -> Self {
        let limit = max_concurrent.filter(|&n| n > 0);
        Self {
            semaphore: limit.map(|n| Arc::new(Semaphore::new(n))),
            limit,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Wait for a slot. Cancel-safe: dropping the future leaves the queue.
    pub async fn acquire(&self) -> ExecutionPermit {
        let permit = match &self.semaphore {
            Some(semaphore) => {
                self.counters.waiting.fetch_add(1, Ordering::SeqCst);
                let _waiting = WaitGuard(&self.counters);
                // The semaphore is never closed
                semaphore.clone().acquire_owned().await.ok()
            }
            None => None,
        };
        self.counters.running.fetch_add(1, Ordering::SeqCst);
        ExecutionPermit {
            _permit: permit,
            counters: Arc::clone(&self.counters),
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn running(&self) -> usize {
        self.counters.running.load(Ordering::SeqCst)
    }

    pub fn waiting(&self) -> usize {
        self.counters.waiting.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_unlimited_never_waits() {
        let limiter = ConcurrencyLimiter::new(Some(0));
        let a = limiter.acquire().await;
        let b = limiter.acquire().await;
        assert_eq!(limiter.limit(), None);
        assert_eq!(limiter.running(), 2);
        drop((a, b));
        assert_eq!(limiter.running(), 0);
    }

    #[tokio::test]
    async fn test_cap_queues_excess() {
        let limiter = Arc::new(ConcurrencyLimiter::new(Some(1)));
        let first = limiter.acquire().await;

        let queued = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move {
                let _permit = limiter.acquire().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(limiter.waiting(), 1);
        assert!(!queued.is_finished());

        drop(first);
        queued.await.unwrap();
        assert_eq!(limiter.waiting(), 0);
        assert_eq!(limiter.running(), 0);
    }

    #[tokio::test]
    async fn test_dropped_waiter_leaves_queue() {
        let limiter = ConcurrencyLimiter::new(Some(1));
        let _held = limiter.acquire().await;

        let attempt = tokio::time::timeout(Duration::from_millis(20), limiter.acquire()).await;
        assert!(attempt.is_err());
        assert_eq!(limiter.waiting(), 0);
    }
}
