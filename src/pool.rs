//! Bounded task pool.
//!
//! Every agent dispatch and correlation unit runs as its own tokio task, but
//! at most `size` of them hold a permit at once. Handles are joined together
//! and a panicking task surfaces as a [`JoinError`] for that task only.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};

/// Shared concurrency limit for spawned analysis work.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Pool allowing `size` concurrent tasks (at least one).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Spawn `fut`, which starts only once a permit is free.
    pub fn spawn<F, T>(&self, fut: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            // The semaphore is never closed, so acquisition only fails if it were.
            let _permit = permits.acquire_owned().await.ok();
            fut.await
        })
    }
}

/// Await every handle, in spawn order.
pub async fn join_all<T>(handles: Vec<JoinHandle<T>>) -> Vec<Result<T, JoinError>> {
    futures::future::join_all(handles).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_results_keep_spawn_order() {
        let pool = WorkerPool::new(4);
        let handles: Vec<_> = (0..10u64)
            .map(|i| {
                pool.spawn(async move {
                    tokio::time::sleep(Duration::from_millis(10 - i)).await;
                    i
                })
            })
            .collect();
        let results: Vec<u64> = join_all(handles).await.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(results, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                pool.spawn(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        join_all(handles).await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available(), 2);
    }

    async fn explode() -> i32 {
        panic!("unit failed")
    }

    #[tokio::test]
    async fn test_panic_is_isolated_to_its_task() {
        let pool = WorkerPool::new(2);
        let handles = vec![
            pool.spawn(async { 1 }),
            pool.spawn(explode()),
            pool.spawn(async { 3 }),
        ];
        let results = join_all(handles).await;
        assert_eq!(*results[0].as_ref().unwrap(), 1);
        assert!(results[1].as_ref().unwrap_err().is_panic());
        assert_eq!(*results[2].as_ref().unwrap(), 3);
        assert_eq!(pool.available(), 2);
    }
}
