//! Shared execution pools for module and timer background work
//!
//! Owned by the lifecycle, handed to modules through their context, and torn
//! down exactly once with immediate cancellation.

use crate::error::PoolError;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::debug;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Multi-worker pool with a bounded number of concurrently running jobs
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<WorkerPoolInner>,
}

struct WorkerPoolInner {
    permits: Arc<Semaphore>,
    workers: usize,
    tasks: Mutex<JoinSet<()>>,
    closed: AtomicBool,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            inner: Arc::new(WorkerPoolInner {
                permits: Arc::new(Semaphore::new(workers)),
                workers,
                tasks: Mutex::new(JoinSet::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Queue a job. At most `workers` jobs run at once; the rest wait.
    pub fn spawn<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_closed() {
            return Err(PoolError::Closed { pool: "worker pool" });
        }

        let permits = Arc::clone(&self.inner.permits);
        let mut tasks = lock(&self.inner.tasks);

        // Reap finished jobs so the set does not grow without bound
        while tasks.try_join_next().is_some() {}

        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            job.await;
        });
        Ok(())
    }

    pub fn workers(&self) -> usize {
        self.inner.workers
    }

    /// Jobs queued or running
    pub fn pending(&self) -> usize {
        let mut tasks = lock(&self.inner.tasks);
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Reject new jobs and abort queued and running ones. Returns aborted count.
    pub fn shutdown_now(&self) -> usize {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.permits.close();

        let mut tasks = lock(&self.inner.tasks);
        while tasks.try_join_next().is_some() {}
        let cancelled = tasks.len();
        tasks.abort_all();
        cancelled
    }
}

/// Single worker running jobs strictly in submission order
#[derive(Clone)]
pub struct OrderedWorker {
    inner: Arc<OrderedWorkerInner>,
}

struct OrderedWorkerInner {
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl OrderedWorker {
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
            }
            debug!("Ordered worker drained");
        });

        Self {
            inner: Arc::new(OrderedWorkerInner {
                tx: Mutex::new(Some(tx)),
                worker: Mutex::new(Some(worker)),
            }),
        }
    }

    /// Queue a job behind every previously submitted one
    pub fn submit<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let closed = PoolError::Closed {
            pool: "ordered worker",
        };
        let tx = lock(&self.inner.tx);
        let tx = tx.as_ref().ok_or_else(|| closed.clone())?;
        tx.send(Box::pin(job)).map_err(|_| closed)
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner.tx).is_none()
    }

    /// Reject new jobs and abort the worker, dropping anything queued
    pub fn shutdown_now(&self) {
        lock(&self.inner.tx).take();
        if let Some(worker) = lock(&self.inner.worker).take() {
            worker.abort();
        }
    }
}

impl Default for OrderedWorker {
    fn default() -> Self {
        Self::new()
    }
}

/// Both process-wide pools
#[derive(Clone)]
pub struct ExecutionPools {
    pub shared: WorkerPool,
    pub ordered: OrderedWorker,
}

impl ExecutionPools {
    /// Must be called from within a Tokio runtime
    pub fn new(workers: usize) -> Self {
        Self {
            shared: WorkerPool::new(workers),
            ordered: OrderedWorker::new(),
        }
    }

    /// Cancel everything in both pools. Returns jobs aborted in the shared pool.
    pub fn shutdown_now(&self) -> usize {
        let cancelled = self.shared.shutdown_now();
        self.ordered.shutdown_now();
        cancelled
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed() && self.ordered.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn worker_pool_bounds_concurrency() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.spawn(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        while pool.pending() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn shutdown_cancels_and_rejects() {
        let pool = WorkerPool::new(1);
        pool.spawn(std::future::pending()).unwrap();
        pool.spawn(std::future::pending()).unwrap();

        assert_eq!(pool.shutdown_now(), 2);
        assert!(pool.is_closed());
        assert_eq!(
            pool.spawn(async {}),
            Err(PoolError::Closed { pool: "worker pool" })
        );
    }

    #[tokio::test]
    async fn ordered_worker_preserves_submission_order() {
        let worker = OrderedWorker::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let seen = Arc::clone(&seen);
            worker
                .submit(async move {
                    tokio::time::sleep(Duration::from_millis(5 - i)).await;
                    seen.lock().unwrap().push(i);
                })
                .unwrap();
        }

        let (done_tx, done_rx) = oneshot::channel();
        worker
            .submit(async move {
                let _ = done_tx.send(());
            })
            .unwrap();
        done_rx.await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn execution_pools_close_together() {
        let pools = ExecutionPools::new(4);
        assert!(!pools.is_closed());

        pools.shutdown_now();

        assert!(pools.is_closed());
        assert!(pools.ordered.submit(async {}).is_err());
        assert!(pools.shared.spawn(async {}).is_err());
    }
}
