//! Background task scheduler for delayed and periodic work

use crate::error::PoolError;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Identifier of a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

struct ScheduledTask {
    name: String,
    handle: JoinHandle<()>,
}

/// Process-wide scheduler
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    tasks: DashMap<TaskId, ScheduledTask>,
    next_id: AtomicU64,
    stopped: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(SchedulerInner {
                tasks: DashMap::new(),
                next_id: AtomicU64::new(1),
                stopped: AtomicBool::new(false),
                shutdown_tx,
            }),
        }
    }

    /// Run `job` once after `delay`
    pub fn schedule_once<F>(
        &self,
        name: impl Into<String>,
        delay: Duration,
        job: F,
    ) -> Result<TaskId, PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.ensure_running()?;
        let id = self.next_id();
        let inner = Arc::clone(&self.inner);
        let mut shutdown_rx = self.inner.shutdown_tx.subscribe();
        let (armed_tx, armed_rx) = oneshot::channel::<()>();

        // The task must not remove its entry before it has been inserted.
        let handle = tokio::spawn(async move {
            if armed_rx.await.is_err() {
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => job.await,
                _ = shutdown_rx.recv() => {}
            }
            inner.tasks.remove(&id);
        });

        self.track(id, name.into(), handle);
        let _ = armed_tx.send(());
        Ok(id)
    }

    /// Run `job` every `period`, first run after one period
    pub fn schedule_repeating<F>(
        &self,
        name: impl Into<String>,
        period: Duration,
        job: F,
    ) -> Result<TaskId, PoolError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.ensure_running()?;
        let id = self.next_id();
        let mut shutdown_rx = self.inner.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => job(),
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        self.track(id, name.into(), handle);
        Ok(id)
    }

    /// Cancel one task. Returns false if it already finished or never existed.
    pub fn cancel(&self, id: TaskId) -> bool {
        match self.inner.tasks.remove(&id) {
            Some((_, task)) => {
                debug!(task = %task.name, "Cancelled scheduled task");
                task.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Tasks still scheduled
    pub fn active(&self) -> usize {
        self.inner.tasks.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Stop accepting work and abort every scheduled task. Returns aborted count.
    pub fn stop(&self) -> usize {
        self.inner.stopped.store(true, Ordering::SeqCst);
        let _ = self.inner.shutdown_tx.send(());

        let ids: Vec<TaskId> = self.inner.tasks.iter().map(|entry| *entry.key()).collect();
        let mut stopped = 0;
        for id in ids {
            if let Some((_, task)) = self.inner.tasks.remove(&id) {
                task.handle.abort();
                stopped += 1;
            }
        }

        info!(stopped, "Scheduler stopped");
        stopped
    }

    fn ensure_running(&self) -> Result<(), PoolError> {
        if self.is_stopped() {
            Err(PoolError::Closed { pool: "scheduler" })
        } else {
            Ok(())
        }
    }

    fn next_id(&self) -> TaskId {
        TaskId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn track(&self, id: TaskId, name: String, handle: JoinHandle<()>) {
        debug!(task = %name, "Scheduled task");
        self.inner.tasks.insert(id, ScheduledTask { name, handle });
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn repeating_task_runs_every_period() {
        let scheduler = Scheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);

        scheduler
            .schedule_repeating("tick", Duration::from_secs(10), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.active(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn once_task_runs_after_delay() {
        let scheduler = Scheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);

        scheduler
            .schedule_once("later", Duration::from_secs(5), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_removes_task() {
        let scheduler = Scheduler::new();
        let id = scheduler
            .schedule_repeating("noop", Duration::from_secs(60), || {})
            .unwrap();

        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        assert_eq!(scheduler.active(), 0);
    }

    #[tokio::test]
    async fn stop_aborts_and_rejects_new_work() {
        let scheduler = Scheduler::new();
        scheduler
            .schedule_repeating("a", Duration::from_secs(60), || {})
            .unwrap();
        scheduler
            .schedule_once("b", Duration::from_secs(60), async {})
            .unwrap();

        assert_eq!(scheduler.stop(), 2);
        assert!(scheduler.is_stopped());
        assert!(scheduler
            .schedule_once("c", Duration::from_secs(1), async {})
            .is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn finished_once_tasks_leave_no_entries() {
        let scheduler = Scheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));

        for i in 0..500 {
            let counter = Arc::clone(&runs);
            scheduler
                .schedule_once(format!("now-{i}"), Duration::ZERO, async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            while scheduler.active() > 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await;

        assert!(drained.is_ok(), "{} tasks left behind", scheduler.active());
        assert_eq!(runs.load(Ordering::SeqCst), 500);
    }
}
