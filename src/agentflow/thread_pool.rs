//! Shared bounded thread pool for agent workers.
//!
//! Every agent (and team) worker runs on a dedicated OS thread acquired from
//! a [`ThreadPoolManager`]. A process-wide pool is available through
//! [`global_thread_pool`], but the pool is an explicit dependency of agent
//! construction so tests can inject a private one.
//!
//! Submitted jobs return a [`TaskHandle`] supporting completion callbacks
//! and async waiting with a timeout — the primitives the worker's
//! `stop(timeout)` contract needs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Default cap on concurrently running worker threads.
pub const DEFAULT_MAX_WORKERS: usize = 32;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct TaskShared {
    finished: AtomicBool,
    callbacks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

impl TaskShared {
    fn new() -> Self {
        let (done_tx, done_rx) = watch::channel(false);
        Self {
            finished: AtomicBool::new(false),
            callbacks: Mutex::new(Vec::new()),
            done_tx,
            done_rx,
        }
    }

    fn complete(&self) {
        self.finished.store(true, Ordering::SeqCst);
        let callbacks: Vec<Box<dyn FnOnce() + Send>> = {
            let mut guard = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        for callback in callbacks {
            callback();
        }
        let _ = self.done_tx.send(true);
    }
}

/// Handle to a job submitted to the pool.
#[derive(Clone)]
pub struct TaskHandle {
    shared: Arc<TaskShared>,
}

impl TaskHandle {
    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::SeqCst)
    }

    /// Register a callback run when the job completes. A callback added
    /// after completion runs immediately on the caller's thread.
    pub fn add_done_callback(&self, callback: Box<dyn FnOnce() + Send>) {
        {
            let mut guard = self
                .shared
                .callbacks
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if !self.shared.finished.load(Ordering::SeqCst) {
                guard.push(callback);
                return;
            }
        }
        callback();
    }

    /// Await completion for up to `timeout`. Returns `true` when the job
    /// finished in time.
    pub async fn wait(&self, timeout: Duration) -> bool {
        if self.is_finished() {
            return true;
        }
        let mut rx = self.shared.done_rx.clone();
        let waited = tokio::time::timeout(timeout, async move {
            loop {
                if *rx.borrow() {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await;
        waited.is_ok() && self.is_finished()
    }
}

struct PoolInner {
    jobs: VecDeque<Job>,
    spawned: usize,
    idle: usize,
    max_workers: usize,
}

/// A bounded pool of lazily spawned worker threads.
pub struct ThreadPoolManager {
    inner: Arc<(Mutex<PoolInner>, Condvar)>,
}

impl ThreadPoolManager {
    pub fn new(max_workers: usize) -> Self {
        Self {
            inner: Arc::new((
                Mutex::new(PoolInner {
                    jobs: VecDeque::new(),
                    spawned: 0,
                    idle: 0,
                    max_workers: max_workers.max(1),
                }),
                Condvar::new(),
            )),
        }
    }

    /// Submit a job. Spawns a new worker thread when none is idle and the
    /// cap allows; otherwise the job queues until a thread frees up.
    pub fn submit_task<F>(&self, job: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = Arc::new(TaskShared::new());
        let job_shared = shared.clone();
        let wrapped: Job = Box::new(move || {
            job();
            job_shared.complete();
        });

        let (lock, condvar) = &*self.inner;
        let mut inner = lock.lock().unwrap_or_else(|e| e.into_inner());
        inner.jobs.push_back(wrapped);
        if inner.idle == 0 && inner.spawned < inner.max_workers {
            inner.spawned += 1;
            let pool = self.inner.clone();
            std::thread::Builder::new()
                .name(format!("agentflow-worker-{}", inner.spawned))
                .spawn(move || Self::worker_loop(pool))
                .ok();
        }
        condvar.notify_one();
        TaskHandle { shared }
    }

    fn worker_loop(pool: Arc<(Mutex<PoolInner>, Condvar)>) {
        let (lock, condvar) = &*pool;
        loop {
            let job = {
                let mut inner = lock.lock().unwrap_or_else(|e| e.into_inner());
                loop {
                    if let Some(job) = inner.jobs.pop_front() {
                        break job;
                    }
                    inner.idle += 1;
                    inner = condvar
                        .wait(inner)
                        .unwrap_or_else(|e| e.into_inner());
                    inner.idle = inner.idle.saturating_sub(1);
                }
            };
            job();
        }
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_THREAD_POOL: Arc<ThreadPoolManager> =
        Arc::new(ThreadPoolManager::new(DEFAULT_MAX_WORKERS));
}

/// The process-wide worker pool.
pub fn global_thread_pool() -> Arc<ThreadPoolManager> {
    GLOBAL_THREAD_POOL.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_job_runs_and_completes() {
        let pool = ThreadPoolManager::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        let job_counter = counter.clone();
        let handle = pool.submit_task(move || {
            job_counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(handle.wait(Duration::from_secs(2)).await);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_done_callback_after_completion_runs_immediately() {
        let pool = ThreadPoolManager::new(1);
        let handle = pool.submit_task(|| {});
        assert!(handle.wait(Duration::from_secs(2)).await);

        let ran = Arc::new(AtomicBool::new(false));
        let callback_ran = ran.clone();
        handle.add_done_callback(Box::new(move || {
            callback_ran.store(true, Ordering::SeqCst);
        }));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_wait_times_out_on_stuck_job() {
        let pool = ThreadPoolManager::new(1);
        let handle = pool.submit_task(|| {
            std::thread::sleep(Duration::from_millis(500));
        });
        assert!(!handle.wait(Duration::from_millis(50)).await);
        assert!(handle.wait(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_jobs_queue_beyond_worker_cap() {
        let pool = ThreadPoolManager::new(1);
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let job_counter = counter.clone();
            handles.push(pool.submit_task(move || {
                std::thread::sleep(Duration::from_millis(10));
                job_counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            assert!(handle.wait(Duration::from_secs(2)).await);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }
}
