use futures::future::BoxFuture;
use futures::FutureExt;
use meshrpc_common::protocol::{Result, RpcError};
use meshrpc_common::{Url, UrlParam};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Job = BoxFuture<'static, ()>;

/// Configuration for the worker pool
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Number of worker tasks draining the queue
    pub workers: usize,
    /// Jobs that may wait for a worker before submissions are rejected
    pub queue_size: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::from_url(&Url::new("", "", 0, ""))
    }
}

impl WorkerPoolConfig {
    /// Reads `maxWorkerThread` (never below `minWorkerThread`) and
    /// `workerQueueSize`.
    pub fn from_url(url: &Url) -> Self {
        let min = url.int_param(UrlParam::MinWorkerThreads).max(1);
        let max = url.int_param(UrlParam::MaxWorkerThreads).max(min);
        Self {
            workers: max as usize,
            queue_size: url.int_param(UrlParam::WorkerQueueSize).max(1) as usize,
        }
    }
}

/// Bounded pool that runs business work off the connection I/O tasks.
///
/// A fixed number of workers pull jobs from a bounded queue. Submission never
/// waits: when the queue is full or the pool has been shut down the job is
/// handed back as an error and the caller answers with an overload response.
pub struct WorkerPool {
    sender: parking_lot::Mutex<Option<mpsc::Sender<Job>>>,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    config: WorkerPoolConfig,
}

impl WorkerPool {
    /// Starts the workers. Must be called from within a tokio runtime.
    pub fn new(config: WorkerPoolConfig) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>(config.queue_size.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                let receiver = receiver.clone();
                tokio::spawn(async move {
                    loop {
                        let job = { receiver.lock().await.recv().await };
                        let Some(job) = job else { break };
                        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                            warn!(worker = worker_id, "Worker job panicked");
                        }
                    }
                    debug!(worker = worker_id, "Worker stopped");
                })
            })
            .collect();

        Self {
            sender: parking_lot::Mutex::new(Some(sender)),
            workers: parking_lot::Mutex::new(workers),
            config,
        }
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        match &*self.sender.lock() {
            Some(sender) => sender.max_capacity() - sender.capacity(),
            None => 0,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Queues `job` without waiting.
    pub fn try_submit<F>(&self, job: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = self.sender.lock().clone();
        let Some(sender) = sender else {
            return Err(RpcError::Framework("process thread pool is closed, reject".into()));
        };

        match sender.try_send(job.boxed()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                Err(RpcError::Framework("process thread pool is full, reject".into()))
            }
            Err(TrySendError::Closed(_)) => {
                Err(RpcError::Framework("process thread pool is closed, reject".into()))
            }
        }
    }

    /// Stops accepting work. Queued jobs still run; workers exit once the
    /// queue is drained.
    pub fn shutdown(&self) {
        self.sender.lock().take();
    }

    /// Stops accepting work and aborts the workers, dropping queued jobs.
    pub fn abort(&self) {
        self.shutdown();
        for worker in self.workers.lock().drain(..) {
            worker.abort();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for worker in self.workers.get_mut().drain(..) {
            worker.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[test]
    fn test_config_from_url() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.workers, 200);
        assert_eq!(config.queue_size, 1024);

        let url = Url::new("meshrpc", "", 0, "")
            .with(UrlParam::MinWorkerThreads, 8)
            .with(UrlParam::MaxWorkerThreads, 4)
            .with(UrlParam::WorkerQueueSize, 0);
        let config = WorkerPoolConfig::from_url(&url);
        assert_eq!(config.workers, 8);
        assert_eq!(config.queue_size, 1);
    }

    #[tokio::test]
    async fn test_runs_jobs() {
        let pool = WorkerPool::new(WorkerPoolConfig { workers: 2, queue_size: 8 });
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let done = done.clone();
            pool.try_submit(async move {
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_rejects_when_full() {
        let pool = WorkerPool::new(WorkerPoolConfig { workers: 1, queue_size: 1 });
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (started_tx, started_rx) = oneshot::channel::<()>();

        pool.try_submit(async move {
            let _ = started_tx.send(());
            let _ = release_rx.await;
        })
        .unwrap();
        started_rx.await.unwrap();

        // worker busy, queue holds one
        pool.try_submit(async {}).unwrap();
        let err = pool.try_submit(async {}).unwrap_err();
        assert_eq!(err, RpcError::Framework("process thread pool is full, reject".into()));

        let _ = release_tx.send(());
    }

    #[tokio::test]
    async fn test_rejects_after_shutdown() {
        let pool = WorkerPool::new(WorkerPoolConfig { workers: 1, queue_size: 4 });
        pool.shutdown();
        assert!(pool.is_closed());
        assert!(pool.try_submit(async {}).is_err());
    }

    #[tokio::test]
    async fn test_panicking_job_keeps_worker_alive() {
        let pool = WorkerPool::new(WorkerPoolConfig { workers: 1, queue_size: 4 });
        pool.try_submit(async { panic!("job failed") }).unwrap();

        let (tx, rx) = oneshot::channel();
        pool.try_submit(async move {
            let _ = tx.send(42);
        })
        .unwrap();
        assert_eq!(tokio::time::timeout(Duration::from_secs(1), rx).await.unwrap().unwrap(), 42);
    }
}
