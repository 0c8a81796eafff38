//! Async side-effect dispatcher.
//!
//! A bounded FIFO queue drained by a fixed pool of workers. Enqueueing
//! never fails the caller: when the queue is full a job is either dropped
//! or the caller waits for space, depending on [`QueueFullPolicy`].
//!
//! Each job runs in its own task under a per-job timeout. The job receives
//! a cancellation token derived from the dispatcher's base lifetime, never
//! from the request that enqueued it, so jobs outlive the request.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ExecError;

/// Queue capacity used when the configured size is zero.
pub const DEFAULT_QUEUE_SIZE: usize = 1000;

/// Per-job timeout used by [`DispatcherConfig::default`].
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(15);

/// Boxed future returned by a job body.
pub type JobFuture = Pin<Box<dyn Future<Output = Result<(), ExecError>> + Send>>;

type JobBody = Box<dyn FnOnce(CancellationToken) -> JobFuture + Send>;

/// A named unit of background work.
pub struct AsyncJob {
    name: String,
    body: JobBody,
}

impl AsyncJob {
    /// Create a job from a closure receiving the job's cancellation token.
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ExecError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: Box::new(move |token| Box::pin(body(token)) as JobFuture),
        }
    }

    /// Job name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for AsyncJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncJob").field("name", &self.name).finish_non_exhaustive()
    }
}

/// What to do when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueFullPolicy {
    /// Discard the job and log a warning
    Drop,
    /// Wait until a slot frees up
    Block,
}

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Queue capacity (0 → [`DEFAULT_QUEUE_SIZE`])
    pub queue_size: usize,
    /// Worker count (0 → 1)
    pub workers: usize,
    /// Full-queue admission policy
    pub policy: QueueFullPolicy,
    /// Per-job timeout
    pub job_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            workers: 1,
            policy: QueueFullPolicy::Drop,
            job_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }
}

/// Result of an enqueue call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Accepted immediately
    Queued,
    /// Accepted after waiting for space
    QueuedAfterWait,
    /// Queue full; job discarded
    Dropped,
    /// Dispatcher is disabled; job discarded
    Disabled,
    /// Dispatcher was shut down; job discarded
    Closed,
}

struct Pool {
    sender: mpsc::Sender<AsyncJob>,
    receiver: Arc<Mutex<mpsc::Receiver<AsyncJob>>>,
    workers: usize,
    policy: QueueFullPolicy,
    job_timeout: Duration,
    base: CancellationToken,
    started: Once,
    spawned: Arc<AtomicUsize>,
}

/// Bounded worker-pool dispatcher.
pub struct AsyncDispatcher {
    pool: Option<Pool>,
}

impl AsyncDispatcher {
    /// Create a dispatcher. Workers start lazily on the first enqueue or
    /// an explicit [`start`](Self::start).
    pub fn new(config: DispatcherConfig, base: CancellationToken) -> Self {
        let queue_size = if config.queue_size == 0 { DEFAULT_QUEUE_SIZE } else { config.queue_size };
        let workers = config.workers.max(1);
        let (sender, receiver) = mpsc::channel(queue_size);

        Self {
            pool: Some(Pool {
                sender,
                receiver: Arc::new(Mutex::new(receiver)),
                workers,
                policy: config.policy,
                job_timeout: config.job_timeout,
                base,
                started: Once::new(),
                spawned: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    /// A dispatcher that accepts and discards every job.
    pub fn disabled() -> Self {
        Self { pool: None }
    }

    /// Whether jobs are actually executed.
    pub fn is_enabled(&self) -> bool {
        self.pool.is_some()
    }

    /// Queue capacity (0 when disabled).
    pub fn capacity(&self) -> usize {
        self.pool.as_ref().map_or(0, |pool| pool.sender.max_capacity())
    }

    /// Configured worker count (0 when disabled).
    pub fn worker_count(&self) -> usize {
        self.pool.as_ref().map_or(0, |pool| pool.workers)
    }

    /// Workers spawned so far.
    pub fn workers_started(&self) -> usize {
        self.pool.as_ref().map_or(0, |pool| pool.spawned.load(Ordering::SeqCst))
    }

    /// Jobs waiting in the queue.
    pub fn queue_depth(&self) -> usize {
        self.pool
            .as_ref()
            .map_or(0, |pool| pool.sender.max_capacity() - pool.sender.capacity())
    }

    /// Spawn the worker pool. Idempotent and safe to race.
    ///
    /// Outside a Tokio runtime this is a no-op; a later call from inside
    /// one starts the pool.
    pub fn start(&self) {
        let Some(pool) = &self.pool else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Async dispatcher start requested outside a Tokio runtime");
            return;
        };

        pool.started.call_once(|| {
            for id in 0..pool.workers {
                let receiver = pool.receiver.clone();
                let base = pool.base.clone();
                let job_timeout = pool.job_timeout;
                runtime.spawn(worker_loop(id, receiver, base, job_timeout));
                pool.spawned.fetch_add(1, Ordering::SeqCst);
            }
            info!(workers = pool.workers, capacity = pool.sender.max_capacity(), "Async dispatcher started");
        });
    }

    /// Submit a job. Never fails; the returned [`Admission`] says what
    /// happened to it.
    pub async fn enqueue(&self, job: AsyncJob) -> Admission {
        let Some(pool) = &self.pool else {
            debug!(job = %job.name, "Async dispatcher disabled, discarding job");
            return Admission::Disabled;
        };
        if pool.base.is_cancelled() {
            warn!(job = %job.name, "Async dispatcher shut down, dropping job");
            return Admission::Closed;
        }
        self.start();

        let name = job.name.clone();
        let admission = match pool.sender.try_send(job) {
            Ok(()) => Admission::Queued,
            Err(mpsc::error::TrySendError::Full(job)) => match pool.policy {
                QueueFullPolicy::Drop => {
                    warn!(job = %name, capacity = pool.sender.max_capacity(), "Async queue full, dropping job");
                    return Admission::Dropped;
                },
                QueueFullPolicy::Block => {
                    debug!(job = %name, "Async queue full, waiting for space");
                    let sent = tokio::select! {
                        _ = pool.base.cancelled() => None,
                        sent = pool.sender.send(job) => Some(sent),
                    };
                    match sent {
                        Some(Ok(())) => Admission::QueuedAfterWait,
                        Some(Err(_)) | None => {
                            warn!(job = %name, "Async dispatcher closed, dropping job");
                            return Admission::Closed;
                        },
                    }
                },
            },
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(job = %name, "Async dispatcher closed, dropping job");
                return Admission::Closed;
            },
        };

        debug!(job = %name, depth = self.queue_depth(), "Async job queued");
        admission
    }

    /// Cancel the base lifetime: workers stop taking jobs and running jobs
    /// see their token cancelled. Queued jobs are discarded.
    pub fn shutdown(&self) {
        if let Some(pool) = &self.pool {
            info!("Async dispatcher shutting down");
            pool.base.cancel();
        }
    }
}

async fn worker_loop(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<AsyncJob>>>,
    base: CancellationToken,
    job_timeout: Duration,
) {
    debug!(worker = id, "Async worker started");

    loop {
        let next = {
            let mut rx = receiver.lock().await;
            tokio::select! {
                _ = base.cancelled() => None,
                job = rx.recv() => job,
            }
        };

        let Some(job) = next else {
            break;
        };
        run_job(id, job, &base, job_timeout).await;
    }

    debug!(worker = id, "Async worker stopped");
}

async fn run_job(worker: usize, job: AsyncJob, base: &CancellationToken, job_timeout: Duration) {
    let AsyncJob { name, body } = job;
    let token = base.child_token();
    let started = Instant::now();

    let mut handle = tokio::spawn(body(token.clone()));

    match tokio::time::timeout(job_timeout, &mut handle).await {
        Ok(Ok(Ok(()))) => {
            info!(worker, job = %name, elapsed_ms = started.elapsed().as_millis() as u64, "Async job completed");
        },
        Ok(Ok(Err(e))) => {
            warn!(worker, job = %name, error = %e, "Async job failed");
        },
        Ok(Err(join_err)) if join_err.is_panic() => {
            error!(worker, job = %name, "Async job panicked");
        },
        Ok(Err(join_err)) => {
            warn!(worker, job = %name, error = %join_err, "Async job aborted");
        },
        Err(_) => {
            token.cancel();
            handle.abort();
            warn!(worker, job = %name, timeout_ms = job_timeout.as_millis() as u64, "Async job timed out");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::oneshot;

    fn config(queue_size: usize, workers: usize, policy: QueueFullPolicy) -> DispatcherConfig {
        DispatcherConfig { queue_size, workers, policy, job_timeout: Duration::from_secs(5) }
    }

    fn counting_job(counter: Arc<AtomicUsize>) -> AsyncJob {
        AsyncJob::new("count", move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn flag_job(flag: Arc<AtomicBool>) -> AsyncJob {
        AsyncJob::new("flag", move |_| async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    /// Occupies a worker until `release` fires. Resolves `started` once running.
    fn blocking_job(started: oneshot::Sender<()>, release: oneshot::Receiver<()>) -> AsyncJob {
        AsyncJob::new("block", move |_| async move {
            let _ = started.send(());
            let _ = release.await;
            Ok(())
        })
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_job_runs() {
        let dispatcher = AsyncDispatcher::new(config(4, 1, QueueFullPolicy::Drop), CancellationToken::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let admission = dispatcher.enqueue(counting_job(counter.clone())).await;
        assert_eq!(admission, Admission::Queued);

        wait_until(|| counter.load(Ordering::SeqCst) == 1).await;
    }

    #[tokio::test]
    async fn test_drop_policy_discards_when_full() {
        let dispatcher = AsyncDispatcher::new(config(2, 1, QueueFullPolicy::Drop), CancellationToken::new());
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();

        dispatcher.enqueue(blocking_job(started_tx, release_rx)).await;
        started_rx.await.unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        assert_eq!(dispatcher.enqueue(counting_job(counter.clone())).await, Admission::Queued);
        assert_eq!(dispatcher.enqueue(counting_job(counter.clone())).await, Admission::Queued);

        let fourth = Arc::new(AtomicBool::new(false));
        assert_eq!(dispatcher.enqueue(flag_job(fourth.clone())).await, Admission::Dropped);

        release_tx.send(()).unwrap();
        wait_until(|| counter.load(Ordering::SeqCst) == 2).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!fourth.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_block_policy_waits_for_space() {
        let dispatcher = Arc::new(AsyncDispatcher::new(
            config(2, 1, QueueFullPolicy::Block),
            CancellationToken::new(),
        ));
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();

        dispatcher.enqueue(blocking_job(started_tx, release_rx)).await;
        started_rx.await.unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        dispatcher.enqueue(counting_job(counter.clone())).await;
        dispatcher.enqueue(counting_job(counter.clone())).await;

        let fourth = Arc::new(AtomicBool::new(false));
        let pending = {
            let dispatcher = dispatcher.clone();
            let job = flag_job(fourth.clone());
            tokio::spawn(async move { dispatcher.enqueue(job).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());

        release_tx.send(()).unwrap();
        assert_eq!(pending.await.unwrap(), Admission::QueuedAfterWait);
        wait_until(|| fourth.load(Ordering::SeqCst)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_dispatcher_is_noop() {
        let dispatcher = AsyncDispatcher::disabled();
        let flag = Arc::new(AtomicBool::new(false));

        assert_eq!(dispatcher.enqueue(flag_job(flag.clone())).await, Admission::Disabled);
        dispatcher.start();
        dispatcher.shutdown();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!flag.load(Ordering::SeqCst));
        assert!(!dispatcher.is_enabled());
        assert_eq!(dispatcher.workers_started(), 0);
    }

    #[tokio::test]
    async fn test_failing_job_does_not_stop_worker() {
        let dispatcher = AsyncDispatcher::new(config(4, 1, QueueFullPolicy::Drop), CancellationToken::new());
        let flag = Arc::new(AtomicBool::new(false));

        dispatcher
            .enqueue(AsyncJob::new("fail", |_| async { Err::<(), _>(ExecError::Sink("boom".to_string())) }))
            .await;
        dispatcher.enqueue(flag_job(flag.clone())).await;

        wait_until(|| flag.load(Ordering::SeqCst)).await;
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_stop_worker() {
        let dispatcher = AsyncDispatcher::new(config(4, 1, QueueFullPolicy::Drop), CancellationToken::new());
        let flag = Arc::new(AtomicBool::new(false));

        dispatcher
            .enqueue(AsyncJob::new("panic", |_| async {
                let missing: Option<()> = None;
                missing.expect("job exploded");
                Ok::<(), ExecError>(())
            }))
            .await;
        dispatcher.enqueue(flag_job(flag.clone())).await;

        wait_until(|| flag.load(Ordering::SeqCst)).await;
    }

    #[tokio::test]
    async fn test_timed_out_job_frees_worker() {
        let dispatcher = AsyncDispatcher::new(
            DispatcherConfig {
                queue_size: 4,
                workers: 1,
                policy: QueueFullPolicy::Drop,
                job_timeout: Duration::from_millis(50),
            },
            CancellationToken::new(),
        );
        let flag = Arc::new(AtomicBool::new(false));

        dispatcher
            .enqueue(AsyncJob::new("hang", |_| async {
                std::future::pending::<()>().await;
                Ok::<(), ExecError>(())
            }))
            .await;
        dispatcher.enqueue(flag_job(flag.clone())).await;

        wait_until(|| flag.load(Ordering::SeqCst)).await;
    }

    #[tokio::test]
    async fn test_shutdown_cancels_running_job() {
        let base = CancellationToken::new();
        let dispatcher = AsyncDispatcher::new(config(4, 1, QueueFullPolicy::Drop), base.clone());
        let (started_tx, started_rx) = oneshot::channel();
        let (cancelled_tx, cancelled_rx) = oneshot::channel();

        dispatcher
            .enqueue(AsyncJob::new("wait", move |token| async move {
                let _ = started_tx.send(());
                token.cancelled().await;
                let _ = cancelled_tx.send(());
                Err(ExecError::Cancelled("shutdown".to_string()))
            }))
            .await;
        started_rx.await.unwrap();

        dispatcher.shutdown();
        assert!(base.is_cancelled());
        tokio::time::timeout(Duration::from_secs(2), cancelled_rx).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let dispatcher = Arc::new(AsyncDispatcher::new(
            config(8, 3, QueueFullPolicy::Drop),
            CancellationToken::new(),
        ));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    dispatcher.start();
                    dispatcher.enqueue(AsyncJob::new("noop", |_| async { Ok::<(), ExecError>(()) })).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(dispatcher.workers_started(), 3);
    }

    #[tokio::test]
    async fn test_blocked_enqueue_returns_closed_on_shutdown() {
        let dispatcher = Arc::new(AsyncDispatcher::new(
            config(1, 1, QueueFullPolicy::Block),
            CancellationToken::new(),
        ));
        let (started_tx, started_rx) = oneshot::channel();
        let (_release_tx, release_rx) = oneshot::channel::<()>();

        dispatcher.enqueue(blocking_job(started_tx, release_rx)).await;
        started_rx.await.unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        assert_eq!(dispatcher.enqueue(counting_job(counter.clone())).await, Admission::Queued);

        let pending = {
            let dispatcher = dispatcher.clone();
            let job = counting_job(counter.clone());
            tokio::spawn(async move { dispatcher.enqueue(job).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());

        dispatcher.shutdown();
        let admission = tokio::time::timeout(Duration::from_secs(2), pending).await.unwrap().unwrap();
        assert_eq!(admission, Admission::Closed);
    }

    #[test]
    fn test_start_outside_runtime_is_deferred() {
        let dispatcher = AsyncDispatcher::new(config(4, 2, QueueFullPolicy::Drop), CancellationToken::new());

        dispatcher.start();
        assert_eq!(dispatcher.workers_started(), 0);

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        runtime.block_on(async {
            assert_eq!(dispatcher.enqueue(counting_job(counter.clone())).await, Admission::Queued);
            wait_until(|| counter.load(Ordering::SeqCst) == 1).await;
        });
        assert_eq!(dispatcher.workers_started(), 2);
    }

    #[test]
    fn test_zero_sizes_fall_back_to_defaults() {
        let dispatcher = AsyncDispatcher::new(config(0, 0, QueueFullPolicy::Drop), CancellationToken::new());
        assert_eq!(dispatcher.capacity(), DEFAULT_QUEUE_SIZE);
        assert_eq!(dispatcher.worker_count(), 1);
        assert_eq!(dispatcher.workers_started(), 0);
    }
}
