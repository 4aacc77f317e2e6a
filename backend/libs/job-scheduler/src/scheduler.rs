//! Preemption loop with bounded parallel dispatch.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::{JobError, JobResult};
use crate::executor::{ExecutionContext, Executor, ExecutorRegistry};
use crate::lease::{LeaseHandle, LeaseManager};
use crate::metrics::SchedulerMetrics;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Semaphore weight: maximum concurrently dispatched jobs
    pub max_concurrent: usize,
    /// Bound on a single preemption round-trip
    pub preempt_timeout: Duration,
    /// Bound on rescheduling after a successful run
    pub reschedule_timeout: Duration,
    /// Pause after a preemption miss; zero retries immediately
    pub idle_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 100,
            preempt_timeout: Duration::from_secs(1),
            reschedule_timeout: Duration::from_secs(1),
            idle_interval: Duration::ZERO,
        }
    }
}

/// Polls the lease manager and dispatches each preempted job to its executor.
///
/// Control flow is a single loop; executions run as independent tasks,
/// never more than `max_concurrent` at a time.
pub struct Scheduler {
    lease: LeaseManager,
    registry: Arc<ExecutorRegistry>,
    limiter: Arc<Semaphore>,
    config: SchedulerConfig,
    metrics: Option<SchedulerMetrics>,
}

impl Scheduler {
    pub fn new(lease: LeaseManager, registry: Arc<ExecutorRegistry>, config: SchedulerConfig) -> Self {
        Self {
            lease,
            registry,
            limiter: Arc::new(Semaphore::new(config.max_concurrent)),
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SchedulerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn available_permits(&self) -> usize {
        self.limiter.available_permits()
    }

    /// Run until `shutdown` fires, then return `JobError::Cancelled`.
    ///
    /// Jobs already dispatched keep running after this returns.
    pub async fn schedule(&self, shutdown: CancellationToken) -> JobResult<()> {
        info!(
            max_concurrent = self.config.max_concurrent,
            preempt_timeout_ms = self.config.preempt_timeout.as_millis() as u64,
            executors = ?self.registry.names(),
            "Scheduler starting"
        );

        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Scheduler received shutdown signal, stopping preemption loop");
                    return Err(JobError::Cancelled);
                }
                permit = self.limiter.clone().acquire_owned() => {
                    permit.map_err(|_| JobError::Cancelled)?
                }
            };

            let handle = match timeout(self.config.preempt_timeout, self.lease.preempt()).await {
                Ok(Ok(handle)) => handle,
                Ok(Err(e)) => {
                    drop(permit);
                    if e.is_not_found() {
                        trace!("No job due");
                        self.record_preempt("miss");
                    } else {
                        warn!(error = %e, "Preemption failed");
                        self.record_preempt("error");
                    }
                    self.idle(&shutdown).await;
                    continue;
                }
                Err(_) => {
                    drop(permit);
                    warn!(
                        timeout_ms = self.config.preempt_timeout.as_millis() as u64,
                        "Preemption timed out"
                    );
                    self.record_preempt("error");
                    continue;
                }
            };
            self.record_preempt("hit");

            let Some(executor) = self.registry.get(&handle.job().executor) else {
                error!(
                    job_id = handle.job().id,
                    job_name = %handle.job().name,
                    executor = %handle.job().executor,
                    "Executor not registered, job left running"
                );
                // The permit is intentionally not returned and the row stays
                // running until something outside the scheduler repairs it.
                permit.forget();
                continue;
            };

            self.dispatch(executor, handle, permit);
        }
    }

    fn dispatch(&self, executor: Arc<dyn Executor>, handle: LeaseHandle, permit: OwnedSemaphorePermit) {
        let lease = self.lease.clone();
        let metrics = self.metrics.clone();
        let reschedule_timeout = self.config.reschedule_timeout;

        if let Some(metrics) = &metrics {
            metrics.in_flight.inc();
        }

        tokio::spawn(async move {
            let job = handle.job().clone();
            let ctx = ExecutionContext::new();
            let start = Instant::now();

            debug!(
                job_id = job.id,
                job_name = %job.name,
                executor = %executor.name(),
                correlation_id = %ctx.correlation_id,
                "Dispatching job"
            );

            let result = executor.exec(&ctx, &job).await;
            let elapsed = start.elapsed();

            drop(permit);
            // Failures are logged by the handle; the row will be re-preempted.
            // Released before rescheduling: until `reset_next_time` lands the
            // row is waiting with its old `next_time`, and any instance may
            // preempt and run the same occurrence again.
            let _ = handle.release().await;

            if let Some(metrics) = &metrics {
                metrics.in_flight.dec();
                metrics.observe_job(&job.name, result.is_ok(), elapsed.as_secs_f64());
            }

            match result {
                Ok(()) => {
                    info!(
                        job_id = job.id,
                        job_name = %job.name,
                        correlation_id = %ctx.correlation_id,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Job completed"
                    );
                    match timeout(reschedule_timeout, lease.reset_next_time(&job)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            error!(job_id = job.id, error = %e, "Failed to reschedule job")
                        }
                        Err(_) => error!(
                            job_id = job.id,
                            timeout_ms = reschedule_timeout.as_millis() as u64,
                            "Rescheduling timed out"
                        ),
                    }
                }
                Err(e) => {
                    error!(
                        job_id = job.id,
                        job_name = %job.name,
                        correlation_id = %ctx.correlation_id,
                        elapsed_ms = elapsed.as_millis() as u64,
                        error = %e,
                        "Job execution failed"
                    );
                }
            }
        });
    }

    async fn idle(&self, shutdown: &CancellationToken) {
        if self.config.idle_interval.is_zero() {
            tokio::task::yield_now().await;
            return;
        }
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = tokio::time::sleep(self.config.idle_interval) => {}
        }
    }

    fn record_preempt(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_preempt(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::LocalFuncExecutor;
    use crate::memory::InMemoryJobStore;
    use crate::model::{now_millis, Job, JobStatus};
    use crate::store::JobStore;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{mpsc, Notify};

    /// How the next preemption call misbehaves.
    enum Fault {
        Database,
        Timeout,
        Hang,
    }

    /// In-memory store with scripted preemption faults and a log of writes.
    #[derive(Default)]
    struct ScriptedStore {
        inner: InMemoryJobStore,
        faults: Mutex<VecDeque<Fault>>,
        preempts: AtomicUsize,
        writes: Mutex<Vec<&'static str>>,
    }

    impl ScriptedStore {
        fn with_faults(faults: Vec<Fault>) -> Self {
            Self {
                faults: Mutex::new(faults.into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl JobStore for ScriptedStore {
        async fn preempt(&self) -> JobResult<Job> {
            self.preempts.fetch_add(1, Ordering::SeqCst);
            let fault = self.faults.lock().pop_front();
            match fault {
                Some(Fault::Database) => Err(JobError::Database(sqlx::Error::PoolTimedOut)),
                Some(Fault::Timeout) => Err(JobError::Timeout(Duration::from_secs(1))),
                Some(Fault::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    self.inner.preempt().await
                }
                None => self.inner.preempt().await,
            }
        }

        async fn release(&self, id: i64) -> JobResult<()> {
            self.writes.lock().push("release");
            self.inner.release(id).await
        }

        async fn update_utime(&self, id: i64) -> JobResult<()> {
            self.inner.update_utime(id).await
        }

        async fn update_next_time(&self, id: i64, next_time: DateTime<Utc>) -> JobResult<()> {
            self.writes.lock().push("update_next_time");
            self.inner.update_next_time(id, next_time).await
        }

        async fn stop(&self, id: i64) -> JobResult<()> {
            self.writes.lock().push("stop");
            self.inner.stop(id).await
        }
    }

    fn recording_registry(job_name: &str) -> (ExecutorRegistry, mpsc::UnboundedReceiver<i64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut local = LocalFuncExecutor::new();
        local.register_func(job_name, move |_ctx, job| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(job.id);
                Ok(())
            }
        });
        let mut registry = ExecutorRegistry::new();
        registry.register(Arc::new(local));
        (registry, rx)
    }

    fn test_config(max_concurrent: usize) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent,
            idle_interval: Duration::from_millis(5),
            ..Default::default()
        }
    }

    fn start<S: JobStore + 'static>(
        store: Arc<S>,
        registry: ExecutorRegistry,
        config: SchedulerConfig,
    ) -> (Arc<Scheduler>, CancellationToken, tokio::task::JoinHandle<JobResult<()>>) {
        let scheduler = Arc::new(Scheduler::new(
            LeaseManager::new(store),
            Arc::new(registry),
            config,
        ));
        let shutdown = CancellationToken::new();
        let task = {
            let scheduler = scheduler.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { scheduler.schedule(shutdown).await })
        };
        (scheduler, shutdown, task)
    }

    async fn eventually<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met within 2s");
    }

    #[tokio::test]
    async fn test_successful_job_is_released_and_rescheduled() {
        let store = Arc::new(InMemoryJobStore::new());
        let seeded = store.add("tick", "local", "0 0 0 1 1 *", now_millis() - 1);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut local = LocalFuncExecutor::new();
        local.register_func("tick", move |_ctx, job| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(job.id);
                Ok(())
            }
        });
        let mut registry = ExecutorRegistry::new();
        registry.register(Arc::new(local));

        let (_scheduler, shutdown, task) = start(store.clone(), registry, test_config(4));

        assert_eq!(rx.recv().await, Some(seeded.id));
        eventually(|| {
            let row = store.get(seeded.id).unwrap();
            row.status == JobStatus::Waiting && row.next_time > seeded.next_time
        })
        .await;

        shutdown.cancel();
        assert!(matches!(task.await.unwrap(), Err(JobError::Cancelled)));
        assert_eq!(store.get(seeded.id).unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_failed_job_is_released_with_next_time_unchanged() {
        let store = Arc::new(InMemoryJobStore::new());
        let seeded = store.add("flaky", "local", "0 * * * * *", now_millis() - 1);

        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let mut local = LocalFuncExecutor::new();
        local.register_func("flaky", move |_ctx, _job| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("downstream unavailable"))
            }
        });
        let mut registry = ExecutorRegistry::new();
        registry.register(Arc::new(local));

        let (_scheduler, shutdown, task) = start(store.clone(), registry, test_config(1));

        // Immediately eligible again after each failure.
        eventually(|| attempts.load(Ordering::SeqCst) >= 3).await;
        shutdown.cancel();
        let _ = task.await.unwrap();

        eventually(|| store.get(seeded.id).unwrap().status == JobStatus::Waiting).await;
        let row = store.get(seeded.id).unwrap();
        assert_eq!(row.next_time, seeded.next_time);
        assert!(row.version >= 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_never_exceeds_semaphore_weight() {
        const WEIGHT: usize = 3;

        let store = Arc::new(InMemoryJobStore::new());
        for i in 0..10 {
            store.add(&format!("job-{}", i), "local", "* * * * * *", now_millis() - 1);
        }

        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));

        let mut local = LocalFuncExecutor::new();
        for i in 0..10 {
            let (current, peak, completed) = (current.clone(), peak.clone(), completed.clone());
            local.register_func(format!("job-{}", i), move |_ctx, _job| {
                let (current, peak, completed) = (current.clone(), peak.clone(), completed.clone());
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    completed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
        }
        let mut registry = ExecutorRegistry::new();
        registry.register(Arc::new(local));

        let (_scheduler, shutdown, task) = start(store.clone(), registry, test_config(WEIGHT));

        eventually(|| completed.load(Ordering::SeqCst) >= 10).await;
        shutdown.cancel();
        let _ = task.await.unwrap();

        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= WEIGHT, "peak concurrency {} exceeded {}", peak, WEIGHT);
        assert!(peak >= 2);
    }

    #[tokio::test]
    async fn test_unregistered_executor_leaks_permit_and_leaves_job_running() {
        let store = Arc::new(InMemoryJobStore::new());
        let orphan = store.add("remote-job", "remote", "@hourly", now_millis() - 1);

        let (scheduler, shutdown, task) = start(store.clone(), ExecutorRegistry::new(), test_config(2));

        eventually(|| store.get(orphan.id).unwrap().status == JobStatus::Running).await;
        for _ in 0..20 {
            assert!(scheduler.available_permits() < 2);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        shutdown.cancel();
        let _ = task.await.unwrap();
        assert_eq!(store.get(orphan.id).unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_shutdown_while_waiting_for_capacity() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = store.add("blocking", "local", "@hourly", now_millis() - 1);

        let gate = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());
        let mut local = LocalFuncExecutor::new();
        {
            let (gate, started) = (gate.clone(), started.clone());
            local.register_func("blocking", move |_ctx, _job| {
                let (gate, started) = (gate.clone(), started.clone());
                async move {
                    started.notify_one();
                    gate.notified().await;
                    Ok(())
                }
            });
        }
        let mut registry = ExecutorRegistry::new();
        registry.register(Arc::new(local));

        let (scheduler, shutdown, task) = start(store.clone(), registry, test_config(1));
        started.notified().await;
        assert_eq!(scheduler.available_permits(), 0);

        shutdown.cancel();
        assert!(matches!(task.await.unwrap(), Err(JobError::Cancelled)));

        // In-flight work is not cancelled by scheduler shutdown.
        assert_eq!(store.get(job.id).unwrap().status, JobStatus::Running);
        gate.notify_one();
        eventually(|| store.get(job.id).unwrap().status == JobStatus::Waiting).await;
    }

    #[tokio::test]
    async fn test_store_errors_return_permit_and_loop_continues() {
        let store = Arc::new(ScriptedStore::with_faults(vec![
            Fault::Database,
            Fault::Timeout,
            Fault::Database,
        ]));
        let job = store.inner.add("tick", "local", "0 0 0 1 1 *", now_millis() - 1);
        let (registry, mut rx) = recording_registry("tick");

        let (scheduler, shutdown, task) = start(store.clone(), registry, test_config(2));

        assert_eq!(rx.recv().await, Some(job.id));
        assert!(store.preempts.load(Ordering::SeqCst) >= 4);
        eventually(|| store.inner.get(job.id).unwrap().status == JobStatus::Waiting).await;
        eventually(|| scheduler.available_permits() == 2).await;

        shutdown.cancel();
        assert!(matches!(task.await.unwrap(), Err(JobError::Cancelled)));
        assert_eq!(store.inner.get(job.id).unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_hung_preemption_is_abandoned_after_timeout() {
        let store = Arc::new(ScriptedStore::with_faults(vec![Fault::Hang]));
        let job = store.inner.add("tick", "local", "0 0 0 1 1 *", now_millis() - 1);
        let (registry, mut rx) = recording_registry("tick");

        let config = SchedulerConfig {
            preempt_timeout: Duration::from_millis(50),
            ..test_config(2)
        };
        let (scheduler, shutdown, task) = start(store.clone(), registry, config);

        assert_eq!(rx.recv().await, Some(job.id));
        assert!(store.preempts.load(Ordering::SeqCst) >= 2);
        eventually(|| scheduler.available_permits() == 2).await;

        shutdown.cancel();
        let _ = task.await.unwrap();
    }

    #[tokio::test]
    async fn test_success_releases_before_rescheduling() {
        let store = Arc::new(ScriptedStore::default());
        let job = store.inner.add("tick", "local", "0 0 0 1 1 *", now_millis() - 1);
        let (registry, mut rx) = recording_registry("tick");

        let (_scheduler, shutdown, task) = start(store.clone(), registry, test_config(1));

        assert_eq!(rx.recv().await, Some(job.id));
        eventually(|| store.writes.lock().len() >= 2).await;
        shutdown.cancel();
        let _ = task.await.unwrap();

        assert_eq!(*store.writes.lock(), vec!["release", "update_next_time"]);
        assert!(store.inner.get(job.id).unwrap().next_time > job.next_time);
    }
}
