//! Job leases: preemption plus heartbeat renewal, and rescheduling.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{JobError, JobResult};
use crate::model::Job;
use crate::store::JobStore;

/// How often a held lease refreshes the row's `utime`
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Upper bound for a single heartbeat write
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound for releasing the row once execution finished
const DEFAULT_RELEASE_TIMEOUT: Duration = Duration::from_secs(10);

/// Wraps a [`JobStore`] and turns a successful preemption into a held lease.
#[derive(Clone)]
pub struct LeaseManager {
    store: Arc<dyn JobStore>,
    refresh_interval: Duration,
    release_timeout: Duration,
}

impl LeaseManager {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            release_timeout: DEFAULT_RELEASE_TIMEOUT,
        }
    }

    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    pub fn with_release_timeout(mut self, release_timeout: Duration) -> Self {
        self.release_timeout = release_timeout;
        self
    }

    /// Preempt a job and start renewing its lease.
    ///
    /// The returned handle must be released once execution has finished.
    pub async fn preempt(&self) -> JobResult<LeaseHandle> {
        let job = self.store.preempt().await?;
        let stop = CancellationToken::new();

        tokio::spawn(renew_lease(
            self.store.clone(),
            job.id,
            self.refresh_interval,
            stop.clone(),
        ));

        debug!(job_id = job.id, job_name = %job.name, "Lease acquired");

        Ok(LeaseHandle {
            job,
            stop,
            store: self.store.clone(),
            release_timeout: self.release_timeout,
        })
    }

    /// Move the job to its next cron occurrence, or pause it when the
    /// expression yields none. Only called after a successful execution.
    pub async fn reset_next_time(&self, job: &Job) -> JobResult<()> {
        match job.next_time_after(Utc::now())? {
            Some(next_time) => {
                debug!(job_id = job.id, next_time = %next_time, "Job rescheduled");
                self.store.update_next_time(job.id, next_time).await
            }
            None => {
                info!(
                    job_id = job.id,
                    job_name = %job.name,
                    expression = %job.expression,
                    "No further occurrences, pausing job"
                );
                self.store.stop(job.id).await
            }
        }
    }
}

async fn renew_lease(
    store: Arc<dyn JobStore>,
    job_id: i64,
    refresh_interval: Duration,
    stop: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + refresh_interval, refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                match timeout(HEARTBEAT_TIMEOUT, store.update_utime(job_id)).await {
                    Ok(Ok(())) => debug!(job_id, "Lease renewed"),
                    Ok(Err(e)) => error!(job_id, error = %e, "Failed to renew lease"),
                    Err(_) => warn!(job_id, timeout_ms = HEARTBEAT_TIMEOUT.as_millis() as u64, "Lease renewal timed out"),
                }
            }
        }
    }
}

/// A held job lease.
///
/// Owns the renewal task's stop signal and the release operation. Releasing
/// consumes the handle; dropping it unreleased stops renewal but leaves the
/// row running.
pub struct LeaseHandle {
    job: Job,
    stop: CancellationToken,
    store: Arc<dyn JobStore>,
    release_timeout: Duration,
}

impl LeaseHandle {
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Stop renewal and return the job to waiting.
    pub async fn release(self) -> JobResult<()> {
        self.stop.cancel();

        let result = match timeout(self.release_timeout, self.store.release(self.job.id)).await {
            Ok(result) => result,
            Err(_) => Err(JobError::Timeout(self.release_timeout)),
        };

        match &result {
            Ok(()) => info!(job_id = self.job.id, job_name = %self.job.name, "Job released"),
            Err(e) => error!(job_id = self.job.id, error = %e, "Failed to release job"),
        }
        result
    }
}

impl Drop for LeaseHandle {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryJobStore;
    use crate::model::{now_millis, JobStatus};
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts heartbeats on top of the in-memory store.
    #[derive(Default)]
    struct HeartbeatCounter {
        inner: InMemoryJobStore,
        heartbeats: AtomicUsize,
    }

    #[async_trait]
    impl JobStore for HeartbeatCounter {
        async fn preempt(&self) -> JobResult<Job> {
            self.inner.preempt().await
        }
        async fn release(&self, id: i64) -> JobResult<()> {
            self.inner.release(id).await
        }
        async fn update_utime(&self, id: i64) -> JobResult<()> {
            self.heartbeats.fetch_add(1, Ordering::SeqCst);
            self.inner.update_utime(id).await
        }
        async fn update_next_time(&self, id: i64, t: DateTime<Utc>) -> JobResult<()> {
            self.inner.update_next_time(id, t).await
        }
        async fn stop(&self, id: i64) -> JobResult<()> {
            self.inner.stop(id).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_renews_until_released() {
        let store = Arc::new(HeartbeatCounter::default());
        let job = store.inner.add("renew", "local", "@hourly", now_millis() - 1);
        let manager = LeaseManager::new(store.clone()).with_refresh_interval(Duration::from_secs(60));

        let handle = manager.preempt().await.unwrap();
        tokio::time::sleep(Duration::from_secs(185)).await;
        assert_eq!(store.heartbeats.load(Ordering::SeqCst), 3);

        handle.release().await.unwrap();
        tokio::time::sleep(Duration::from_secs(300)).await;

        assert_eq!(store.heartbeats.load(Ordering::SeqCst), 3);
        assert_eq!(store.inner.get(job.id).unwrap().status, JobStatus::Waiting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_stops_renewal_without_release() {
        let store = Arc::new(HeartbeatCounter::default());
        let job = store.inner.add("orphan", "local", "@hourly", now_millis() - 1);
        let manager = LeaseManager::new(store.clone());

        drop(manager.preempt().await.unwrap());
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert_eq!(store.heartbeats.load(Ordering::SeqCst), 0);
        assert_eq!(store.inner.get(job.id).unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_reset_next_time_with_future_occurrence() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = store.add("every-minute", "local", "0 * * * * *", now_millis() - 1);
        let manager = LeaseManager::new(store.clone());

        let before = Utc::now();
        manager.reset_next_time(&job).await.unwrap();

        let row = store.get(job.id).unwrap();
        let expected = job.next_time_after(before).unwrap().unwrap();
        assert_eq!(row.status, JobStatus::Waiting);
        assert!(row.next_time > before.timestamp_millis());
        assert!(row.next_time - expected.timestamp_millis() <= 60_000);
        assert_eq!(row.next_time % 1_000, 0);
    }

    #[tokio::test]
    async fn test_reset_next_time_without_occurrence_stops_job() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = store.add("expired", "local", "0 0 0 1 1 * 2020", now_millis() - 1);
        let manager = LeaseManager::new(store.clone());

        manager.reset_next_time(&job).await.unwrap();

        let row = store.get(job.id).unwrap();
        assert_eq!(row.status, JobStatus::Paused);
        assert_eq!(row.next_time, job.next_time);
    }
}
