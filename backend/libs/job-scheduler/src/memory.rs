//! Process-local job store.
//!
//! Keeps the same compare-and-swap contract as [`SqlxJobStore`](crate::SqlxJobStore):
//! the eligibility read and the conditional write happen in separate
//! critical sections, with a yield point in between, so concurrent
//! preemptors genuinely race on the version check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::trace;

use crate::error::{JobError, JobResult};
use crate::model::{now_millis, Job, JobStatus};
use crate::store::JobStore;

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<BTreeMap<i64, Job>>,
    next_id: AtomicI64,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a waiting job due at `next_time` (epoch millis) and return it.
    pub fn add(&self, name: &str, executor: &str, expression: &str, next_time: i64) -> Job {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = now_millis();
        let job = Job {
            id,
            name: name.to_string(),
            executor: executor.to_string(),
            expression: expression.to_string(),
            cfg: String::new(),
            status: JobStatus::Waiting,
            version: 0,
            next_time,
            utime: now,
            ctime: now,
        };
        self.jobs.lock().insert(id, job.clone());
        job
    }

    pub fn get(&self, id: i64) -> Option<Job> {
        self.jobs.lock().get(&id).cloned()
    }

    fn update<F>(&self, id: i64, f: F) -> JobResult<()>
    where
        F: FnOnce(&mut Job),
    {
        // Updating a missing row affects zero rows, same as the SQL store.
        if let Some(job) = self.jobs.lock().get_mut(&id) {
            f(job);
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn preempt(&self) -> JobResult<Job> {
        loop {
            let now = now_millis();

            let candidate = self
                .jobs
                .lock()
                .values()
                .filter(|job| job.is_due(now))
                .min_by_key(|job| (job.next_time, job.id))
                .cloned();

            let Some(candidate) = candidate else {
                return Err(JobError::NotFound);
            };

            tokio::task::yield_now().await;

            let swapped = {
                let mut jobs = self.jobs.lock();
                match jobs.get_mut(&candidate.id) {
                    Some(row) if row.version == candidate.version => {
                        row.status = JobStatus::Running;
                        row.version += 1;
                        row.utime = now;
                        Some(row.clone())
                    }
                    _ => None,
                }
            };

            match swapped {
                Some(job) => return Ok(job),
                None => {
                    trace!(job_id = candidate.id, "Lost preemption race, retrying");
                }
            }
        }
    }

    async fn release(&self, id: i64) -> JobResult<()> {
        self.update(id, |job| {
            job.status = JobStatus::Waiting;
            job.utime = now_millis();
        })
    }

    async fn update_utime(&self, id: i64) -> JobResult<()> {
        self.update(id, |job| job.utime = now_millis())
    }

    async fn update_next_time(&self, id: i64, next_time: DateTime<Utc>) -> JobResult<()> {
        self.update(id, |job| {
            job.next_time = next_time.timestamp_millis();
            job.utime = now_millis();
        })
    }

    async fn stop(&self, id: i64) -> JobResult<()> {
        self.update(id, |job| {
            job.status = JobStatus::Paused;
            job.utime = now_millis();
        })
    }
}
