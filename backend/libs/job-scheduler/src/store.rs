use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, trace};

use crate::error::{JobError, JobResult};
use crate::model::{now_millis, Job, JobStatus};

/// Persistent record of schedulable jobs.
///
/// Preemption is arbitrated purely by a compare-and-swap on `(id, version)`,
/// so any number of scheduler instances may share one store.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Claim the earliest-due waiting job.
    ///
    /// Returns `JobError::NotFound` when nothing is eligible. A lost
    /// compare-and-swap is retried against the current eligible set; the
    /// returned job always reflects a successful swap (status running,
    /// version already incremented).
    async fn preempt(&self) -> JobResult<Job>;

    /// Put the job back to waiting, whatever the execution outcome was.
    async fn release(&self, id: i64) -> JobResult<()>;

    /// Heartbeat: refresh `utime` only.
    async fn update_utime(&self, id: i64) -> JobResult<()>;

    /// Set the next execution time without touching the status.
    async fn update_next_time(&self, id: i64, next_time: DateTime<Utc>) -> JobResult<()>;

    /// Pause the job permanently.
    async fn stop(&self, id: i64) -> JobResult<()>;
}

/// PostgreSQL implementation over the `cron_jobs` table.
///
/// ```sql
/// CREATE TABLE cron_jobs (
///     id          BIGSERIAL PRIMARY KEY,
///     name        VARCHAR(128) NOT NULL UNIQUE,
///     executor    VARCHAR(128) NOT NULL,
///     expression  VARCHAR(128) NOT NULL,
///     cfg         TEXT NOT NULL DEFAULT '',
///     status      SMALLINT NOT NULL DEFAULT 0,
///     version     BIGINT NOT NULL DEFAULT 0,
///     next_time   BIGINT NOT NULL,
///     utime       BIGINT NOT NULL,
///     ctime       BIGINT NOT NULL
/// );
/// CREATE INDEX idx_cron_jobs_status_next_time ON cron_jobs (status, next_time);
/// ```
#[derive(Clone)]
pub struct SqlxJobStore {
    pool: PgPool,
}

impl SqlxJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn job_from_row(row: &PgRow) -> Result<Job, sqlx::Error> {
    let raw_status: i16 = row.try_get("status")?;
    let status = JobStatus::from_i16(raw_status)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown job status {}", raw_status).into()))?;

    Ok(Job {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        executor: row.try_get("executor")?,
        expression: row.try_get("expression")?,
        cfg: row.try_get("cfg")?,
        status,
        version: row.try_get("version")?,
        next_time: row.try_get("next_time")?,
        utime: row.try_get("utime")?,
        ctime: row.try_get("ctime")?,
    })
}

#[async_trait]
impl JobStore for SqlxJobStore {
    async fn preempt(&self) -> JobResult<Job> {
        loop {
            let now = now_millis();

            let row = sqlx::query(
                r#"
                SELECT id, name, executor, expression, cfg, status, version, next_time, utime, ctime
                FROM cron_jobs
                WHERE status = $1 AND next_time <= $2
                ORDER BY next_time ASC
                LIMIT 1
                "#,
            )
            .bind(JobStatus::Waiting.as_i16())
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

            let Some(row) = row else {
                return Err(JobError::NotFound);
            };
            let mut job = job_from_row(&row)?;

            let result = sqlx::query(
                r#"
                UPDATE cron_jobs
                SET status = $1,
                    version = version + 1,
                    utime = $2
                WHERE id = $3 AND version = $4
                "#,
            )
            .bind(JobStatus::Running.as_i16())
            .bind(now)
            .bind(job.id)
            .bind(job.version)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                trace!(job_id = job.id, version = job.version, "Lost preemption race, retrying");
                continue;
            }

            job.status = JobStatus::Running;
            job.version += 1;
            job.utime = now;

            debug!(job_id = job.id, job_name = %job.name, version = job.version, "Job preempted");
            return Ok(job);
        }
    }

    async fn release(&self, id: i64) -> JobResult<()> {
        sqlx::query("UPDATE cron_jobs SET status = $1, utime = $2 WHERE id = $3")
            .bind(JobStatus::Waiting.as_i16())
            .bind(now_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_utime(&self, id: i64) -> JobResult<()> {
        sqlx::query("UPDATE cron_jobs SET utime = $1 WHERE id = $2")
            .bind(now_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_next_time(&self, id: i64, next_time: DateTime<Utc>) -> JobResult<()> {
        sqlx::query("UPDATE cron_jobs SET next_time = $1, utime = $2 WHERE id = $3")
            .bind(next_time.timestamp_millis())
            .bind(now_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn stop(&self, id: i64) -> JobResult<()> {
        sqlx::query("UPDATE cron_jobs SET status = $1, utime = $2 WHERE id = $3")
            .bind(JobStatus::Paused.as_i16())
            .bind(now_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
