use chrono::{DateTime, Utc};
use cron::Schedule;
use std::fmt;
use std::str::FromStr;

use crate::error::{JobError, JobResult};

/// Scheduling state of a job row.
///
/// Persisted as a SMALLINT: 0 = waiting, 1 = running, 2 = paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    /// Nobody holds the job; eligible once `next_time` has passed
    Waiting,
    /// Preempted by some scheduler instance
    Running,
    /// No further occurrences, never scheduled again
    Paused,
}

impl JobStatus {
    pub fn as_i16(self) -> i16 {
        match self {
            Self::Waiting => 0,
            Self::Running => 1,
            Self::Paused => 2,
        }
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(Self::Waiting),
            1 => Some(Self::Running),
            2 => Some(Self::Paused),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Paused => "paused",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A schedulable unit of recurring work as stored in `cron_jobs`.
///
/// All timestamps are epoch milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: i64,
    /// Unique job name
    pub name: String,
    /// Name of the registered executor that runs this job
    pub executor: String,
    /// Cron expression
    pub expression: String,
    /// Opaque configuration, interpreted only by the executor
    pub cfg: String,
    pub status: JobStatus,
    /// Incremented on every successful preemption
    pub version: i64,
    pub next_time: i64,
    pub utime: i64,
    pub ctime: i64,
}

impl Job {
    /// Whether the row may be preempted at `now_ms`.
    pub fn is_due(&self, now_ms: i64) -> bool {
        self.status == JobStatus::Waiting && self.next_time <= now_ms
    }

    pub fn schedule(&self) -> JobResult<Schedule> {
        parse_schedule(&self.expression)
    }

    /// Next occurrence strictly after `after`, or `None` when the expression
    /// has no future occurrence.
    pub fn next_time_after(&self, after: DateTime<Utc>) -> JobResult<Option<DateTime<Utc>>> {
        Ok(self.schedule()?.after(&after).next())
    }
}

/// Parse a cron expression, accepting 5-field (no seconds), 6/7-field and
/// `@descriptor` forms.
pub fn parse_schedule(expression: &str) -> JobResult<Schedule> {
    let normalized = normalize_expression(expression);
    Schedule::from_str(&normalized).map_err(|e| JobError::InvalidExpression {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

/// The `cron` crate requires a leading seconds field; standard 5-field
/// expressions get `0` seconds prepended.
pub(crate) fn normalize_expression(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
