//! Error types for the job scheduler library.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for scheduler operations.
pub type JobResult<T> = Result<T, JobError>;

/// Errors that can occur while preempting, executing or rescheduling jobs.
#[derive(Error, Debug)]
pub enum JobError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No job is currently eligible for preemption
    #[error("No eligible job found")]
    NotFound,

    /// Job references an executor or local function that was never registered
    #[error("Executor not registered: {0}")]
    NotRegistered(String),

    /// Cron expression could not be parsed
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    /// Store call did not complete in time
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The scheduler's cancellation token fired
    #[error("Scheduler cancelled")]
    Cancelled,
}

impl JobError {
    /// Preemption misses are steady-state, not failures worth surfacing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, JobError::NotFound)
    }
}
