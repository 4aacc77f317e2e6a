/// Error types for the ranking service
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Lock error: {0}")]
    Lock(#[from] redis_lock::LockError),

    #[error("Job error: {0}")]
    Job(#[from] job_scheduler::JobError),

    /// Snapshot absent or expired in the queried tier
    #[error("Ranking cache miss")]
    CacheMiss,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, AppError::CacheMiss)
    }
}
