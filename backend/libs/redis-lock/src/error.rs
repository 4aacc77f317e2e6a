use std::time::Duration;
use thiserror::Error;

pub type LockResult<T> = Result<T, LockError>;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The key is gone or now carries another holder's token
    #[error("Lock not held: {key}")]
    NotHeld { key: String },

    /// Every acquisition attempt found the key held by someone else
    #[error("Lock {key} contended after {attempts} attempts")]
    Contended { key: String, attempts: u32 },

    #[error("Lock operation timed out after {0:?}")]
    Timeout(Duration),
}

impl LockError {
    pub fn is_contended(&self) -> bool {
        matches!(self, LockError::Contended { .. })
    }
}
