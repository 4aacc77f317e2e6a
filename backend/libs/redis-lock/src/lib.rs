//! # Redis Lock
//!
//! Fleet-wide mutual exclusion over a single Redis key.
//!
//! A lease is a key whose value is a random token known only to its holder.
//! Acquisition is `SET NX PX` (with re-entry for the same token), and both
//! refresh and release are token-checked Lua scripts, so a holder that lost
//! the key to expiry can never extend or delete someone else's lease.
//!
//! ```rust,no_run
//! use redis_lock::{Lease, Locker, RedisLocker, RetryConfig};
//! use std::time::Duration;
//!
//! # async fn run(conn: redis::aio::ConnectionManager) -> redis_lock::LockResult<()> {
//! let locker = RedisLocker::new(conn);
//! let lease = locker
//!     .lock(
//!         "rlock:cron:ranking-job",
//!         Duration::from_secs(30),
//!         &RetryConfig::fixed_interval(Duration::from_micros(100), 3),
//!         Duration::from_secs(4),
//!     )
//!     .await?;
//!
//! let refresher = lease.clone();
//! tokio::spawn(async move {
//!     refresher
//!         .auto_refresh(Duration::from_secs(15), Duration::from_secs(1))
//!         .await
//! });
//!
//! // ... exclusive work ...
//!
//! lease.release().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod lease;
pub mod locker;
pub mod retry;

pub use error::{LockError, LockResult};
pub use lease::{Lease, Locker};
pub use locker::{RedisLease, RedisLocker};
pub use retry::RetryConfig;
