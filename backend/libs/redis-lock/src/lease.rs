use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{LockError, LockResult};
use crate::retry::RetryConfig;

/// Acquires named leases.
#[async_trait]
pub trait Locker: Send + Sync {
    /// Try to take `key` for `ttl`, retrying contended attempts per `retry`.
    ///
    /// Each attempt is bounded by `attempt_timeout`; a timed-out attempt
    /// counts as contended and is retried, any other backend error is
    /// returned immediately.
    async fn lock(
        &self,
        key: &str,
        ttl: Duration,
        retry: &RetryConfig,
        attempt_timeout: Duration,
    ) -> LockResult<Arc<dyn Lease>>;
}

/// A held lease on a key.
#[async_trait]
pub trait Lease: Send + Sync {
    fn key(&self) -> &str;

    /// Extend the TTL. Fails with `NotHeld` once another holder owns the key.
    async fn refresh(&self) -> LockResult<()>;

    /// Delete the key if it still carries this lease's token.
    ///
    /// Signals [`Lease::done`] whatever the outcome.
    async fn release(&self) -> LockResult<()>;

    /// Cancelled once the lease has been released.
    fn done(&self) -> CancellationToken;

    /// Refresh every `interval` until the lease is released (`Ok`) or a
    /// refresh fails (`Err`).
    ///
    /// A refresh that exceeds `attempt_timeout` is retried immediately once;
    /// a second consecutive timeout ends the loop.
    async fn auto_refresh(&self, interval: Duration, attempt_timeout: Duration) -> LockResult<()> {
        let done = self.done();
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut retrying = false;

        loop {
            if retrying {
                if done.is_cancelled() {
                    return Ok(());
                }
            } else {
                tokio::select! {
                    biased;
                    _ = done.cancelled() => return Ok(()),
                    _ = ticker.tick() => {}
                }
            }

            match timeout(attempt_timeout, self.refresh()).await {
                Ok(Ok(())) => {
                    debug!(key = %self.key(), "Lease refreshed");
                    retrying = false;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) if !retrying => {
                    warn!(key = %self.key(), "Lease refresh timed out, retrying");
                    retrying = true;
                }
                Err(_) => return Err(LockError::Timeout(attempt_timeout)),
            }
        }
    }
}
