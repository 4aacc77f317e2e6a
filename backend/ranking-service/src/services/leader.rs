//! Fleet-wide single leader for the ranking computation.
//!
//! Any instance may preempt the ranking job row, but only the holder of the
//! fleet lease computes. Lease ownership is a small state machine guarded by
//! one mutex; the background refresher and `close` both go through it, and a
//! generation counter keeps a stale refresher from clobbering a newer lease.

use redis_lock::{Lease, LockResult, Locker, RetryConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderState {
    Unlocked,
    /// Lease acquired, refresher not yet running
    Held,
    /// Lease acquired and kept alive by the refresher
    Refreshing,
}

#[derive(Debug, Clone)]
pub struct LockSettings {
    pub key: String,
    /// Lease TTL; refreshes run every `ttl / 2`
    pub ttl: Duration,
    pub retry: RetryConfig,
    /// Bound on the whole acquisition including retries
    pub acquire_timeout: Duration,
    /// Bound on a single acquisition attempt
    pub attempt_timeout: Duration,
}

impl LockSettings {
    pub fn new(key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            ttl,
            retry: RetryConfig::fixed_interval(Duration::from_micros(100), 3),
            acquire_timeout: Duration::from_secs(4),
            attempt_timeout: Duration::from_secs(1),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

struct Inner {
    state: LeaderState,
    lease: Option<Arc<dyn Lease>>,
    generation: u64,
}

#[derive(Clone)]
pub struct LeaderCoordinator {
    locker: Arc<dyn Locker>,
    settings: LockSettings,
    inner: Arc<Mutex<Inner>>,
}

impl LeaderCoordinator {
    pub fn new(locker: Arc<dyn Locker>, settings: LockSettings) -> Self {
        Self {
            locker,
            settings,
            inner: Arc::new(Mutex::new(Inner {
                state: LeaderState::Unlocked,
                lease: None,
                generation: 0,
            })),
        }
    }

    pub async fn state(&self) -> LeaderState {
        self.inner.lock().await.state
    }

    /// Whether this instance leads, acquiring the lease if it is free.
    ///
    /// Failing to acquire is not an error: another instance leads this tick.
    pub async fn ensure_leader(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.state != LeaderState::Unlocked {
            return true;
        }

        let attempt = self.locker.lock(
            &self.settings.key,
            self.settings.ttl,
            &self.settings.retry,
            self.settings.attempt_timeout,
        );
        let lease = match timeout(self.settings.acquire_timeout, attempt).await {
            Ok(Ok(lease)) => lease,
            Ok(Err(e)) if e.is_contended() => {
                debug!(key = %self.settings.key, error = %e, "Ranking lock held by another instance, skipping pass");
                return false;
            }
            Ok(Err(e)) => {
                warn!(key = %self.settings.key, error = %e, "Ranking lock not acquired, skipping pass");
                return false;
            }
            Err(_) => {
                warn!(
                    key = %self.settings.key,
                    timeout_ms = self.settings.acquire_timeout.as_millis() as u64,
                    "Ranking lock acquisition timed out, skipping pass"
                );
                return false;
            }
        };

        inner.generation += 1;
        inner.state = LeaderState::Held;
        inner.lease = Some(lease.clone());
        let generation = inner.generation;
        drop(inner);

        info!(key = %self.settings.key, generation, "Became ranking leader");
        self.spawn_refresher(lease, generation);
        true
    }

    fn spawn_refresher(&self, lease: Arc<dyn Lease>, generation: u64) {
        let inner = self.inner.clone();
        let interval = self.settings.ttl / 2;
        let attempt_timeout = self.settings.ttl;

        tokio::spawn(async move {
            {
                let mut guard = inner.lock().await;
                if guard.generation != generation || guard.state != LeaderState::Held {
                    return;
                }
                guard.state = LeaderState::Refreshing;
            }

            let result = lease.auto_refresh(interval, attempt_timeout).await;

            let mut guard = inner.lock().await;
            if guard.generation != generation {
                return;
            }
            match result {
                Ok(()) => debug!(key = %lease.key(), "Ranking lock refresher stopped"),
                Err(e) => warn!(key = %lease.key(), error = %e, "Ranking lock lost"),
            }
            guard.state = LeaderState::Unlocked;
            guard.lease = None;
        });
    }

    /// Give up leadership and release the lease, if held.
    pub async fn close(&self) -> LockResult<()> {
        let lease = {
            let mut inner = self.inner.lock().await;
            inner.generation += 1;
            inner.state = LeaderState::Unlocked;
            inner.lease.take()
        };

        match lease {
            Some(lease) => {
                info!(key = %lease.key(), "Releasing ranking lock");
                lease.release().await
            }
            None => Ok(()),
        }
    }
}
