//! Redis-backed locker. Ownership is a random token stored as the key's
//! value; every mutation is a Lua script that checks the token first.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::error::{LockError, LockResult};
use crate::lease::{Lease, Locker};
use crate::retry::RetryConfig;

/// Take the key if free; a holder presenting the same token re-enters and
/// gets a fresh TTL.
const LOCK_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current == false then
    return redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
elseif current == ARGV[1] then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
    return 'OK'
else
    return ''
end
"#;

const REFRESH_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
else
    return 0
end
"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

#[derive(Clone)]
pub struct RedisLocker {
    conn: ConnectionManager,
}

impl RedisLocker {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> LockResult<bool> {
        let mut conn = self.conn.clone();
        let reply: String = Script::new(LOCK_SCRIPT)
            .key(key)
            .arg(token)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;
        Ok(reply == "OK")
    }
}

#[async_trait]
impl Locker for RedisLocker {
    async fn lock(
        &self,
        key: &str,
        ttl: Duration,
        retry: &RetryConfig,
        attempt_timeout: Duration,
    ) -> LockResult<Arc<dyn Lease>> {
        let token = Uuid::new_v4().to_string();
        let mut retries = 0;

        loop {
            match timeout(attempt_timeout, self.try_lock(key, &token, ttl)).await {
                Ok(Ok(true)) => {
                    info!(key, ttl_ms = ttl.as_millis() as u64, "Lock acquired");
                    return Ok(Arc::new(RedisLease {
                        conn: self.conn.clone(),
                        key: key.to_string(),
                        token,
                        ttl,
                        done: CancellationToken::new(),
                    }));
                }
                Ok(Ok(false)) => trace!(key, retries, "Lock held elsewhere"),
                Ok(Err(e)) => return Err(e),
                Err(_) => warn!(
                    key,
                    timeout_ms = attempt_timeout.as_millis() as u64,
                    "Lock attempt timed out"
                ),
            }

            match retry.backoff(retries) {
                Some(wait) => {
                    retries += 1;
                    tokio::time::sleep(wait).await;
                }
                None => {
                    return Err(LockError::Contended {
                        key: key.to_string(),
                        attempts: retries + 1,
                    })
                }
            }
        }
    }
}

pub struct RedisLease {
    conn: ConnectionManager,
    key: String,
    token: String,
    ttl: Duration,
    done: CancellationToken,
}

#[async_trait]
impl Lease for RedisLease {
    fn key(&self) -> &str {
        &self.key
    }

    async fn refresh(&self) -> LockResult<()> {
        let mut conn = self.conn.clone();
        let refreshed: i64 = Script::new(REFRESH_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .arg(self.ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;

        if refreshed == 1 {
            Ok(())
        } else {
            Err(LockError::NotHeld {
                key: self.key.clone(),
            })
        }
    }

    async fn release(&self) -> LockResult<()> {
        self.done.cancel();

        let mut conn = self.conn.clone();
        let deleted: i64 = Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut conn)
            .await?;

        if deleted == 1 {
            debug!(key = %self.key, "Lock released");
            Ok(())
        } else {
            Err(LockError::NotHeld {
                key: self.key.clone(),
            })
        }
    }

    fn done(&self) -> CancellationToken {
        self.done.clone()
    }
}
