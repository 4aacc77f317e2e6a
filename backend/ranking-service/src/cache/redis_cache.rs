use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, warn};

use super::RankingCache;
use crate::error::{AppError, Result};
use crate::models::ContentItem;

/// Ranking snapshot shared through one Redis key.
///
/// Bodies are cut down to their abstract before storage; consumers of the
/// ranking only render a preview.
#[derive(Clone)]
pub struct RankingRedisCache {
    conn: ConnectionManager,
    key: String,
    ttl: Duration,
}

impl RankingRedisCache {
    pub fn new(conn: ConnectionManager, key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            conn,
            key: key.into(),
            ttl,
        }
    }
}

#[async_trait]
impl RankingCache for RankingRedisCache {
    async fn set(&self, items: &[ContentItem]) -> Result<()> {
        let abridged: Vec<ContentItem> = items.iter().map(ContentItem::abridged).collect();
        let json = serde_json::to_string(&abridged)?;

        redis::cmd("SET")
            .arg(&self.key)
            .arg(&json)
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut self.conn.clone())
            .await
            .map_err(|e| {
                warn!(key = %self.key, error = %e, "Redis SET failed");
                AppError::Redis(e)
            })?;

        debug!(key = %self.key, items = items.len(), "Stored ranking snapshot");
        Ok(())
    }

    async fn get(&self) -> Result<Vec<ContentItem>> {
        let value: Option<String> = redis::cmd("GET")
            .arg(&self.key)
            .query_async(&mut self.conn.clone())
            .await?;

        match value {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Err(AppError::CacheMiss),
        }
    }
}
