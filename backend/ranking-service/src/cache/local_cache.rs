use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::RankingCache;
use crate::error::{AppError, Result};
use crate::models::ContentItem;

struct Snapshot {
    items: Arc<Vec<ContentItem>>,
    expires_at: Instant,
}

/// Process-local ranking snapshot with a fixed lifetime.
pub struct RankingLocalCache {
    slot: RwLock<Option<Snapshot>>,
    ttl: Duration,
}

impl RankingLocalCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: RwLock::new(None),
            ttl,
        }
    }

    /// The last snapshot stored, ignoring expiry.
    pub fn force_get(&self) -> Result<Vec<ContentItem>> {
        match self.slot.read().as_ref() {
            Some(snapshot) if !snapshot.items.is_empty() => Ok(snapshot.items.as_ref().clone()),
            _ => Err(AppError::CacheMiss),
        }
    }
}

#[async_trait]
impl RankingCache for RankingLocalCache {
    async fn set(&self, items: &[ContentItem]) -> Result<()> {
        *self.slot.write() = Some(Snapshot {
            items: Arc::new(items.to_vec()),
            expires_at: Instant::now() + self.ttl,
        });
        Ok(())
    }

    async fn get(&self) -> Result<Vec<ContentItem>> {
        match self.slot.read().as_ref() {
            Some(snapshot)
                if snapshot.expires_at > Instant::now() && !snapshot.items.is_empty() =>
            {
                Ok(snapshot.items.as_ref().clone())
            }
            _ => Err(AppError::CacheMiss),
        }
    }
}
