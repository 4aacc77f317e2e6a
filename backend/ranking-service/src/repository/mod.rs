//! Ranking snapshot repository over the two cache tiers.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{RankingCache, RankingLocalCache};
use crate::error::Result;
use crate::models::ContentItem;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RankingRepository: Send + Sync {
    /// Replace the whole snapshot. Items are expected in descending score order.
    async fn replace_top_n(&self, items: Vec<ContentItem>) -> Result<()>;

    async fn get_top_n(&self) -> Result<Vec<ContentItem>>;
}

pub struct CachedRankingRepository {
    local: RankingLocalCache,
    shared: Arc<dyn RankingCache>,
}

impl CachedRankingRepository {
    pub fn new(local: RankingLocalCache, shared: Arc<dyn RankingCache>) -> Self {
        Self { local, shared }
    }

    /// Copy the shared snapshot into the local tier, whatever the local
    /// tier currently holds. Returns the number of items copied.
    pub async fn refresh_local(&self) -> Result<usize> {
        let items = self.shared.get().await?;
        self.local.set(&items).await?;
        Ok(items.len())
    }
}

#[async_trait]
impl RankingRepository for CachedRankingRepository {
    async fn replace_top_n(&self, items: Vec<ContentItem>) -> Result<()> {
        self.local.set(&items).await?;
        self.shared.set(&items).await
    }

    async fn get_top_n(&self) -> Result<Vec<ContentItem>> {
        if let Ok(items) = self.local.get().await {
            return Ok(items);
        }

        match self.shared.get().await {
            Ok(items) => {
                debug!("Refilling local ranking snapshot from shared store");
                self.local.set(&items).await?;
                Ok(items)
            }
            Err(e) => {
                if !e.is_cache_miss() {
                    warn!(error = %e, "Shared ranking snapshot unavailable, serving stale local copy");
                }
                self.local.force_get().map_err(|_| e)
            }
        }
    }
}
