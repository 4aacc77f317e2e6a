//! Storage tiers for the ranking snapshot.
//!
//! - Local: in-process slot with its own expiry, read on every request
//! - Shared: Redis key read by every instance, used for cold start
//!
//! Either tier holds a whole snapshot; writes replace it wholesale.

mod local_cache;
mod redis_cache;

pub use local_cache::RankingLocalCache;
pub use redis_cache::RankingRedisCache;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::ContentItem;

#[async_trait]
pub trait RankingCache: Send + Sync {
    async fn set(&self, items: &[ContentItem]) -> Result<()>;

    /// Current snapshot, or `AppError::CacheMiss` when absent or expired.
    async fn get(&self) -> Result<Vec<ContentItem>>;
}
