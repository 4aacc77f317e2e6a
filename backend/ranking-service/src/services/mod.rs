//! Ranking computation and the collaborators it reads from.

pub mod leader;
pub mod ranking;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::error::Result;
use crate::models::{ContentItem, InteractionCounts};

pub use leader::{LeaderCoordinator, LeaderState, LockSettings};
pub use ranking::{score, BatchRankingService, RankingConfig, RankingService, TopN};

/// Source of published content.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentService: Send + Sync {
    /// Published items last updated at or after `since`, ordered by
    /// `utime` ascending.
    async fn list_published(
        &self,
        since: DateTime<Utc>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ContentItem>>;
}

/// Source of per-item interaction counters.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InteractionService: Send + Sync {
    /// Counters keyed by item id. Items without any interaction are absent.
    async fn get_counts_by_ids(
        &self,
        biz: &str,
        ids: &[i64],
    ) -> Result<HashMap<i64, InteractionCounts>>;
}
