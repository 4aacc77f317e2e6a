//! Hot-content ranking.
//!
//! A pass streams recently updated published content in pages, scores each
//! item by likes decayed with age, keeps the best N in a bounded min-heap
//! and replaces the stored snapshot with the result.

mod top_n;

pub use top_n::TopN;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::{ContentService, InteractionService};
use crate::error::Result;
use crate::models::{ContentItem, BIZ_ARTICLE};
use crate::repository::RankingRepository;

/// Popularity of an item with `like_cnt` likes, last updated `age_secs` ago.
///
/// `(likes - 1) / (age + 2)^1.5`: a single like scores zero and the score
/// decays superlinearly with age.
pub fn score(like_cnt: i64, age_secs: f64) -> f64 {
    (like_cnt - 1) as f64 / (age_secs.max(0.0) + 2.0).powf(1.5)
}

#[derive(Debug, Clone)]
pub struct RankingConfig {
    /// Heap capacity
    pub top_n: usize,
    /// Page size when listing content
    pub batch_size: usize,
    /// Recency window measured back from the pass start
    pub window: ChronoDuration,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            top_n: 100,
            batch_size: 100,
            window: ChronoDuration::days(7),
        }
    }
}

#[async_trait]
pub trait RankingService: Send + Sync {
    /// Compute a fresh ranking and replace the stored snapshot.
    async fn top_n(&self) -> Result<()>;

    async fn get_top_n(&self) -> Result<Vec<ContentItem>>;
}

pub struct BatchRankingService {
    content: Arc<dyn ContentService>,
    interactions: Arc<dyn InteractionService>,
    repository: Arc<dyn RankingRepository>,
    config: RankingConfig,
}

impl BatchRankingService {
    pub fn new(
        content: Arc<dyn ContentService>,
        interactions: Arc<dyn InteractionService>,
        repository: Arc<dyn RankingRepository>,
        config: RankingConfig,
    ) -> Self {
        Self {
            content,
            interactions,
            repository,
            config,
        }
    }

    /// Rank everything updated inside the window ending at `start`.
    ///
    /// Paging stops at the first short page, or at the first page reaching
    /// back past the window. Items older than the window are never ranked.
    pub async fn compute_top_n(&self, start: DateTime<Utc>) -> Result<Vec<ContentItem>> {
        let cutoff = start - self.config.window;
        let start_ms = start.timestamp_millis();
        let cutoff_ms = cutoff.timestamp_millis();

        let mut top = TopN::new(self.config.top_n);
        let mut offset = 0;

        loop {
            let batch = self
                .content
                .list_published(cutoff, offset, self.config.batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }

            let ids: Vec<i64> = batch.iter().map(|item| item.id).collect();
            let counts = self.interactions.get_counts_by_ids(BIZ_ARTICLE, &ids).await?;

            let fetched = batch.len();
            let mut oldest = i64::MAX;
            for item in batch {
                oldest = oldest.min(item.utime);
                if item.utime < cutoff_ms {
                    continue;
                }

                let likes = counts.get(&item.id).map_or(0, |c| c.like_cnt);
                let age_secs = (start_ms - item.utime) as f64 / 1000.0;
                top.push(score(likes, age_secs), item);
            }

            debug!(offset, fetched, kept = top.len(), "Ranked content page");
            offset += fetched;

            if fetched < self.config.batch_size || oldest < cutoff_ms {
                break;
            }
        }

        Ok(top.into_sorted_desc().into_iter().map(|(_, item)| item).collect())
    }
}

#[async_trait]
impl RankingService for BatchRankingService {
    async fn top_n(&self) -> Result<()> {
        let started = Instant::now();
        let items = self.compute_top_n(Utc::now()).await?;
        let ranked = items.len();

        self.repository.replace_top_n(items).await?;

        info!(
            ranked,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Ranking snapshot replaced"
        );
        Ok(())
    }

    async fn get_top_n(&self) -> Result<Vec<ContentItem>> {
        self.repository.get_top_n().await
    }
}
