use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::{AppError, Result};
use crate::models::{ContentItem, ContentStatus};
use crate::services::ContentService;

#[derive(Debug, sqlx::FromRow)]
struct PublishedArticleRow {
    id: i64,
    title: String,
    content: String,
    author_id: i64,
    status: i16,
    utime: i64,
    ctime: i64,
}

impl TryFrom<PublishedArticleRow> for ContentItem {
    type Error = AppError;

    fn try_from(row: PublishedArticleRow) -> Result<Self> {
        Ok(ContentItem {
            id: row.id,
            title: row.title,
            content: row.content,
            author_id: row.author_id,
            status: ContentStatus::try_from(row.status).map_err(AppError::Internal)?,
            utime: row.utime,
            ctime: row.ctime,
        })
    }
}

/// Reads the `published_articles` table (times in epoch millis).
#[derive(Clone)]
pub struct PgContentRepository {
    pool: PgPool,
}

impl PgContentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentService for PgContentRepository {
    async fn list_published(
        &self,
        since: DateTime<Utc>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ContentItem>> {
        let rows = sqlx::query_as::<_, PublishedArticleRow>(
            r#"
            SELECT id, title, content, author_id, status, utime, ctime
            FROM published_articles
            WHERE utime >= $1 AND status = $2
            ORDER BY utime ASC, id ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(since.timestamp_millis())
        .bind(i16::from(ContentStatus::Published))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ContentItem::try_from).collect()
    }
}
