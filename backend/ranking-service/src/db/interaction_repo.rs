use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;

use crate::error::Result;
use crate::models::InteractionCounts;
use crate::services::InteractionService;

#[derive(Debug, sqlx::FromRow)]
struct InteractiveRow {
    biz_id: i64,
    read_cnt: i64,
    like_cnt: i64,
    collect_cnt: i64,
}

/// Reads per-item counters from the `interactives` table.
#[derive(Clone)]
pub struct PgInteractionRepository {
    pool: PgPool,
}

impl PgInteractionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InteractionService for PgInteractionRepository {
    async fn get_counts_by_ids(
        &self,
        biz: &str,
        ids: &[i64],
    ) -> Result<HashMap<i64, InteractionCounts>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, InteractiveRow>(
            r#"
            SELECT biz_id, read_cnt, like_cnt, collect_cnt
            FROM interactives
            WHERE biz = $1 AND biz_id = ANY($2)
            "#,
        )
        .bind(biz)
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.biz_id,
                    InteractionCounts {
                        biz_id: row.biz_id,
                        read_cnt: row.read_cnt,
                        like_cnt: row.like_cnt,
                        collect_cnt: row.collect_cnt,
                    },
                )
            })
            .collect())
    }
}
