//! Ranking cache warm-up
//!
//! Copies the shared ranking snapshot into the process-local tier on every
//! run, so instances that never lead follow the leader's latest ranking
//! instead of serving their first copy until it expires.

use job_scheduler::LocalFuncExecutor;
use std::sync::Arc;
use tracing::{debug, info};

use crate::repository::CachedRankingRepository;

pub fn register_cache_warmer(
    local: &mut LocalFuncExecutor,
    job_name: &str,
    repository: Arc<CachedRankingRepository>,
) {
    local.register_func(job_name, move |ctx, job| {
        let repository = repository.clone();
        async move {
            match repository.refresh_local().await {
                Ok(items) => {
                    info!(
                        job_id = job.id,
                        correlation_id = %ctx.correlation_id,
                        items,
                        "Ranking cache warmed"
                    );
                    Ok(())
                }
                Err(e) if e.is_cache_miss() => {
                    debug!(job_id = job.id, "No ranking snapshot to warm yet");
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
    });
}
