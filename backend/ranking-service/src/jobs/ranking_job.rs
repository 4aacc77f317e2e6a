use async_trait::async_trait;
use job_scheduler::{ExecutionContext, Executor, Job};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::AppError;
use crate::services::{LeaderCoordinator, RankingService};

/// How ranking passes are coordinated across the fleet.
pub enum Coordination {
    /// Only the holder of the fleet lease computes
    Fleet(LeaderCoordinator),
    /// Every dispatch computes; for single-instance deployments
    Local,
}

/// Executor computing the hot-content ranking.
pub struct RankingJob {
    service: Arc<dyn RankingService>,
    timeout: Duration,
    coordination: Coordination,
}

impl RankingJob {
    pub const NAME: &'static str = "ranking";

    pub fn new(service: Arc<dyn RankingService>, timeout: Duration, coordination: Coordination) -> Self {
        Self {
            service,
            timeout,
            coordination,
        }
    }

    /// Release the fleet lease, if this instance holds it.
    pub async fn close(&self) -> crate::error::Result<()> {
        if let Coordination::Fleet(leader) = &self.coordination {
            leader.close().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for RankingJob {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn exec(&self, ctx: &ExecutionContext, job: &Job) -> anyhow::Result<()> {
        if let Coordination::Fleet(leader) = &self.coordination {
            if !leader.ensure_leader().await {
                debug!(job_id = job.id, correlation_id = %ctx.correlation_id, "Not ranking leader, skipping");
                return Ok(());
            }
        }

        info!(job_id = job.id, correlation_id = %ctx.correlation_id, "Starting ranking pass");

        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                Err(AppError::Internal("ranking pass cancelled".to_string()).into())
            }
            result = timeout(self.timeout, self.service.top_n()) => match result {
                Ok(result) => Ok(result?),
                Err(_) => Err(AppError::Internal(format!(
                    "ranking pass exceeded {}s",
                    self.timeout.as_secs()
                ))
                .into()),
            },
        }
    }
}
