use chrono::Duration as ChronoDuration;
use job_scheduler::{
    ExecutorRegistry, JobError, LeaseManager, LocalFuncExecutor, Scheduler, SchedulerConfig,
    SchedulerMetrics, SqlxJobStore,
};
use ranking_service::{
    cache::{RankingLocalCache, RankingRedisCache},
    db::{PgContentRepository, PgInteractionRepository},
    jobs::register_cache_warmer,
    services::{LockSettings, RankingConfig},
    shutdown::install_shutdown_handler,
    BatchRankingService, CachedRankingRepository, Config, Coordination, LeaderCoordinator,
    RankingJob, RankingService,
};
use redis::aio::ConnectionManager;
use redis_lock::RedisLocker;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env()?;

    info!(
        service = %config.service.service_name,
        max_concurrent = config.scheduler.max_concurrent,
        coordinated = config.ranking.coordinated,
        "Starting ranking scheduler"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;

    let redis_client = redis::Client::open(config.redis.url.as_str())?;
    let redis_conn = ConnectionManager::new(redis_client).await?;

    let repository = Arc::new(CachedRankingRepository::new(
        RankingLocalCache::new(config.ranking.local_ttl),
        Arc::new(RankingRedisCache::new(
            redis_conn.clone(),
            config.ranking.redis_key.clone(),
            config.ranking.redis_ttl,
        )),
    ));

    let ranking: Arc<dyn RankingService> = Arc::new(BatchRankingService::new(
        Arc::new(PgContentRepository::new(pool.clone())),
        Arc::new(PgInteractionRepository::new(pool.clone())),
        repository.clone(),
        RankingConfig {
            top_n: config.ranking.top_n,
            batch_size: config.ranking.batch_size,
            window: ChronoDuration::days(config.ranking.window_days),
        },
    ));

    let coordination = if config.ranking.coordinated {
        Coordination::Fleet(LeaderCoordinator::new(
            Arc::new(RedisLocker::new(redis_conn.clone())),
            LockSettings::new(config.ranking.lock_key.clone(), config.ranking.job_timeout)
                .with_retry(config.ranking.lock_retry.clone()),
        ))
    } else {
        warn!("Ranking coordination disabled, every instance computes its own ranking");
        Coordination::Local
    };
    let ranking_job = Arc::new(RankingJob::new(
        ranking,
        config.ranking.job_timeout,
        coordination,
    ));

    let mut local = LocalFuncExecutor::new();
    register_cache_warmer(&mut local, &config.ranking.warm_job_name, repository);

    let mut registry = ExecutorRegistry::new();
    registry.register(ranking_job.clone()).register(Arc::new(local));

    let lease = LeaseManager::new(Arc::new(SqlxJobStore::new(pool)))
        .with_refresh_interval(config.scheduler.lease_refresh_interval)
        .with_release_timeout(config.scheduler.release_timeout);

    let scheduler = Scheduler::new(
        lease,
        Arc::new(registry),
        SchedulerConfig {
            max_concurrent: config.scheduler.max_concurrent,
            preempt_timeout: config.scheduler.preempt_timeout,
            reschedule_timeout: config.scheduler.reschedule_timeout,
            idle_interval: config.scheduler.idle_interval,
        },
    )
    .with_metrics(SchedulerMetrics::new(&config.service.service_name));

    let shutdown = install_shutdown_handler()?;

    match scheduler.schedule(shutdown).await {
        Ok(()) | Err(JobError::Cancelled) => info!("Scheduler stopped"),
        Err(e) => error!(error = %e, "Scheduler exited with error"),
    }

    if let Err(e) = ranking_job.close().await {
        warn!(error = %e, "Failed to release ranking lock on shutdown");
    }

    info!("Ranking scheduler shut down");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
