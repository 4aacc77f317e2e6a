use std::env;
use std::str::FromStr;
use std::time::Duration;

use redis_lock::RetryConfig;

use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub scheduler: SchedulerSettings,
    pub ranking: RankingSettings,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub service_name: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub max_concurrent: usize,
    pub preempt_timeout: Duration,
    pub reschedule_timeout: Duration,
    pub release_timeout: Duration,
    pub lease_refresh_interval: Duration,
    pub idle_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct RankingSettings {
    /// Job row name of the local cache warm-up function
    pub warm_job_name: String,
    pub top_n: usize,
    pub batch_size: usize,
    pub window_days: i64,
    /// Execution window of one pass; also the fleet lease TTL
    pub job_timeout: Duration,
    pub lock_key: String,
    /// Acquisition retries for the fleet lease
    pub lock_retry: RetryConfig,
    /// `false` runs every instance's pass without the fleet lease
    pub coordinated: bool,
    pub local_ttl: Duration,
    pub redis_key: String,
    pub redis_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            service: ServiceConfig {
                service_name: env::var("SERVICE_NAME")
                    .unwrap_or_else(|_| "ranking-service".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .map_err(|_| AppError::Internal("DATABASE_URL must be set".to_string()))?,
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            },
            scheduler: SchedulerSettings {
                max_concurrent: parse_var("SCHEDULER_MAX_CONCURRENT", 100)?,
                preempt_timeout: Duration::from_millis(parse_var(
                    "SCHEDULER_PREEMPT_TIMEOUT_MS",
                    1000,
                )?),
                reschedule_timeout: Duration::from_millis(parse_var(
                    "SCHEDULER_RESCHEDULE_TIMEOUT_MS",
                    1000,
                )?),
                release_timeout: Duration::from_millis(parse_var(
                    "SCHEDULER_RELEASE_TIMEOUT_MS",
                    10_000,
                )?),
                lease_refresh_interval: Duration::from_secs(parse_var(
                    "SCHEDULER_LEASE_REFRESH_SECS",
                    60,
                )?),
                idle_interval: Duration::from_millis(parse_var("SCHEDULER_IDLE_INTERVAL_MS", 0)?),
            },
            ranking: RankingSettings {
                warm_job_name: env::var("RANKING_WARM_JOB_NAME")
                    .unwrap_or_else(|_| "ranking-cache-warm".to_string()),
                top_n: parse_var("RANKING_TOP_N", 100)?,
                batch_size: parse_var("RANKING_BATCH_SIZE", 100)?,
                window_days: parse_var("RANKING_WINDOW_DAYS", 7)?,
                job_timeout: Duration::from_secs(parse_var("RANKING_JOB_TIMEOUT_SECS", 30)?),
                lock_key: env::var("RANKING_LOCK_KEY")
                    .unwrap_or_else(|_| "rlock:cron:ranking-job".to_string()),
                lock_retry: retry_from_env("RANKING_LOCK_RETRY")?,
                coordinated: parse_var("RANKING_COORDINATED", true)?,
                local_ttl: Duration::from_secs(parse_var("RANKING_LOCAL_TTL_SECS", 86_400)?),
                redis_key: env::var("RANKING_REDIS_KEY")
                    .unwrap_or_else(|_| "ranking:top_n".to_string()),
                redis_ttl: Duration::from_secs(parse_var("RANKING_REDIS_TTL_SECS", 86_400)?),
            },
        })
    }
}

/// Retry policy read from `{prefix}_MAX`, `{prefix}_INTERVAL_US`,
/// `{prefix}_MULTIPLIER`, `{prefix}_MAX_BACKOFF_MS` and `{prefix}_JITTER`.
/// Unset, it retries three times at a fixed 100µs without jitter.
fn retry_from_env(prefix: &str) -> Result<RetryConfig> {
    let max_retries = parse_var(&format!("{}_MAX", prefix), 3)?;
    let interval = Duration::from_micros(parse_var(&format!("{}_INTERVAL_US", prefix), 100)?);
    let multiplier: f64 = parse_var(&format!("{}_MULTIPLIER", prefix), 1.0)?;
    if !multiplier.is_finite() || multiplier < 1.0 {
        return Err(AppError::Internal(format!(
            "{}_MULTIPLIER must be at least 1.0, got {}",
            prefix, multiplier
        )));
    }
    let max_backoff = match env::var(format!("{}_MAX_BACKOFF_MS", prefix)) {
        Ok(_) => Duration::from_millis(parse_var(&format!("{}_MAX_BACKOFF_MS", prefix), 0)?),
        Err(_) => interval,
    };

    Ok(RetryConfig {
        max_retries,
        initial_backoff: interval,
        max_backoff: max_backoff.max(interval),
        backoff_multiplier: multiplier,
        jitter: parse_var(&format!("{}_JITTER", prefix), false)?,
    })
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Internal(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_default_when_unset() {
        let value: usize = parse_var("RANKING_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        env::set_var("RANKING_TEST_GARBAGE_VARIABLE", "not-a-number");
        let result: Result<u64> = parse_var("RANKING_TEST_GARBAGE_VARIABLE", 1);
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[test]
    fn test_lock_retry_defaults_to_fixed_interval() {
        let retry = retry_from_env("RANKING_TEST_UNSET_RETRY").unwrap();

        assert_eq!(retry.max_retries, 3);
        assert!(!retry.jitter);
        assert_eq!(retry.backoff(0), Some(Duration::from_micros(100)));
        assert_eq!(retry.backoff(2), Some(Duration::from_micros(100)));
        assert_eq!(retry.backoff(3), None);
    }

    #[test]
    fn test_lock_retry_exponential_from_env() {
        env::set_var("RANKING_TEST_EXP_RETRY_MAX", "5");
        env::set_var("RANKING_TEST_EXP_RETRY_INTERVAL_US", "1000");
        env::set_var("RANKING_TEST_EXP_RETRY_MULTIPLIER", "2.0");
        env::set_var("RANKING_TEST_EXP_RETRY_MAX_BACKOFF_MS", "3");

        let retry = retry_from_env("RANKING_TEST_EXP_RETRY").unwrap();

        assert_eq!(retry.backoff(0), Some(Duration::from_millis(1)));
        assert_eq!(retry.backoff(1), Some(Duration::from_millis(2)));
        assert_eq!(retry.backoff(2), Some(Duration::from_millis(3)));
        assert_eq!(retry.backoff(5), None);
    }

    #[test]
    fn test_lock_retry_rejects_shrinking_multiplier() {
        env::set_var("RANKING_TEST_BAD_RETRY_MULTIPLIER", "0.5");
        let result = retry_from_env("RANKING_TEST_BAD_RETRY");
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[test]
    fn test_parse_var_bool() {
        env::set_var("RANKING_TEST_BOOL_VARIABLE", "false");
        let value: bool = parse_var("RANKING_TEST_BOOL_VARIABLE", true).unwrap();
        assert!(!value);
    }
}
