/// Retry policy for lock acquisition
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Wait before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single wait
    pub max_backoff: Duration,
    /// Backoff multiplier (1.0 keeps the interval fixed)
    pub backoff_multiplier: f64,
    /// Add random jitter to backoff (±30%)
    pub jitter: bool,
}

impl RetryConfig {
    /// Same wait between every attempt, no jitter.
    pub fn fixed_interval(interval: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: interval,
            max_backoff: interval,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Wait before retry number `retry` (0-based), or `None` once retries
    /// are exhausted.
    pub fn backoff(&self, retry: u32) -> Option<Duration> {
        if retry >= self.max_retries {
            return None;
        }

        let factor = self.backoff_multiplier.powi(retry as i32);
        let base = self
            .initial_backoff
            .mul_f64(factor)
            .min(self.max_backoff);

        Some(calculate_backoff(base, self.jitter))
    }
}

fn calculate_backoff(base: Duration, jitter: bool) -> Duration {
    if jitter {
        let jitter_factor = 1.0 + rand::thread_rng().gen_range(-0.3..0.3);
        base.mul_f64(jitter_factor)
    } else {
        base
    }
}
