use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts};
use tracing::warn;

#[derive(Clone)]
pub struct SchedulerMetrics {
    pub job_duration: HistogramVec,
    pub in_flight: IntGauge,
    pub preemptions: IntCounterVec,
}

impl SchedulerMetrics {
    pub fn new(service: &str) -> Self {
        let registry = prometheus::default_registry();

        let job_duration = HistogramVec::new(
            HistogramOpts::new(
                "cron_job_duration_seconds",
                "Execution time of dispatched cron jobs",
            )
            .const_label("service", service.to_string())
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0]),
            &["job", "success"],
        )
        .expect("valid metric opts for cron_job_duration_seconds");

        let in_flight = IntGauge::with_opts(
            Opts::new(
                "cron_jobs_in_flight",
                "Number of dispatched cron jobs that have not finished",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for cron_jobs_in_flight");

        let preemptions = IntCounterVec::new(
            Opts::new(
                "cron_job_preempt_total",
                "Preemption attempts by outcome (hit, miss, error)",
            )
            .const_label("service", service.to_string()),
            &["outcome"],
        )
        .expect("valid metric opts for cron_job_preempt_total");

        for metric in [
            Box::new(job_duration.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(in_flight.clone()),
            Box::new(preemptions.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!(error = %e, "Failed to register scheduler metric");
            }
        }

        Self {
            job_duration,
            in_flight,
            preemptions,
        }
    }

    pub(crate) fn record_preempt(&self, outcome: &str) {
        self.preemptions.with_label_values(&[outcome]).inc();
    }

    pub(crate) fn observe_job(&self, job: &str, success: bool, seconds: f64) {
        self.job_duration
            .with_label_values(&[job, if success { "true" } else { "false" }])
            .observe(seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_preemptions_and_durations() {
        // A second registration under the same names only logs a warning.
        let _first = SchedulerMetrics::new("job-scheduler-test");
        let metrics = SchedulerMetrics::new("job-scheduler-test");

        metrics.record_preempt("hit");
        metrics.record_preempt("miss");
        metrics.record_preempt("miss");
        metrics.observe_job("ranking", true, 0.25);

        assert_eq!(metrics.preemptions.with_label_values(&["hit"]).get(), 1);
        assert_eq!(metrics.preemptions.with_label_values(&["miss"]).get(), 2);
        assert_eq!(
            metrics
                .job_duration
                .with_label_values(&["ranking", "true"])
                .get_sample_count(),
            1
        );
    }
}
