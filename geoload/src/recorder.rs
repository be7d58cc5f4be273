use geoload_core::Sample;
use metrics_util::AtomicBucket;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(feature = "metrics")]
pub(crate) const LATENCY_METRIC: &str = "geoload_request_duration_seconds";
#[cfg(feature = "metrics")]
pub(crate) const REQUESTS_METRIC: &str = "geoload_requests_total";
#[cfg(feature = "metrics")]
pub(crate) const FAILED_METRIC: &str = "geoload_requests_failed_total";
#[cfg(feature = "metrics")]
pub(crate) const USERS_METRIC: &str = "geoload_virtual_users";

/// Append-only, process-wide sample store for one scenario.
///
/// Cloning is cheap and every clone appends into the same store. Writers never
/// take a lock; readers take a copy of everything recorded so far.
#[derive(Clone)]
pub struct SampleRecorder {
    samples: Arc<AtomicBucket<Sample>>,
    passed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
    #[cfg(feature = "metrics")]
    metrics: MetricHandles,
}

impl SampleRecorder {
    pub fn new(scenario: &str) -> Self {
        #[cfg(not(feature = "metrics"))]
        let _ = scenario;

        Self {
            samples: Arc::new(AtomicBucket::new()),
            passed: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
            #[cfg(feature = "metrics")]
            metrics: MetricHandles::new(scenario),
        }
    }

    /// Record one completed call. Called exactly once per iteration.
    pub fn record(&self, sample: Sample) {
        if sample.is_fail() {
            self.failed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.passed.fetch_add(1, Ordering::Relaxed);
        }

        #[cfg(feature = "metrics")]
        self.metrics.observe(&sample);

        self.samples.push(sample);
    }

    /// Copy of every sample recorded so far. Does not disturb writers.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.data()
    }

    /// Running `(passed, failed)` totals.
    pub fn counts(&self) -> (u64, u64) {
        (
            self.passed.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(feature = "metrics")]
#[derive(Clone)]
struct MetricHandles {
    latency: metrics::Histogram,
    requests: metrics::Counter,
    failed: metrics::Counter,
}

#[cfg(feature = "metrics")]
impl MetricHandles {
    fn new(scenario: &str) -> Self {
        metrics::describe_histogram!(
            LATENCY_METRIC,
            metrics::Unit::Seconds,
            "Duration of completed calls"
        );
        metrics::describe_counter!(REQUESTS_METRIC, "Completed calls");
        metrics::describe_counter!(FAILED_METRIC, "Completed calls classified as failed");

        let label = scenario.to_string();
        Self {
            latency: metrics::histogram!(LATENCY_METRIC, "scenario" => label.clone()),
            requests: metrics::counter!(REQUESTS_METRIC, "scenario" => label.clone()),
            failed: metrics::counter!(FAILED_METRIC, "scenario" => label),
        }
    }

    fn observe(&self, sample: &Sample) {
        self.latency.record(sample.duration.as_secs_f64());
        self.requests.increment(1);
        if sample.is_fail() {
            self.failed.increment(1);
        }
    }
}
