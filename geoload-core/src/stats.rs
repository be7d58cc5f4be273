use crate::{FailReason, Sample};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// A quantile in `(0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Percentile(f64);

impl Percentile {
    pub fn new(quantile: f64) -> Option<Self> {
        if quantile > 0. && quantile <= 1. {
            Some(Self(quantile))
        } else {
            None
        }
    }

    pub fn quantile(&self) -> f64 {
        self.0
    }

    /// `med` for the median, `p(95)`, `p(99.9)` and so on otherwise.
    pub fn label(&self) -> String {
        if self.0 == 0.5 {
            return "med".to_string();
        }
        let pct = format!("{:.3}", self.0 * 100.);
        let pct = pct.trim_end_matches('0').trim_end_matches('.');
        format!("p({pct})")
    }
}

impl fmt::Display for Percentile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl Serialize for Percentile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

/// Nearest-rank percentile over an ascending slice.
///
/// `rank = ceil(q * n)` clamped to `[1, n]`; the result is `sorted[rank - 1]`.
/// An empty slice yields zero.
pub fn nearest_rank(sorted: &[Duration], percentile: Percentile) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let n = sorted.len();
    let rank = (percentile.quantile() * n as f64).ceil() as usize;
    sorted[rank.clamp(1, n) - 1]
}

/// `failed / total`, or zero when nothing has been recorded.
pub fn error_rate(samples: &[Sample]) -> f64 {
    if samples.is_empty() {
        return 0.;
    }
    let failed = samples.iter().filter(|s| s.is_fail()).count();
    failed as f64 / samples.len() as f64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileValue {
    pub percentile: Percentile,
    #[serde(rename = "ms", serialize_with = "as_millis")]
    pub value: Duration,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LatencySummary {
    #[serde(rename = "min_ms", serialize_with = "as_millis")]
    pub min: Duration,
    #[serde(rename = "mean_ms", serialize_with = "as_millis")]
    pub mean: Duration,
    #[serde(rename = "max_ms", serialize_with = "as_millis")]
    pub max: Duration,
    pub percentiles: Vec<PercentileValue>,
}

impl LatencySummary {
    /// Latency over every completed call, passed and failed alike.
    pub fn from_samples(samples: &[Sample], percentiles: &[Percentile]) -> Self {
        let mut durations: Vec<Duration> = samples.iter().map(|s| s.duration).collect();
        durations.sort_unstable();

        let (Some(&min), Some(&max)) = (durations.first(), durations.last()) else {
            return Self {
                percentiles: percentiles
                    .iter()
                    .map(|&percentile| PercentileValue {
                        percentile,
                        value: Duration::ZERO,
                    })
                    .collect(),
                ..Default::default()
            };
        };

        let total: Duration = durations.iter().sum();
        let mean = total / durations.len() as u32;

        Self {
            min,
            mean,
            max,
            percentiles: percentiles
                .iter()
                .map(|&percentile| PercentileValue {
                    percentile,
                    value: nearest_rank(&durations, percentile),
                })
                .collect(),
        }
    }

    pub fn get(&self, percentile: f64) -> Option<Duration> {
        self.percentiles
            .iter()
            .find(|p| p.percentile.quantile() == percentile)
            .map(|p| p.value)
    }
}

/// Statistics for one scenario run, computed from a set of samples.
///
/// Used both for the final report and for in-flight snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatistics {
    pub scenario: String,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
    pub count: u64,
    pub failed: u64,
    pub error_rate: f64,
    /// Completed calls per second of elapsed run time.
    pub throughput: f64,
    pub latency: LatencySummary,
    pub users: usize,
    pub peak_users: usize,
    /// Failure counts keyed by reason category.
    pub failures: BTreeMap<String, u64>,
}

impl RunStatistics {
    pub fn compute(
        scenario: &str,
        samples: &[Sample],
        percentiles: &[Percentile],
        elapsed: Duration,
    ) -> Self {
        let count = samples.len() as u64;
        let mut failures = BTreeMap::new();
        for reason in samples.iter().filter_map(|s| s.outcome.reason()) {
            *failures.entry(category(reason)).or_insert(0) += 1;
        }
        let failed = failures.values().sum();

        let throughput = if elapsed.is_zero() {
            0.
        } else {
            count as f64 / elapsed.as_secs_f64()
        };

        Self {
            scenario: scenario.to_string(),
            elapsed,
            count,
            failed,
            error_rate: error_rate(samples),
            throughput,
            latency: LatencySummary::from_samples(samples, percentiles),
            users: 0,
            peak_users: 0,
            failures,
        }
    }

    pub fn with_users(mut self, users: usize, peak_users: usize) -> Self {
        self.users = users;
        self.peak_users = peak_users;
        self
    }
}

fn category(reason: &FailReason) -> String {
    match reason {
        FailReason::UnexpectedStatus { actual, .. } => format!("status {actual}"),
        FailReason::Timeout => "timeout".to_string(),
        FailReason::Connect(_) => "connect".to_string(),
        FailReason::Transport(_) => "transport".to_string(),
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = Duration::from_millis(self.elapsed.as_millis() as u64);
        writeln!(
            f,
            "{}: {} requests in {} ({:.2} req/s), {} failed ({:.2}%), vus={} (peak {})",
            self.scenario,
            self.count,
            humantime::format_duration(elapsed),
            self.throughput,
            self.failed,
            self.error_rate * 100.,
            self.users,
            self.peak_users,
        )?;
        write!(
            f,
            "  latency: min={:?} mean={:?} max={:?}",
            self.latency.min, self.latency.mean, self.latency.max
        )?;
        for p in &self.latency.percentiles {
            write!(f, " {}={:?}", p.percentile, p.value)?;
        }
        if !self.failures.is_empty() {
            write!(f, "\n  failures:")?;
            for (category, count) in &self.failures {
                write!(f, " {category}={count}")?;
            }
        }
        Ok(())
    }
}

fn as_millis<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_nanos() as f64 / 1e6)
}
