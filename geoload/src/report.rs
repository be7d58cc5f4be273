use crate::recorder::SampleRecorder;
use geoload_core::{Percentile, RunStatistics};
use std::time::Duration;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, info, trace};

/// Turns the recorder's samples into [`RunStatistics`], on demand and
/// periodically while a run is in progress.
#[derive(Clone)]
pub struct Reporter {
    scenario: String,
    percentiles: Vec<Percentile>,
    recorder: SampleRecorder,
    start: Instant,
    every: Option<Duration>,
    next_report: Option<Instant>,
}

impl Reporter {
    pub fn new(
        scenario: &str,
        percentiles: &[Percentile],
        recorder: SampleRecorder,
        start: Instant,
    ) -> Self {
        Self {
            scenario: scenario.to_string(),
            percentiles: percentiles.to_vec(),
            recorder,
            start,
            every: None,
            next_report: None,
        }
    }

    /// Log a snapshot every `every` of run time.
    pub fn every(mut self, every: Option<Duration>) -> Self {
        self.every = every.filter(|d| !d.is_zero());
        self.next_report = self.every.map(|d| self.start + d);
        self
    }

    /// Statistics over everything recorded so far.
    pub fn snapshot(&self, users: usize, peak_users: usize) -> RunStatistics {
        let samples = self.recorder.snapshot();
        RunStatistics::compute(
            &self.scenario,
            &samples,
            &self.percentiles,
            self.start.elapsed(),
        )
        .with_users(users, peak_users)
    }

    /// Emit a periodic snapshot if one is due. Returns whether one was logged.
    pub fn tick(&mut self, users: usize, peak_users: usize) -> bool {
        let (Some(every), Some(due)) = (self.every, self.next_report) else {
            return false;
        };

        let now = Instant::now();
        if now < due {
            return false;
        }

        let stats = self.snapshot(users, peak_users);
        info!(
            requests = stats.count,
            failed = stats.failed,
            error_rate = stats.error_rate,
            vus = users,
            "Progress\n{stats}"
        );

        // Skip missed slots rather than bursting.
        let mut next = due + every;
        while next <= now {
            next += every;
        }
        self.next_report = Some(next);
        true
    }

    /// Final statistics once every user has exited.
    pub fn finish(self, users: usize, peak_users: usize) -> RunStatistics {
        let stats = self.snapshot(users, peak_users);
        debug!("Final statistics for {}: {} samples", self.scenario, stats.count);
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoload_core::{FailReason, Outcome, Sample};

    fn recorder_with(durations_ms: &[u64], fail_every: usize) -> SampleRecorder {
        let recorder = SampleRecorder::new("report-test");
        for (i, ms) in durations_ms.iter().enumerate() {
            let outcome = if fail_every > 0 && (i + 1) % fail_every == 0 {
                Outcome::Fail(FailReason::UnexpectedStatus {
                    expected: 200,
                    actual: 500,
                })
            } else {
                Outcome::Pass
            };
            recorder.record(Sample {
                user: 0,
                iteration: i as u64,
                started_at: Duration::ZERO,
                duration: Duration::from_millis(*ms),
                outcome,
            });
        }
        recorder
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_reflects_recorder() {
        let durations: Vec<u64> = (1..=100).collect();
        let recorder = recorder_with(&durations, 10);
        let percentiles = [Percentile::new(0.5).unwrap(), Percentile::new(0.95).unwrap()];
        let reporter = Reporter::new("report-test", &percentiles, recorder, Instant::now());

        tokio::time::advance(Duration::from_secs(10)).await;
        let stats = reporter.finish(3, 5);

        assert_eq!(stats.count, 100);
        assert_eq!(stats.failed, 10);
        assert!((stats.error_rate - 0.1).abs() < 1e-9);
        assert!((stats.throughput - 10.).abs() < 1e-6);
        assert_eq!(stats.latency.get(0.5), Some(Duration::from_millis(50)));
        assert_eq!(stats.latency.get(0.95), Some(Duration::from_millis(95)));
        assert_eq!((stats.users, stats.peak_users), (3, 5));
        assert_eq!(stats.failures.get("status 500"), Some(&10));
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_ticks() {
        let recorder = recorder_with(&[5, 6, 7], 0);
        let mut reporter = Reporter::new("report-test", &[], recorder, Instant::now())
            .every(Some(Duration::from_secs(1)));

        assert!(!reporter.tick(1, 1));
        tokio::time::advance(Duration::from_millis(1001)).await;
        assert!(reporter.tick(1, 1));
        assert!(!reporter.tick(1, 1));

        // A long stall yields one report, not a burst.
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(reporter.tick(1, 1));
        assert!(!reporter.tick(1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn no_interval_never_reports() {
        let mut reporter = Reporter::new(
            "report-test",
            &[],
            SampleRecorder::new("report-test"),
            Instant::now(),
        )
        .every(None);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!reporter.tick(0, 0));
        assert_eq!(reporter.snapshot(0, 0).count, 0);
    }
}
