use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Fixed-cadence ticker driving the scheduler's reconciliation loop.
pub(crate) struct Timer {
    interval: Interval,
    interval_dur: Duration,
}

impl Timer {
    pub async fn new(interval_dur: Duration) -> Self {
        let mut interval = interval(interval_dur);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // NOTE: First tick completes instantly
        interval.tick().await;
        Self {
            interval,
            interval_dur,
        }
    }

    /// Wait for the next tick. A missed tick fires at once and pushes the
    /// cadence back rather than bursting.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

impl std::fmt::Display for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}", humantime::format_duration(self.interval_dur))
    }
}
