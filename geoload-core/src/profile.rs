use std::time::Duration;

/// One leg of a ramp profile: reach `target` virtual users over `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

/// Time-ordered target-concurrency schedule.
///
/// Each stage linearly interpolates from the previous stage's target (or the
/// starting level for the first stage) to its own target. A profile always has
/// at least one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RampProfile {
    start_target: u32,
    stages: Vec<Stage>,
}

impl RampProfile {
    /// Build a profile ramping from `start_target`. Returns `None` for an empty stage list.
    pub fn new(start_target: u32, stages: Vec<Stage>) -> Option<Self> {
        if stages.is_empty() {
            None
        } else {
            Some(Self {
                start_target,
                stages,
            })
        }
    }

    /// Holds `target` for `duration`.
    pub fn constant(duration: Duration, target: u32) -> Self {
        Self {
            start_target: target,
            stages: vec![Stage::new(duration, target)],
        }
    }

    pub fn start_target(&self) -> u32 {
        self.start_target
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Sum of all stage durations.
    /// Sum of all stage durations, saturating at [`Duration::MAX`].
    pub fn total_duration(&self) -> Duration {
        self.checked_total_duration().unwrap_or(Duration::MAX)
    }

    /// Sum of all stage durations, or `None` if it overflows.
    pub fn checked_total_duration(&self) -> Option<Duration> {
        self.stages
            .iter()
            .try_fold(Duration::ZERO, |total, stage| total.checked_add(stage.duration))
    }

    pub fn peak_target(&self) -> u32 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start_target, u32::max)
    }

    /// Desired population `elapsed` into the run.
    ///
    /// Exactly on a stage boundary the result is that stage's target. Past the
    /// end of the profile the last target is held.
    pub fn target_at(&self, elapsed: Duration) -> u32 {
        let mut from = self.start_target;
        let mut stage_start = Duration::ZERO;

        for stage in &self.stages {
            let stage_end = stage_start.saturating_add(stage.duration);

            if elapsed == stage_end {
                return stage.target;
            }

            if elapsed < stage_end {
                let progress =
                    (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                return interpolate(from, stage.target, progress);
            }

            from = stage.target;
            stage_start = stage_end;
        }

        from
    }
}

fn interpolate(from: u32, to: u32, progress: f64) -> u32 {
    let from = from as f64;
    let to = to as f64;
    let level = from + (to - from) * progress.clamp(0., 1.);
    level.round() as u32
}
