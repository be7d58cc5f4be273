use std::time::Duration;

/// Pause between two iterations of one virtual user.
pub const DEFAULT_THINK_TIME: Duration = Duration::from_secs(1);

/// Upper bound on a single request, connect through body.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long in-flight iterations may run once the run stops or is cancelled.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Reconciliation cadence of the ramp scheduler.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Longest duration a configuration may name, for a single value or a whole
/// profile. Anything longer cannot be scheduled against the monotonic clock.
pub const MAX_DURATION: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Status code a call must return to pass, unless the scenario overrides it.
pub const DEFAULT_EXPECTED_STATUS: u16 = 200;

/// The trend set the stock scenarios are reported with: med, p(95), p(97), p(98), p(99.9).
pub const DEFAULT_PERCENTILES: [f64; 5] = [0.5, 0.95, 0.97, 0.98, 0.999];

pub const CONTENT_TYPE_JSON: &str = "application/json";
