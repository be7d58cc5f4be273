use std::time::Duration;
use thiserror::Error;

/// Reasons a configuration is rejected at load time.
///
/// None of these are recoverable: a run whose configuration fails validation
/// never starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid duration {value:?} for `{field}`: {reason}")]
    InvalidDuration {
        field: String,
        value: String,
        reason: String,
    },

    #[error("scenario `{scenario}` stage {stage}: duration must not be negative (got {seconds}s)")]
    NegativeDuration {
        scenario: String,
        stage: usize,
        seconds: f64,
    },

    #[error("scenario `{scenario}` stage {stage}: target must not be negative (got {target})")]
    NegativeTarget {
        scenario: String,
        stage: usize,
        target: i64,
    },

    #[error("scenario `{scenario}`: target {target} is out of range")]
    TargetOutOfRange { scenario: String, target: i64 },

    #[error("scenario `{scenario}`: unknown field `{field}`")]
    UnknownField { scenario: String, field: String },

    #[error("scenario `{0}` has an empty ramp profile")]
    EmptyProfile(String),

    #[error("scenario name `{0}` is used more than once")]
    DuplicateScenario(String),

    #[error("scenario name must not be empty")]
    EmptyScenarioName,

    #[error("no scenarios configured")]
    NoScenarios,

    #[error("percentile {0} is outside (0, 1]")]
    InvalidPercentile(f64),

    #[error("invalid base url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("scenario `{scenario}`: {reason}")]
    InvalidTemplate { scenario: String, reason: String },

    #[error("scenario `{scenario}`: expected status {status} is not a valid HTTP status")]
    InvalidStatus { scenario: String, status: u16 },

    #[error("scenario `{scenario}`: poll interval {interval:?} must be non-zero")]
    ZeroPollInterval { scenario: String, interval: Duration },
}
