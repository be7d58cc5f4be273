use geoload_core::{Expectation, FailReason, Outcome};

/// Why a call produced no response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    Timeout,
    Connect(String),
    Transport(String),
}

impl From<reqwest::Error> for CallError {
    fn from(err: reqwest::Error) -> Self {
        // A connect timeout reports both; the timeout wins.
        if err.is_timeout() {
            CallError::Timeout
        } else if err.is_connect() {
            CallError::Connect(err.to_string())
        } else {
            CallError::Transport(err.to_string())
        }
    }
}

/// Status code of a completed exchange, or the reason there was none.
pub type CallResult = Result<u16, CallError>;

/// Classify one call against the scenario's expectation.
pub fn check(expect: &Expectation, result: &CallResult) -> Outcome {
    match result {
        Ok(status) if *status == expect.status => Outcome::Pass,
        Ok(status) => Outcome::Fail(FailReason::UnexpectedStatus {
            expected: expect.status,
            actual: *status,
        }),
        Err(CallError::Timeout) => Outcome::Fail(FailReason::Timeout),
        Err(CallError::Connect(msg)) => Outcome::Fail(FailReason::Connect(msg.clone())),
        Err(CallError::Transport(msg)) => Outcome::Fail(FailReason::Transport(msg.clone())),
    }
}
