use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Pass/fail classification of one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Pass,
    Fail(FailReason),
}

impl Outcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Pass)
    }

    pub fn is_fail(&self) -> bool {
        !self.is_pass()
    }

    pub fn reason(&self) -> Option<&FailReason> {
        match self {
            Outcome::Pass => None,
            Outcome::Fail(reason) => Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailReason {
    /// The target answered, but not with the expected status.
    UnexpectedStatus { expected: u16, actual: u16 },
    /// The call did not complete within the request timeout.
    Timeout,
    /// The connection could not be established (refused, DNS, TLS).
    Connect(String),
    /// Anything else that broke the exchange, including an unreadable body.
    Transport(String),
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailReason::UnexpectedStatus { expected, actual } => {
                write!(f, "expected status {expected}, got {actual}")
            }
            FailReason::Timeout => f.write_str("request timed out"),
            FailReason::Connect(msg) => write!(f, "connection failed: {msg}"),
            FailReason::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

/// One completed call, as recorded by a virtual user.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Virtual user that issued the call.
    pub user: u64,
    /// That user's iteration counter when the call was issued.
    pub iteration: u64,
    /// Offset from the start of the run at which the call was issued.
    pub started_at: Duration,
    pub duration: Duration,
    pub outcome: Outcome,
}

impl Sample {
    pub fn is_fail(&self) -> bool {
        self.outcome.is_fail()
    }
}
