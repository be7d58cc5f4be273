#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod error;
mod outcome;
pub(crate) mod population;
mod recorder;
mod report;
mod request;
pub mod scenario;
mod signal;
pub(crate) mod timer;
pub(crate) mod user;

pub use error::Error;
pub use geoload_core as core;
pub use outcome::{check, CallError, CallResult};
pub use recorder::SampleRecorder;
pub use report::Reporter;
pub use request::{RequestBuilder, RequestInstance};
pub use scenario::Scenario;
pub use signal::{cancellation, CancelToken, Canceller};

pub mod prelude {
    pub use crate::scenario::Scenario;
    pub use crate::signal::{cancellation, CancelToken, Canceller};
    pub use geoload_core::{
        Encoding, Expectation, Method, Percentile, RampProfile, RequestTemplate, RunConfig,
        RunStatistics, ScenarioConfig, Stage,
    };
}
