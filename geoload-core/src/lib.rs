//! Core types shared by the geoload engine and runtime.
//!
//! Everything in here is plain data: validated configuration, the samples
//! virtual users produce, and the statistics derived from them.
mod config;
mod constants;
mod data;
mod error;
mod profile;
mod stats;
mod template;

pub use config::*;
pub use constants::*;
pub use data::*;
pub use error::*;
pub use profile::*;
pub use stats::*;
pub use template::*;
