//! Process-wide tracing setup.

pub mod tracing;

pub use crate::tracing::{LogFormat, UnknownLogFormat, init};
