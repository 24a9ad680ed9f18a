//! Tracing/logging setup shared by every maquila binary and test harness.

pub mod subscriber;

pub use subscriber::{LogFormat, UnknownLogFormat, init, init_with};
