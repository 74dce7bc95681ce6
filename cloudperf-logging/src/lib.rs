//! Structured logging for cloudperf
//!
//! Every crate in the workspace logs through `tracing`. This crate installs
//! the global subscriber from [`LoggingConfig`] and provides the spans that
//! attach `service` and `instance` fields to everything logged during a test.

pub mod context;
pub mod init;

pub use cloudperf_config::{LogFormat, LogLevel, LoggingConfig};
pub use context::{cycle_span, instance_span};
pub use init::{build_filter, init_logging, init_simple_tracing};
