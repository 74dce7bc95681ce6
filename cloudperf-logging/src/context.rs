//! Spans carrying the fields shared by every event of a test

use tracing::{info_span, Span};

/// Span wrapping one instance's test; events inside inherit `service` and `instance`
pub fn instance_span(service: &str, instance: &str) -> Span {
    info_span!("instance_test", service = %service, instance = %instance)
}

/// Span wrapping one scheduler cycle
pub fn cycle_span(cycle: u64) -> Span {
    info_span!("cycle", cycle)
}
