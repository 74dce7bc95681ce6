//! Core domain types for cloudperf
//!
//! This crate defines the vocabulary shared by every other crate in the
//! workspace: backend kinds, transfer operations, per-test results and the
//! closed error-code taxonomy used when reporting failures.

pub mod error_code;
pub mod types;

// Re-export commonly used types at the crate root
pub use error_code::{classify, classify_message, classify_response, ErrorCode};
pub use types::{BackendKind, Operation, ParseError, TestResult, MIB};
