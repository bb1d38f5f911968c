//! Quality measure diagnostics and error reporting
//!
//! This crate provides the reporting infrastructure shared by the measure
//! registries, the evaluation engine and the run ledger: numbered error codes,
//! severities, and diagnostics attached to run summaries and data-quality
//! checks.

mod error;
mod error_code;

pub use error::*;
pub use error_code::*;

/// Result type for operations that report a single diagnostic on failure
pub type Result<T> = std::result::Result<T, QualityError>;
