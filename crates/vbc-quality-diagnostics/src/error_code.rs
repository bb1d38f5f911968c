//! Quality measure error codes following a structured numbering system
//!
//! Error code ranges:
//! - QM0100-QM0199: Registry errors (code sets, measure definitions)
//! - QM0200-QM0299: Evaluation errors (predicates, clinical values)
//! - QM0300-QM0399: Fact data errors (fact store access, data quality)
//! - QM0400-QM0499: Run errors (lifecycle, consistency)
//! - QM0500-QM0599: System errors (I/O, configuration)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Error code identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode(u16);

impl ErrorCode {
    /// Create a new error code
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Get the numeric code
    pub const fn code(&self) -> u16 {
        self.0
    }

    /// Get error information for this code
    pub fn info(&self) -> &'static ErrorInfo {
        ERROR_INFO.get(&self.0).unwrap_or(&UNKNOWN_ERROR)
    }

    pub const fn is_registry_error(&self) -> bool {
        self.0 >= 100 && self.0 < 200
    }

    pub const fn is_evaluation_error(&self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    pub const fn is_fact_error(&self) -> bool {
        self.0 >= 300 && self.0 < 400
    }

    pub const fn is_run_error(&self) -> bool {
        self.0 >= 400 && self.0 < 500
    }

    pub const fn is_system_error(&self) -> bool {
        self.0 >= 500 && self.0 < 600
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QM{:04}", self.0)
    }
}

/// Information about an error code
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Short description of the error
    pub description: &'static str,
    /// Detailed help text
    pub help: Option<&'static str>,
}

impl ErrorInfo {
    const fn new(description: &'static str) -> Self {
        Self {
            description,
            help: None,
        }
    }

    const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

static UNKNOWN_ERROR: ErrorInfo = ErrorInfo::new("Unknown error");

static ERROR_INFO: LazyLock<HashMap<u16, ErrorInfo>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    // Registry errors (0100-0199)
    map.insert(100, ErrorInfo::new("Unknown code set")
        .with_help("Publish the code set version before referencing it from a measure"));
    map.insert(101, ErrorInfo::new("Unknown measure definition"));
    map.insert(102, ErrorInfo::new("Conflicting republication")
        .with_help("Published versions are immutable; publish a new version instead"));
    map.insert(103, ErrorInfo::new("Malformed measure definition"));
    map.insert(104, ErrorInfo::new("Measure not effective for period"));

    // Evaluation errors (0200-0299)
    map.insert(200, ErrorInfo::new("Definition evaluation failure"));
    map.insert(201, ErrorInfo::new("Malformed clinical value")
        .with_help("The value was excluded from evidence; it was neither passed nor failed"));
    map.insert(202, ErrorInfo::new("Code set not pinned for run"));

    // Fact data errors (0300-0399)
    map.insert(300, ErrorInfo::new("Fact store unavailable"));
    map.insert(301, ErrorInfo::new("Inconsistent snapshot")
        .with_help("Fact store or registry changed during the run; trigger a new run"));
    map.insert(302, ErrorInfo::new("Orphaned clinical event"));
    map.insert(303, ErrorInfo::new("Implausible birth date"));
    map.insert(304, ErrorInfo::new("Invalid code format"));
    map.insert(305, ErrorInfo::new("Implausible length of stay"));
    map.insert(306, ErrorInfo::new("Duplicate identifier"));

    // Run errors (0400-0499)
    map.insert(400, ErrorInfo::new("Run cancelled"));
    map.insert(401, ErrorInfo::new("Invalid run state transition"));
    map.insert(402, ErrorInfo::new("Run not found"));
    map.insert(403, ErrorInfo::new("Run not published"));

    // System errors (0500-0599)
    map.insert(500, ErrorInfo::new("Internal error"));
    map.insert(501, ErrorInfo::new("I/O error"));
    map.insert(502, ErrorInfo::new("Configuration error"));
    map.insert(503, ErrorInfo::new("Invalid format"));

    map
});

// Registry errors
pub const QM0100: ErrorCode = ErrorCode::new(100);
pub const QM0101: ErrorCode = ErrorCode::new(101);
pub const QM0102: ErrorCode = ErrorCode::new(102);
pub const QM0103: ErrorCode = ErrorCode::new(103);
pub const QM0104: ErrorCode = ErrorCode::new(104);

// Evaluation errors
pub const QM0200: ErrorCode = ErrorCode::new(200);
pub const QM0201: ErrorCode = ErrorCode::new(201);
pub const QM0202: ErrorCode = ErrorCode::new(202);

// Fact data errors
pub const QM0300: ErrorCode = ErrorCode::new(300);
pub const QM0301: ErrorCode = ErrorCode::new(301);
pub const QM0302: ErrorCode = ErrorCode::new(302);
pub const QM0303: ErrorCode = ErrorCode::new(303);
pub const QM0304: ErrorCode = ErrorCode::new(304);
pub const QM0305: ErrorCode = ErrorCode::new(305);
pub const QM0306: ErrorCode = ErrorCode::new(306);

// Run errors
pub const QM0400: ErrorCode = ErrorCode::new(400);
pub const QM0401: ErrorCode = ErrorCode::new(401);
pub const QM0402: ErrorCode = ErrorCode::new(402);
pub const QM0403: ErrorCode = ErrorCode::new(403);

// System errors
pub const QM0500: ErrorCode = ErrorCode::new(500);
pub const QM0501: ErrorCode = ErrorCode::new(501);
pub const QM0502: ErrorCode = ErrorCode::new(502);
pub const QM0503: ErrorCode = ErrorCode::new(503);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(QM0100.to_string(), "QM0100");
        assert_eq!(QM0301.to_string(), "QM0301");
    }

    #[test]
    fn test_error_categories() {
        assert!(QM0100.is_registry_error());
        assert!(!QM0100.is_evaluation_error());

        assert!(QM0201.is_evaluation_error());
        assert!(QM0302.is_fact_error());
        assert!(QM0400.is_run_error());
        assert!(QM0502.is_system_error());
    }

    #[test]
    fn test_error_info() {
        assert_eq!(QM0201.info().description, "Malformed clinical value");
        assert!(QM0301.info().help.is_some());
        assert_eq!(ErrorCode::new(999).info().description, "Unknown error");
    }
}
