//! Registry errors

use thiserror::Error;
use vbc_quality_diagnostics::{
    Diagnostic, ErrorCode, QM0100, QM0101, QM0102, QM0103, QM0104, QM0501, QM0503,
};

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, MeasureError>;

/// Errors raised by the code set and measure definition registries
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeasureError {
    /// No code set with this name, or not at this version
    #[error("Unknown code set: {name}{}", version_suffix(.version))]
    UnknownCodeSet {
        name: String,
        version: Option<String>,
    },

    /// No measure definition with this id, or not at this version
    #[error("Unknown measure definition: {id}{}", version_suffix(.version))]
    UnknownMeasureDefinition { id: String, version: Option<u32> },

    /// An existing name and version republished with different content
    #[error("{kind} {id} version {version} is already published with different content")]
    ConflictingPublication {
        kind: String,
        id: String,
        version: String,
    },

    /// Structurally invalid definition or code set
    #[error("Malformed definition {id}: {message}")]
    MalformedDefinition { id: String, message: String },

    /// Definition exists but is not effective on the requested date
    #[error("Measure {id} version {version} is not effective on {date}")]
    NotEffective {
        id: String,
        version: u32,
        date: chrono::NaiveDate,
    },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

fn version_suffix<T: std::fmt::Display>(version: &Option<T>) -> String {
    version
        .as_ref()
        .map(|v| format!(" version {v}"))
        .unwrap_or_default()
}

impl MeasureError {
    pub fn unknown_code_set(name: impl Into<String>, version: Option<String>) -> Self {
        Self::UnknownCodeSet {
            name: name.into(),
            version,
        }
    }

    pub fn unknown_measure(id: impl Into<String>, version: Option<u32>) -> Self {
        Self::UnknownMeasureDefinition {
            id: id.into(),
            version,
        }
    }

    pub fn malformed(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedDefinition {
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn conflicting(
        kind: impl Into<String>,
        id: impl Into<String>,
        version: impl ToString,
    ) -> Self {
        Self::ConflictingPublication {
            kind: kind.into(),
            id: id.into(),
            version: version.to_string(),
        }
    }

    /// Structured error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownCodeSet { .. } => QM0100,
            Self::UnknownMeasureDefinition { .. } => QM0101,
            Self::ConflictingPublication { .. } => QM0102,
            Self::MalformedDefinition { .. } => QM0103,
            Self::NotEffective { .. } => QM0104,
            Self::Io(_) => QM0501,
            Self::Parse(_) => QM0503,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.code(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_include_version() {
        let err = MeasureError::unknown_code_set("mammography", Some("2024".into()));
        assert_eq!(err.to_string(), "Unknown code set: mammography version 2024");

        let err = MeasureError::unknown_measure("HEDIS-BCS", None);
        assert_eq!(err.to_string(), "Unknown measure definition: HEDIS-BCS");
    }

    #[test]
    fn test_codes() {
        assert_eq!(MeasureError::unknown_measure("x", Some(2)).code(), QM0101);
        assert_eq!(MeasureError::malformed("x", "y").to_diagnostic().code, QM0103);
    }
}
