//! Diagnostics and the umbrella quality error type

use crate::ErrorCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Error - the affected measure or run cannot proceed
    Error,
    /// Warning - the affected record was excluded, evaluation continued
    Warning,
    /// Information - informational message
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// A diagnostic message attached to the record it concerns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity level
    pub severity: Severity,
    /// Error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Identifier of the measure, patient or event concerned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Additional context or help
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl Diagnostic {
    /// Create a new error diagnostic
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Error, code, message)
    }

    /// Create a new warning diagnostic
    pub fn warning(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Warning, code, message)
    }

    /// Create a new informational diagnostic
    pub fn info(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Info, code, message)
    }

    fn with_severity(severity: Severity, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            subject: None,
            help: code.info().help.map(str::to_string),
        }
    }

    /// Set the subject identifier
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set help text
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} - {}", self.severity, self.code, self.message)?;
        if let Some(subject) = &self.subject {
            write!(f, " [{}]", subject)?;
        }
        Ok(())
    }
}

#[cfg(feature = "colored")]
impl Diagnostic {
    /// Render with terminal colors
    pub fn to_colored_string(&self) -> String {
        use colored::Colorize;

        let severity = match self.severity {
            Severity::Error => self.severity.to_string().red().bold(),
            Severity::Warning => self.severity.to_string().yellow().bold(),
            Severity::Info => self.severity.to_string().blue().bold(),
        };
        let mut out = format!("{}: {} - {}", severity, self.code.to_string().cyan(), self.message);
        if let Some(subject) = &self.subject {
            out.push_str(&format!(" [{}]", subject));
        }
        out
    }
}

/// Umbrella error carrying a structured code
#[derive(Debug, Clone, Error)]
pub enum QualityError {
    /// Registry error (code sets, measure definitions)
    #[error("{code}: {message}")]
    Registry { code: ErrorCode, message: String },

    /// Evaluation error
    #[error("{code}: {message}")]
    Evaluation { code: ErrorCode, message: String },

    /// Fact data error
    #[error("{code}: {message}")]
    Facts { code: ErrorCode, message: String },

    /// Run lifecycle error
    #[error("{code}: {message}")]
    Run { code: ErrorCode, message: String },

    /// System error
    #[error("{code}: {message}")]
    System { code: ErrorCode, message: String },
}

impl QualityError {
    /// Build an error, choosing the variant from the code range
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        if code.is_registry_error() {
            Self::Registry { code, message }
        } else if code.is_evaluation_error() {
            Self::Evaluation { code, message }
        } else if code.is_fact_error() {
            Self::Facts { code, message }
        } else if code.is_run_error() {
            Self::Run { code, message }
        } else {
            Self::System { code, message }
        }
    }

    /// Get the error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Registry { code, .. }
            | Self::Evaluation { code, .. }
            | Self::Facts { code, .. }
            | Self::Run { code, .. }
            | Self::System { code, .. } => *code,
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::Registry { message, .. }
            | Self::Evaluation { message, .. }
            | Self::Facts { message, .. }
            | Self::Run { message, .. }
            | Self::System { message, .. } => message,
        }
    }

    /// Convert to an error diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.code(), self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{QM0100, QM0201, QM0301, QM0502};

    #[test]
    fn test_variant_from_code_range() {
        assert!(matches!(QualityError::new(QM0100, "x"), QualityError::Registry { .. }));
        assert!(matches!(QualityError::new(QM0201, "x"), QualityError::Evaluation { .. }));
        assert!(matches!(QualityError::new(QM0301, "x"), QualityError::Facts { .. }));
        assert!(matches!(QualityError::new(QM0502, "x"), QualityError::System { .. }));
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::warning(QM0201, "Lab value 'pending' is not numeric")
            .with_subject("lab-17");

        let rendered = diag.to_string();
        assert!(rendered.starts_with("warning: QM0201"));
        assert!(rendered.contains("[lab-17]"));
    }

    #[test]
    fn test_diagnostic_inherits_code_help() {
        let diag = Diagnostic::error(QM0301, "snapshot moved");
        assert_eq!(diag.help.as_deref(), QM0301.info().help);
    }

    #[test]
    fn test_diagnostic_serializes_compactly() {
        let diag = Diagnostic::info(crate::QM0400, "cancelled");
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json["severity"], "info");
        assert!(json.get("subject").is_none());
    }
}
