//! Evaluation errors for the measure engine and runner

use crate::lineage::RunId;
use thiserror::Error;
use vbc_quality_diagnostics::{
    Diagnostic, ErrorCode, QM0100, QM0101, QM0200, QM0201, QM0202, QM0300, QM0301, QM0306, QM0400,
    QM0401, QM0402, QM0403, QM0500, QM0501, QM0502, QM0503,
};
use vbc_quality_measures::MeasureError;
use vbc_quality_model::FactStoreError;

/// Result type for evaluation operations
pub type EvalResult<T> = Result<T, EvalError>;

/// Errors that can occur while evaluating measures or driving runs
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    /// Code set name/version not registered
    #[error("Unknown code set: {reference}")]
    UnknownCodeSet { reference: String },

    /// Measure id/version not registered or not effective
    #[error("Unknown measure definition: {id}")]
    UnknownMeasureDefinition { id: String },

    /// Lab value that does not parse as a decimal
    #[error("Malformed clinical value '{raw}' in {event_id}")]
    MalformedClinicalValue { event_id: String, raw: String },

    /// Facts or registries changed underneath a run
    #[error("Inconsistent snapshot: {message}")]
    InconsistentSnapshot { message: String },

    /// A definition could not be evaluated
    #[error("Evaluation of {measure_id} failed: {message}")]
    DefinitionEvaluationFailure { measure_id: String, message: String },

    /// A filter referenced a code set that was not pinned for the run
    #[error("Code set {reference} is not pinned for this evaluation")]
    CodeSetNotPinned { reference: String },

    #[error(transparent)]
    Registry(#[from] MeasureError),

    #[error(transparent)]
    FactStore(#[from] FactStoreError),

    #[error("Run {0} was cancelled")]
    Cancelled(RunId),

    #[error("Invalid run transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    #[error("Run {0} has not been published")]
    RunNotPublished(RunId),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {message}")]
    Io { message: String },

    #[error("Internal evaluation error: {message}")]
    Internal { message: String },
}

impl EvalError {
    pub fn unknown_code_set(reference: impl ToString) -> Self {
        Self::UnknownCodeSet {
            reference: reference.to_string(),
        }
    }

    pub fn unknown_measure(id: impl Into<String>) -> Self {
        Self::UnknownMeasureDefinition { id: id.into() }
    }

    pub fn malformed_value(event_id: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::MalformedClinicalValue {
            event_id: event_id.into(),
            raw: raw.into(),
        }
    }

    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::InconsistentSnapshot {
            message: message.into(),
        }
    }

    pub fn definition_failure(measure_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DefinitionEvaluationFailure {
            measure_id: measure_id.into(),
            message: message.into(),
        }
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Failures worth retrying: transient fact store outages only
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::FactStore(e) if e.is_transient())
    }

    /// Fatal to the whole run rather than to one measure
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Self::InconsistentSnapshot { .. }
                | Self::FactStore(_)
                | Self::Cancelled(_)
                | Self::InvalidTransition { .. }
                | Self::Internal { .. }
        )
    }

    /// Structured error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownCodeSet { .. } => QM0100,
            Self::UnknownMeasureDefinition { .. } => QM0101,
            Self::MalformedClinicalValue { .. } => QM0201,
            Self::InconsistentSnapshot { .. } => QM0301,
            Self::DefinitionEvaluationFailure { .. } => QM0200,
            Self::CodeSetNotPinned { .. } => QM0202,
            Self::Registry(e) => e.code(),
            Self::FactStore(FactStoreError::DuplicateIdentifier { .. }) => QM0306,
            Self::FactStore(FactStoreError::Io(_)) => QM0501,
            Self::FactStore(FactStoreError::Parse(_)) => QM0503,
            Self::FactStore(_) => QM0300,
            Self::Cancelled(_) => QM0400,
            Self::InvalidTransition { .. } => QM0401,
            Self::RunNotFound(_) => QM0402,
            Self::RunNotPublished(_) => QM0403,
            Self::Config { .. } => QM0502,
            Self::Io { .. } => QM0501,
            Self::Internal { .. } => QM0500,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.code(), self.to_string())
    }
}

/// Registry lookups surface with the evaluation error kinds
pub(crate) fn registry_error(err: MeasureError) -> EvalError {
    match err {
        MeasureError::UnknownCodeSet { name, version } => EvalError::UnknownCodeSet {
            reference: match version {
                Some(version) => format!("{name}@{version}"),
                None => name,
            },
        },
        MeasureError::UnknownMeasureDefinition { id, .. } => EvalError::unknown_measure(id),
        other => EvalError::Registry(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vbc_quality_diagnostics::{Severity, QM0103};

    #[test]
    fn test_only_transient_store_errors_retry() {
        assert!(EvalError::from(FactStoreError::transient("timeout")).is_transient());
        assert!(!EvalError::from(FactStoreError::permanent("gone")).is_transient());
        assert!(!EvalError::definition_failure("M", "boom").is_transient());
    }

    #[test]
    fn test_registry_errors_map_to_eval_kinds() {
        let err = registry_error(MeasureError::unknown_code_set("a1c", Some("2024".into())));
        assert!(matches!(err, EvalError::UnknownCodeSet { ref reference } if reference == "a1c@2024"));
        assert_eq!(err.code(), QM0100);

        let err = registry_error(MeasureError::malformed("M", "bad"));
        assert_eq!(err.code(), QM0103);
    }

    #[test]
    fn test_diagnostic() {
        let diagnostic = EvalError::inconsistent("version moved").to_diagnostic();
        assert_eq!(diagnostic.severity, Severity::Error);
        assert_eq!(diagnostic.code, QM0301);
    }

    #[test]
    fn test_fatality() {
        assert!(EvalError::inconsistent("x").is_run_fatal());
        assert!(!EvalError::unknown_code_set("x@1").is_run_fatal());
        assert!(!EvalError::definition_failure("M", "x").is_run_fatal());
    }
}
