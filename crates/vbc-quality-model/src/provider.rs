//! Fact store trait for measure evaluation

use crate::snapshot::{FactSnapshot, SnapshotVersion};
use std::sync::Arc;

/// Result type for fact store operations
pub type FactStoreResult<T> = Result<T, FactStoreError>;

/// Trait for providing clinical facts to measure evaluation
///
/// Evaluation never queries a live store: a run acquires one immutable
/// snapshot up front and checks [`FactStore::current_version`] again before
/// publishing.
pub trait FactStore: Send + Sync {
    /// Acquire an immutable snapshot of the current state
    fn snapshot(&self) -> FactStoreResult<Arc<FactSnapshot>>;

    /// Version stamp of the current state, without materialising a snapshot
    fn current_version(&self) -> FactStoreResult<SnapshotVersion>;
}

/// Fact store error
#[derive(Debug, Clone, thiserror::Error)]
pub enum FactStoreError {
    /// The backing store could not be reached
    #[error("Fact store unavailable: {message}")]
    Unavailable { message: String, transient: bool },

    #[error("Duplicate {kind} identifier: {id}")]
    DuplicateIdentifier { kind: String, id: String },

    #[error("Patient not found: {0}")]
    PatientNotFound(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl FactStoreError {
    /// A failure worth retrying (timeouts, dropped connections)
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            transient: true,
        }
    }

    /// A failure that will not go away on retry
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            transient: false,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { transient: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_can_be_transient() {
        assert!(FactStoreError::transient("timeout").is_transient());
        assert!(!FactStoreError::permanent("gone").is_transient());
        assert!(!FactStoreError::Parse("bad".into()).is_transient());
    }
}
