//! Value-based care quality measures for Rust
//!
//! This crate bundles the quality measure engine:
//! - Clinical facts: patients, encounters, diagnoses, procedures, labs
//! - Versioned code sets and declarative measure definitions
//! - Denominator and numerator evaluation with audit lineage
//! - Run orchestration and the `QualityService` API
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vbc_quality::{EngineConfig, FactBundle, InMemoryFactStore, MeasurementPeriod, QualityService};
//!
//! let store = InMemoryFactStore::from_bundle(FactBundle::from_file("facts.json")?)?;
//! let service = QualityService::with_builtins(Arc::new(store), EngineConfig::default())?;
//! service.run_now(MeasurementPeriod::calendar_year(2025)?, None)?;
//! let detail = service.get_measure("HEDIS-DM-A1C")?;
//! ```

// Re-export all public APIs from internal crates
pub use vbc_quality_diagnostics as diagnostics;
pub use vbc_quality_eval as eval;
pub use vbc_quality_measures as measures;
pub use vbc_quality_model as model;
pub use vbc_quality_types as types;

// Convenience re-exports
pub use vbc_quality_diagnostics::{Diagnostic, QualityError};
pub use vbc_quality_eval::{
    EngineConfig, EvalError, MeasureResult, QualityService, RunId, RunState, RunSummary,
};
pub use vbc_quality_measures::{CodeSetRegistry, DefinitionBundle, MeasureRegistry};
pub use vbc_quality_model::{FactBundle, FactStore, InMemoryFactStore};
pub use vbc_quality_types::{MeasurementPeriod, Patient, PatientId};

// CLI module (only available with cli feature)
#[cfg(feature = "cli")]
pub mod cli;
