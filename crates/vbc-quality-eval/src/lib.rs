//! Quality Measure Evaluation Engine
//!
//! This crate evaluates versioned measure definitions against immutable fact
//! snapshots and publishes lineage-tagged results:
//!
//! - **Eligibility**: denominator predicates over demographics and coded events
//! - **Achievement**: numerator criteria with deterministic evidence selection
//! - **Lineage**: every row stamped with definition, code set, snapshot and
//!   engine versions
//! - **Runner**: the run state machine, batching, cancellation and retries
//! - **Service**: listings, aggregates and asynchronous run triggering
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vbc_quality_eval::{EngineConfig, QualityService};
//! use vbc_quality_model::InMemoryFactStore;
//! use vbc_quality_types::MeasurementPeriod;
//!
//! let store = Arc::new(InMemoryFactStore::from_bundle(bundle)?);
//! let service = QualityService::with_builtins(store, EngineConfig::default())?;
//! let summary = service.run_now(MeasurementPeriod::calendar_year(2025)?, None)?;
//! ```
//!
//! # Architecture
//!
//! - `engine`: stateless predicate interpreter, one patient at a time
//! - `context`: the snapshot, pinned code sets and period a definition sees
//! - `runner`: drives runs and records them in the append-only `RunLedger`
//! - `service`: the `QualityService` facade over the runner

pub mod achievement;
pub mod config;
pub mod context;
pub mod eligibility;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod lineage;
pub mod run;
pub mod runner;
pub mod service;

// Re-export main types
pub use achievement::{evaluate_numerator, MalformedValue, NumeratorOutcome};
pub use config::EngineConfig;
pub use context::{EvaluationContext, PinnedCodeSets};
pub use eligibility::evaluate_denominator;
pub use engine::{evaluate_patient, filter_matches, predicate_holds, PatientOutcome};
pub use error::{EvalError, EvalResult};
pub use ledger::{PinnedMeasure, RunInputs, RunLedger};
pub use lineage::{Evidence, Lineage, LineageRecorder, MeasureResult, RunId};
pub use run::{
    CancellationToken, FailedMeasure, MeasureRunSummary, PinnedMeasureRef, RunManifest,
    RunRequest, RunState, RunSummary,
};
pub use runner::{MeasureRunner, ReproductionReport};
pub use service::{
    rate, AdditionalInfo, MeasureAggregate, MeasureDetail, MeasureSummary, PatientMeasureRow,
    QualityService,
};
