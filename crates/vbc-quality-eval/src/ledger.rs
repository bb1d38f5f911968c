//! Append-only record of measure runs
//!
//! Runs are never removed or rewritten once terminal. Results become visible
//! only in the same write that moves a run to `Published`, so readers see
//! either all of a run's rows or none.

use crate::context::PinnedCodeSets;
use crate::error::{EvalError, EvalResult};
use crate::lineage::{MeasureResult, RunId};
use crate::run::{RunManifest, RunRequest, RunState, RunSummary};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;
use vbc_quality_measures::MeasureDefinition;
use vbc_quality_model::FactSnapshot;
use vbc_quality_types::MeasurementPeriod;

/// One definition with everything pinned for it at run start
#[derive(Debug, Clone)]
pub struct PinnedMeasure {
    pub definition: Arc<MeasureDefinition>,
    pub code_sets: PinnedCodeSets,
    pub period: MeasurementPeriod,
}

/// Inputs kept so a published run can be re-evaluated
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub manifest: RunManifest,
    pub snapshot: Arc<FactSnapshot>,
    pub measures: Vec<PinnedMeasure>,
}

#[derive(Debug)]
struct RunRecord {
    request: RunRequest,
    created_at: DateTime<Utc>,
    state: RunState,
    inputs: Option<RunInputs>,
    summary: Option<RunSummary>,
    results: Arc<Vec<MeasureResult>>,
}

/// Ledger of all runs, in submission order
#[derive(Debug, Default)]
pub struct RunLedger {
    runs: RwLock<IndexMap<RunId, RunRecord>>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new run in `Idle`
    pub fn register(&self, run_id: RunId, request: RunRequest, created_at: DateTime<Utc>) {
        self.runs.write().insert(
            run_id,
            RunRecord {
                request,
                created_at,
                state: RunState::Idle,
                inputs: None,
                summary: None,
                results: Arc::new(Vec::new()),
            },
        );
    }

    pub fn contains(&self, run_id: RunId) -> bool {
        self.runs.read().contains_key(&run_id)
    }

    pub fn len(&self) -> usize {
        self.runs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.read().is_empty()
    }

    pub fn run_ids(&self) -> Vec<RunId> {
        self.runs.read().keys().copied().collect()
    }

    pub fn request(&self, run_id: RunId) -> EvalResult<(RunRequest, DateTime<Utc>)> {
        let runs = self.runs.read();
        let record = runs.get(&run_id).ok_or(EvalError::RunNotFound(run_id))?;
        Ok((record.request.clone(), record.created_at))
    }

    pub fn state(&self, run_id: RunId) -> EvalResult<RunState> {
        let runs = self.runs.read();
        let record = runs.get(&run_id).ok_or(EvalError::RunNotFound(run_id))?;
        Ok(record.state.clone())
    }

    /// Move a non-terminal run to `next`
    pub fn transition(&self, run_id: RunId, next: RunState) -> EvalResult<()> {
        let mut runs = self.runs.write();
        let record = runs.get_mut(&run_id).ok_or(EvalError::RunNotFound(run_id))?;
        log::debug!("Run {}: {} -> {}", run_id, record.state, next);
        record.state.advance(next)
    }

    /// Attach pinned inputs, once, while collecting facts
    pub fn pin_inputs(&self, run_id: RunId, inputs: RunInputs) -> EvalResult<()> {
        let mut runs = self.runs.write();
        let record = runs.get_mut(&run_id).ok_or(EvalError::RunNotFound(run_id))?;
        if record.state != RunState::CollectingFacts || record.inputs.is_some() {
            return Err(EvalError::internal(format!(
                "run {} cannot pin inputs while {}",
                run_id, record.state
            )));
        }
        record.inputs = Some(inputs);
        Ok(())
    }

    pub fn inputs(&self, run_id: RunId) -> EvalResult<RunInputs> {
        let runs = self.runs.read();
        let record = runs.get(&run_id).ok_or(EvalError::RunNotFound(run_id))?;
        record
            .inputs
            .clone()
            .ok_or_else(|| EvalError::internal(format!("run {} has no pinned inputs", run_id)))
    }

    /// Store results and move `Assembling -> Published` in one step
    pub fn publish(
        &self,
        run_id: RunId,
        results: Vec<MeasureResult>,
        summary: RunSummary,
    ) -> EvalResult<()> {
        let mut runs = self.runs.write();
        let record = runs.get_mut(&run_id).ok_or(EvalError::RunNotFound(run_id))?;
        record.state.advance(RunState::Published)?;
        record.results = Arc::new(results);
        record.summary = Some(summary);
        Ok(())
    }

    /// Mark a run failed; a terminal run is left untouched
    pub fn fail(&self, run_id: RunId, summary: RunSummary) -> EvalResult<()> {
        let mut runs = self.runs.write();
        let record = runs.get_mut(&run_id).ok_or(EvalError::RunNotFound(run_id))?;
        record.state.advance(summary.state.clone())?;
        record.summary = Some(summary);
        Ok(())
    }

    /// Summary of a terminal run
    pub fn summary(&self, run_id: RunId) -> EvalResult<RunSummary> {
        let runs = self.runs.read();
        let record = runs.get(&run_id).ok_or(EvalError::RunNotFound(run_id))?;
        record
            .summary
            .clone()
            .ok_or(EvalError::RunNotPublished(run_id))
    }

    /// Rows of a published run
    pub fn results(&self, run_id: RunId) -> EvalResult<Arc<Vec<MeasureResult>>> {
        let runs = self.runs.read();
        let record = runs.get(&run_id).ok_or(EvalError::RunNotFound(run_id))?;
        if record.state != RunState::Published {
            return Err(EvalError::RunNotPublished(run_id));
        }
        Ok(Arc::clone(&record.results))
    }

    /// Most recently submitted run that reached `Published`
    pub fn latest_published(&self) -> Option<RunId> {
        self.runs
            .read()
            .iter()
            .rev()
            .find(|(_, record)| record.state == RunState::Published)
            .map(|(id, _)| *id)
    }

    /// Most recent published run that produced rows for `measure_id`
    pub fn latest_published_for(&self, measure_id: &str) -> Option<RunId> {
        self.runs
            .read()
            .iter()
            .rev()
            .find(|(_, record)| {
                record.state == RunState::Published
                    && record
                        .summary
                        .as_ref()
                        .is_some_and(|s| s.succeeded_ids().any(|id| id == measure_id))
            })
            .map(|(id, _)| *id)
    }
}
