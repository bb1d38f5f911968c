//! Measure runner
//!
//! Drives one run through its lifecycle:
//!
//! 1. `CollectingFacts`: acquire a snapshot, select effective definitions and
//!    pin their code sets
//! 2. `Evaluating`: fan out over patients in batches, one measure at a time
//! 3. `Assembling`: confirm nothing pinned has moved, then publish atomically
//!
//! A definition that cannot be evaluated is reported and skipped; the run
//! continues with the remaining measures. Snapshot drift, cancellation and
//! persistent fact store outages fail the whole run and publish nothing.

use crate::config::EngineConfig;
use crate::context::{EvaluationContext, PinnedCodeSets};
use crate::engine::{evaluate_patient, PatientOutcome};
use crate::error::{registry_error, EvalError, EvalResult};
use crate::ledger::{PinnedMeasure, RunInputs, RunLedger};
use crate::lineage::{LineageRecorder, MeasureResult, RunId};
use crate::run::{
    CancellationToken, FailedMeasure, MeasureRunSummary, PinnedMeasureRef, RunManifest,
    RunRequest, RunState, RunSummary,
};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use vbc_quality_diagnostics::{Diagnostic, QM0201};
use vbc_quality_measures::{CodeSetRegistry, MeasureDefinition, MeasureRegistry};
use vbc_quality_model::{FactSnapshot, FactStore, FactStoreResult};
use vbc_quality_types::Patient;

/// Rows and exclusions produced for one measure
struct MeasureEvaluation {
    rows: Vec<MeasureResult>,
    warnings: Vec<Diagnostic>,
}

/// Outcome of re-evaluating a published run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReproductionReport {
    pub run_id: RunId,
    pub rows_compared: usize,
    pub identical: bool,
    /// `measure/patient` keys whose rows differ or are missing on one side
    pub mismatches: Vec<String>,
}

/// Executes measure runs against a fact store and the two registries
pub struct MeasureRunner {
    store: Arc<dyn FactStore>,
    code_sets: Arc<CodeSetRegistry>,
    measures: Arc<MeasureRegistry>,
    ledger: Arc<RunLedger>,
    config: EngineConfig,
}

impl MeasureRunner {
    pub fn new(
        store: Arc<dyn FactStore>,
        code_sets: Arc<CodeSetRegistry>,
        measures: Arc<MeasureRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            code_sets,
            measures,
            ledger: Arc::new(RunLedger::new()),
            config,
        }
    }

    pub fn ledger(&self) -> &Arc<RunLedger> {
        &self.ledger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn code_sets(&self) -> &Arc<CodeSetRegistry> {
        &self.code_sets
    }

    pub fn measures(&self) -> &Arc<MeasureRegistry> {
        &self.measures
    }

    pub fn store(&self) -> &Arc<dyn FactStore> {
        &self.store
    }

    /// Register a run without starting it
    ///
    /// The evaluation timestamp recorded in lineage is fixed here.
    pub fn submit(&self, request: RunRequest) -> RunId {
        let run_id = RunId::new();
        self.ledger.register(run_id, request, Utc::now());
        log::info!("Run {} submitted", run_id);
        run_id
    }

    /// Submit and execute synchronously
    pub fn run(&self, request: RunRequest) -> EvalResult<RunSummary> {
        let run_id = self.submit(request);
        self.execute(run_id, &CancellationToken::new())
    }

    /// Execute a submitted run to a terminal state
    ///
    /// Returns the summary of a published run, or the error that failed it.
    /// Either way the ledger holds the terminal state and summary.
    pub fn execute(&self, run_id: RunId, cancel: &CancellationToken) -> EvalResult<RunSummary> {
        let (request, created_at) = self.ledger.request(run_id)?;
        let started_at = Utc::now();
        let started = Instant::now();

        match self.execute_inner(run_id, &request, created_at, started_at, cancel) {
            Ok(summary) => {
                log::info!(
                    "Run {} published: {} measures, {} failed, {} malformed values in {:?}",
                    run_id,
                    summary.succeeded.len(),
                    summary.failed.len(),
                    summary.malformed_value_exclusions,
                    started.elapsed()
                );
                Ok(summary)
            }
            Err(err) => {
                log::error!("Run {} failed: {}", run_id, err);
                let summary = RunSummary {
                    run_id,
                    state: RunState::Failed {
                        reason: err.to_string(),
                    },
                    period: request.period,
                    succeeded: Vec::new(),
                    failed: Vec::new(),
                    malformed_value_exclusions: 0,
                    warnings: Vec::new(),
                    error: Some(err.to_diagnostic()),
                    started_at,
                    finished_at: Utc::now(),
                };
                if let Err(ledger_err) = self.ledger.fail(run_id, summary) {
                    log::warn!("Run {} could not be marked failed: {}", run_id, ledger_err);
                }
                Err(err)
            }
        }
    }

    fn execute_inner(
        &self,
        run_id: RunId,
        request: &RunRequest,
        evaluated_at: DateTime<Utc>,
        started_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> EvalResult<RunSummary> {
        self.config.validate()?;
        self.ledger.transition(run_id, RunState::CollectingFacts)?;
        let snapshot = self.with_retry("acquire snapshot", || self.store.snapshot())?;
        let code_set_generation = self.code_sets.generation();
        let definition_generation = self.measures.generation();

        let mut failed = Vec::new();
        let pinned = self.pin_measures(request, &mut failed);
        for failure in &failed {
            log::warn!("Run {}: skipping {}: {}", run_id, failure.measure_id, failure.reason.message);
        }

        let manifest = RunManifest {
            run_id,
            request: request.clone(),
            measures: pinned
                .iter()
                .map(|p| PinnedMeasureRef {
                    measure_id: p.definition.id.clone(),
                    version: p.definition.version,
                    period: p.period,
                    code_set_versions: p.code_sets.versions(),
                })
                .collect(),
            snapshot_version: snapshot.version(),
            code_set_generation,
            definition_generation,
            engine_version: self.config.engine_version.clone(),
            evaluated_at,
        };
        log::info!(
            "Run {} collecting done: snapshot {}, {} patients, {} measures",
            run_id,
            snapshot.version(),
            snapshot.patient_count(),
            pinned.len()
        );
        self.ledger.pin_inputs(
            run_id,
            RunInputs {
                manifest: manifest.clone(),
                snapshot: Arc::clone(&snapshot),
                measures: pinned.clone(),
            },
        )?;
        check_cancelled(run_id, cancel)?;

        let total = pinned.len();
        self.ledger
            .transition(run_id, RunState::Evaluating { completed: 0, total })?;

        let recorder = LineageRecorder::new(
            run_id,
            snapshot.version(),
            manifest.engine_version.clone(),
            evaluated_at,
        );
        let mut rows = Vec::new();
        let mut succeeded = Vec::new();
        let mut warnings = Vec::new();
        for (index, measure) in pinned.iter().enumerate() {
            match self.evaluate_measure(&snapshot, measure, &recorder, Some(cancel)) {
                Ok(evaluation) => {
                    let denominator = evaluation.rows.iter().filter(|r| r.denominator).count();
                    let numerator = evaluation.rows.iter().filter(|r| r.numerator).count();
                    log::debug!(
                        "Run {}: {} evaluated, {}/{}",
                        run_id,
                        measure.definition,
                        numerator,
                        denominator
                    );
                    succeeded.push(MeasureRunSummary {
                        measure_id: measure.definition.id.clone(),
                        version: measure.definition.version,
                        period: measure.period,
                        rows: evaluation.rows.len(),
                        denominator,
                        numerator,
                    });
                    rows.extend(evaluation.rows);
                    warnings.extend(evaluation.warnings);
                }
                Err(err) if err.is_run_fatal() => return Err(err),
                Err(err) => {
                    log::warn!("Run {}: {} failed: {}", run_id, measure.definition, err);
                    failed.push(FailedMeasure {
                        measure_id: measure.definition.id.clone(),
                        version: Some(measure.definition.version),
                        reason: err.to_diagnostic().with_subject(measure.definition.id.clone()),
                    });
                }
            }
            self.ledger.transition(
                run_id,
                RunState::Evaluating {
                    completed: index + 1,
                    total,
                },
            )?;
        }

        self.ledger.transition(run_id, RunState::Assembling)?;
        self.verify_consistency(&manifest, &pinned)?;
        check_cancelled(run_id, cancel)?;

        let summary = RunSummary {
            run_id,
            state: RunState::Published,
            period: request.period,
            succeeded,
            failed,
            malformed_value_exclusions: warnings.len(),
            warnings,
            error: None,
            started_at,
            finished_at: Utc::now(),
        };
        self.ledger.publish(run_id, rows, summary.clone())?;
        Ok(summary)
    }

    /// Select the definitions effective on the reference date and pin their
    /// code sets, recording anything unresolvable in `failed`
    fn pin_measures(&self, request: &RunRequest, failed: &mut Vec<FailedMeasure>) -> Vec<PinnedMeasure> {
        let reference = request.reference_date();
        let definitions: Vec<Arc<MeasureDefinition>> = match &request.measure_ids {
            Some(ids) => ids
                .iter()
                .filter_map(|id| match self.measures.effective(id, reference) {
                    Ok(definition) => Some(definition),
                    Err(err) => {
                        failed.push(FailedMeasure {
                            measure_id: id.clone(),
                            version: None,
                            reason: registry_error(err).to_diagnostic().with_subject(id.clone()),
                        });
                        None
                    }
                })
                .collect(),
            None => self.measures.active(reference),
        };

        definitions
            .into_iter()
            .filter_map(|definition| match PinnedCodeSets::pin(&definition, &self.code_sets) {
                Ok(code_sets) => Some(PinnedMeasure {
                    period: definition.period_for(reference),
                    definition,
                    code_sets,
                }),
                Err(err) => {
                    failed.push(FailedMeasure {
                        measure_id: definition.id.clone(),
                        version: Some(definition.version),
                        reason: err.to_diagnostic().with_subject(definition.id.clone()),
                    });
                    None
                }
            })
            .collect()
    }

    /// Evaluate one measure for every patient of the snapshot
    fn evaluate_measure(
        &self,
        snapshot: &FactSnapshot,
        measure: &PinnedMeasure,
        recorder: &LineageRecorder,
        cancel: Option<&CancellationToken>,
    ) -> EvalResult<MeasureEvaluation> {
        let definition = measure.definition.as_ref();
        let ctx = EvaluationContext::new(snapshot, &measure.code_sets, measure.period);
        let code_set_versions = measure.code_sets.versions();
        let patients: Vec<&Patient> = snapshot.patients().collect();

        let mut rows = Vec::with_capacity(patients.len());
        let mut warnings = Vec::new();
        for batch in patients.chunks(self.config.batch_size) {
            if let Some(cancel) = cancel {
                check_cancelled(recorder.run_id(), cancel)?;
            }
            let outcomes: Vec<EvalResult<PatientOutcome>> = if self.config.parallel {
                batch
                    .par_iter()
                    .map(|patient| evaluate_patient(definition, patient, &ctx))
                    .collect()
            } else {
                batch
                    .iter()
                    .map(|patient| evaluate_patient(definition, patient, &ctx))
                    .collect()
            };

            for outcome in outcomes {
                let outcome = outcome?;
                warnings.extend(outcome.malformed.iter().map(|m| {
                    Diagnostic::warning(
                        QM0201,
                        format!("{}: {}", definition.id, m.to_error()),
                    )
                    .with_subject(m.patient_id.to_string())
                }));
                rows.push(recorder.record(definition, &code_set_versions, measure.period, outcome));
            }
        }

        Ok(MeasureEvaluation { rows, warnings })
    }

    /// Everything pinned at run start must still hold before publishing
    fn verify_consistency(&self, manifest: &RunManifest, pinned: &[PinnedMeasure]) -> EvalResult<()> {
        let current = self.with_retry("check snapshot version", || self.store.current_version())?;
        if current != manifest.snapshot_version {
            return Err(EvalError::inconsistent(format!(
                "fact store moved from {} to {} during run {}",
                manifest.snapshot_version, current, manifest.run_id
            )));
        }

        for measure in pinned {
            let definition = &measure.definition;
            match self.measures.get(&definition.id, definition.version) {
                Ok(registered) if registered == *definition => {}
                _ => {
                    return Err(EvalError::inconsistent(format!(
                        "{} no longer resolves to the pinned definition",
                        definition
                    )));
                }
            }
            for set in measure.code_sets.iter() {
                match self.code_sets.resolve(&set.name, &set.version) {
                    Ok(registered) if registered == *set => {}
                    _ => {
                        return Err(EvalError::inconsistent(format!(
                            "code set {} no longer resolves to the pinned content",
                            set.reference()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Call `op`, retrying transient fact store failures with backoff
    fn with_retry<T>(&self, what: &str, mut op: impl FnMut() -> FactStoreResult<T>) -> EvalResult<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = self.config.backoff(attempt);
                    log::warn!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        what,
                        err,
                        attempt,
                        self.config.max_retries,
                        delay
                    );
                    std::thread::sleep(delay);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Re-evaluate a published run from its pinned inputs and compare the
    /// rows byte for byte
    pub fn reproduce(&self, run_id: RunId) -> EvalResult<ReproductionReport> {
        let published = self.ledger.results(run_id)?;
        let summary = self.ledger.summary(run_id)?;
        let inputs = self.ledger.inputs(run_id)?;
        let recorder = LineageRecorder::new(
            run_id,
            inputs.manifest.snapshot_version,
            inputs.manifest.engine_version.clone(),
            inputs.manifest.evaluated_at,
        );

        let mut replayed = Vec::with_capacity(published.len());
        for measure in &inputs.measures {
            if !summary.succeeded_ids().any(|id| id == measure.definition.id) {
                continue;
            }
            let evaluation = self.evaluate_measure(&inputs.snapshot, measure, &recorder, None)?;
            replayed.extend(evaluation.rows);
        }

        let mut mismatches = Vec::new();
        for index in 0..published.len().max(replayed.len()) {
            match (published.get(index), replayed.get(index)) {
                (Some(a), Some(b)) if a.canonical_bytes() == b.canonical_bytes() => {}
                (Some(row), _) | (None, Some(row)) => {
                    mismatches.push(format!("{}/{}", row.measure_id, row.patient_id));
                }
                (None, None) => {}
            }
        }

        if !mismatches.is_empty() {
            log::warn!("Run {} did not reproduce: {} rows differ", run_id, mismatches.len());
        }
        Ok(ReproductionReport {
            run_id,
            rows_compared: published.len(),
            identical: mismatches.is_empty(),
            mismatches,
        })
    }
}

fn check_cancelled(run_id: RunId, cancel: &CancellationToken) -> EvalResult<()> {
    if cancel.is_cancelled() {
        return Err(EvalError::Cancelled(run_id));
    }
    Ok(())
}
