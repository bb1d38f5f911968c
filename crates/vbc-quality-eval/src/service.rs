//! Quality service API
//!
//! Read operations only ever see published runs. `trigger_run` hands the
//! run to tokio's blocking pool and returns its id straight away; callers
//! poll [`QualityService::run_state`] or await [`QualityService::wait_for_run`].

use crate::config::EngineConfig;
use crate::error::{registry_error, EvalError, EvalResult};
use crate::lineage::{MeasureResult, RunId};
use crate::run::{CancellationToken, RunRequest, RunState, RunSummary};
use crate::runner::{MeasureRunner, ReproductionReport};
use chrono::NaiveDate;
use parking_lot::Mutex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::task::JoinHandle;
use vbc_quality_measures::{
    install_builtins, CodeSetRegistry, MeasureDefinition, MeasureFamily, MeasureRegistry,
    Requirement,
};
use vbc_quality_model::FactStore;
use vbc_quality_types::{EventId, EventKind, MeasurementPeriod, PatientId};

/// Denominator and numerator totals of one measure in one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureAggregate {
    pub run_id: RunId,
    pub definition_version: u32,
    pub denominator: usize,
    pub numerator: usize,
    /// Percentage, two decimal places; zero for an empty denominator
    pub rate: Decimal,
    /// End of the measure's period
    pub measurement_date: NaiveDate,
}

impl MeasureAggregate {
    fn from_rows<'a>(run_id: RunId, rows: impl IntoIterator<Item = &'a MeasureResult>) -> Option<Self> {
        let mut rows = rows.into_iter().peekable();
        let first = rows.peek()?;
        let definition_version = first.lineage.definition_version;
        let measurement_date = first.period.end;

        let (mut denominator, mut numerator) = (0, 0);
        for row in rows {
            denominator += usize::from(row.denominator);
            numerator += usize::from(row.numerator);
        }
        Some(Self {
            run_id,
            definition_version,
            denominator,
            numerator,
            rate: rate(numerator, denominator),
            measurement_date,
        })
    }
}

/// `numerator / denominator` as a percentage rounded half away from zero
pub fn rate(numerator: usize, denominator: usize) -> Decimal {
    if denominator == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(numerator) * Decimal::ONE_HUNDRED / Decimal::from(denominator))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Catalog entry for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureSummary {
    pub id: String,
    pub name: String,
    pub family: MeasureFamily,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caveats: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<MeasureAggregate>,
}

/// Measure-specific context shown next to a patient's result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdditionalInfo {
    /// Most recent qualifying lab value
    LatestValue { value: Decimal, date: NaiveDate },
    /// Most recent qualifying event and how many fell in the window
    Screening { last_date: NaiveDate, count: usize },
    /// Encounter whose discharge disposition was read
    Disposition { encounter_id: EventId, date: NaiveDate },
}

impl AdditionalInfo {
    /// Derive from a row's evidence, shaped by the definition's requirement
    pub fn from_result(definition: &MeasureDefinition, result: &MeasureResult) -> Option<Self> {
        let evidence = result.evidence.as_ref()?;
        match &definition.numerator.requirement {
            Requirement::Threshold { .. } => evidence.value.map(|value| AdditionalInfo::LatestValue {
                value,
                date: evidence.date,
            }),
            Requirement::Exists => Some(AdditionalInfo::Screening {
                last_date: evidence.date,
                count: result.qualifying_events,
            }),
            Requirement::Disposition { .. } if evidence.kind == EventKind::Encounter => {
                Some(AdditionalInfo::Disposition {
                    encounter_id: evidence.event_id.clone(),
                    date: evidence.date,
                })
            }
            Requirement::Disposition { .. } => None,
        }
    }
}

/// One eligible patient's line in a measure detail listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientMeasureRow {
    pub patient_id: PatientId,
    pub mrn: String,
    pub full_name: String,
    pub age_years: i32,
    pub denominator: bool,
    pub numerator: bool,
    pub measurement_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<AdditionalInfo>,
}

/// Definition plus the latest published outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureDetail {
    pub definition: MeasureDefinition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<MeasureAggregate>,
    /// Denominator members ordered by full name
    pub patients: Vec<PatientMeasureRow>,
}

struct RunTask {
    cancel: CancellationToken,
    handle: Option<JoinHandle<EvalResult<RunSummary>>>,
}

/// Entry point for listing measures, reading results and starting runs
pub struct QualityService {
    runner: Arc<MeasureRunner>,
    tasks: Mutex<HashMap<RunId, RunTask>>,
}

impl QualityService {
    pub fn new(runner: MeasureRunner) -> Self {
        Self {
            runner: Arc::new(runner),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Service over `store` with the built-in catalog installed
    pub fn with_builtins(store: Arc<dyn FactStore>, config: EngineConfig) -> EvalResult<Self> {
        config.validate()?;
        let code_sets = Arc::new(CodeSetRegistry::new());
        let measures = Arc::new(MeasureRegistry::new());
        install_builtins(&code_sets, &measures).map_err(registry_error)?;
        Ok(Self::new(MeasureRunner::new(store, code_sets, measures, config)))
    }

    pub fn runner(&self) -> &Arc<MeasureRunner> {
        &self.runner
    }

    /// Latest version of every registered measure with its latest aggregate
    pub fn list_measures(&self) -> Vec<MeasureSummary> {
        self.runner
            .measures()
            .all_latest()
            .into_iter()
            .map(|definition| MeasureSummary {
                aggregate: self.latest_aggregate(&definition.id),
                id: definition.id.clone(),
                name: definition.name.clone(),
                family: definition.family,
                version: definition.version,
                description: definition.description.clone(),
                caveats: definition.caveats.clone(),
            })
            .collect()
    }

    /// Definition, aggregate and patient rows of the most recent published
    /// run that evaluated `measure_id`
    ///
    /// Without such a run the latest definition is returned with no
    /// aggregate.
    pub fn get_measure(&self, measure_id: &str) -> EvalResult<MeasureDetail> {
        let measures = self.runner.measures();
        let Some(run_id) = self.runner.ledger().latest_published_for(measure_id) else {
            let definition = measures.latest(measure_id).map_err(registry_error)?;
            return Ok(MeasureDetail {
                definition: definition.as_ref().clone(),
                aggregate: None,
                patients: Vec::new(),
            });
        };

        let results = self.runner.ledger().results(run_id)?;
        let rows: Vec<&MeasureResult> = results.iter().filter(|r| r.measure_id == measure_id).collect();
        let aggregate = MeasureAggregate::from_rows(run_id, rows.iter().copied());
        let definition = match &aggregate {
            Some(aggregate) => measures.get(measure_id, aggregate.definition_version),
            None => measures.latest(measure_id),
        }
        .map_err(registry_error)?;

        let snapshot = self.runner.ledger().inputs(run_id)?.snapshot;
        let mut patients: Vec<PatientMeasureRow> = rows
            .iter()
            .filter(|row| row.denominator)
            .map(|row| {
                let patient = snapshot.patient(&row.patient_id);
                PatientMeasureRow {
                    patient_id: row.patient_id.clone(),
                    mrn: patient.map(|p| p.mrn.clone()).unwrap_or_default(),
                    full_name: patient.map(|p| p.full_name()).unwrap_or_default(),
                    age_years: row.age_years,
                    denominator: row.denominator,
                    numerator: row.numerator,
                    measurement_date: row.period.end,
                    info: AdditionalInfo::from_result(&definition, row),
                }
            })
            .collect();
        patients.sort_by(|a, b| {
            a.full_name
                .cmp(&b.full_name)
                .then_with(|| a.patient_id.cmp(&b.patient_id))
        });

        Ok(MeasureDetail {
            definition: definition.as_ref().clone(),
            aggregate,
            patients,
        })
    }

    /// A patient's rows from the most recent published run
    pub fn get_patient_measures(&self, patient_id: &PatientId) -> EvalResult<Vec<MeasureResult>> {
        let Some(run_id) = self.runner.ledger().latest_published() else {
            return Ok(Vec::new());
        };
        let results = self.runner.ledger().results(run_id)?;
        Ok(results
            .iter()
            .filter(|r| r.patient_id == *patient_id)
            .cloned()
            .collect())
    }

    /// Measure-specific context for one of a patient's rows
    pub fn additional_info(&self, result: &MeasureResult) -> EvalResult<Option<AdditionalInfo>> {
        let definition = self
            .runner
            .measures()
            .get(&result.measure_id, result.lineage.definition_version)
            .map_err(registry_error)?;
        Ok(AdditionalInfo::from_result(&definition, result))
    }

    /// Patients in the store's current snapshot with a diagnosis, procedure
    /// or lab coded in the named code set
    ///
    /// Reads live facts, so the answer may include patients no published run
    /// has evaluated yet.
    pub fn patients_in_code_set(&self, name: &str, version: &str) -> EvalResult<BTreeSet<PatientId>> {
        let set = self
            .runner
            .code_sets()
            .resolve(name, version)
            .map_err(registry_error)?;
        let snapshot = self.runner.store().snapshot()?;
        let mut patients = BTreeSet::new();
        for kind in [EventKind::Diagnosis, EventKind::Procedure, EventKind::LabResult] {
            patients.extend(snapshot.patients_with_code(kind, |code| set.contains(code)));
        }
        Ok(patients)
    }

    /// Start a run in the background and return its id
    pub async fn trigger_run(
        &self,
        period: MeasurementPeriod,
        measure_ids: Option<Vec<String>>,
    ) -> EvalResult<RunId> {
        let request = RunRequest { period, measure_ids };
        let run_id = self.runner.submit(request);
        let cancel = CancellationToken::new();

        let runner = Arc::clone(&self.runner);
        let token = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || runner.execute(run_id, &token));

        let mut tasks = self.tasks.lock();
        // Finished runs nobody waited for live on in the ledger only
        tasks.retain(|_, task| task.handle.as_ref().is_some_and(|h| !h.is_finished()));
        tasks.insert(
            run_id,
            RunTask {
                cancel,
                handle: Some(handle),
            },
        );
        Ok(run_id)
    }

    /// Run synchronously on the calling thread
    pub fn run_now(
        &self,
        period: MeasurementPeriod,
        measure_ids: Option<Vec<String>>,
    ) -> EvalResult<RunSummary> {
        self.runner.run(RunRequest { period, measure_ids })
    }

    /// Wait for a triggered run to reach a terminal state
    pub async fn wait_for_run(&self, run_id: RunId) -> EvalResult<RunSummary> {
        let handle = self.tasks.lock().remove(&run_id).and_then(|task| task.handle);

        match handle {
            Some(handle) => handle
                .await
                .map_err(|e| EvalError::internal(format!("run {} task: {}", run_id, e)))?,
            None => self.runner.ledger().summary(run_id),
        }
    }

    /// Request cancellation; takes effect at the next batch boundary
    pub fn cancel_run(&self, run_id: RunId) -> EvalResult<()> {
        if let Some(task) = self.tasks.lock().get(&run_id) {
            log::info!("Run {} cancellation requested", run_id);
            task.cancel.cancel();
            return Ok(());
        }
        if self.runner.ledger().contains(run_id) {
            return Ok(());
        }
        Err(EvalError::RunNotFound(run_id))
    }

    /// Number of background runs still tracked for waiting or cancellation
    pub fn tracked_runs(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn run_state(&self, run_id: RunId) -> EvalResult<RunState> {
        self.runner.ledger().state(run_id)
    }

    pub fn run_summary(&self, run_id: RunId) -> EvalResult<RunSummary> {
        self.runner.ledger().summary(run_id)
    }

    pub fn reproduce(&self, run_id: RunId) -> EvalResult<ReproductionReport> {
        self.runner.reproduce(run_id)
    }

    fn latest_aggregate(&self, measure_id: &str) -> Option<MeasureAggregate> {
        let run_id = self.runner.ledger().latest_published_for(measure_id)?;
        let results = self.runner.ledger().results(run_id).ok()?;
        MeasureAggregate::from_rows(run_id, results.iter().filter(|r| r.measure_id == measure_id))
    }
}
