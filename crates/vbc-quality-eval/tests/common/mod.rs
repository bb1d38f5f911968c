//! Shared fixtures for evaluation tests

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use vbc_quality_eval::{CancellationToken, EngineConfig, MeasureRunner, QualityService};
use vbc_quality_measures::{install_builtins, CodeSetRegistry, MeasureRegistry};
use vbc_quality_model::{
    FactSnapshot, FactStore, FactStoreError, FactStoreResult, InMemoryFactStore, SnapshotVersion,
};
use vbc_quality_types::{
    ClinicalEvent, Diagnosis, DischargeDisposition, Encounter, EncounterType, EventId, LabResult,
    MeasurementPeriod, Patient, PatientId, Procedure, Sex,
};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(8, 30, 0).unwrap()
}

pub fn year_2025() -> MeasurementPeriod {
    MeasurementPeriod::calendar_year(2025).unwrap()
}

pub fn patient(id: &str, birth: NaiveDate, sex: Sex) -> Patient {
    Patient::new(id, birth, sex)
}

pub fn diagnosis(id: &str, patient: &str, code: &str, on: NaiveDate) -> ClinicalEvent {
    ClinicalEvent::from(Diagnosis {
        id: EventId::new(id),
        patient_id: PatientId::new(patient),
        code: code.to_string(),
        date: on,
        encounter_id: None,
        diagnosis_type: None,
    })
}

pub fn lab(id: &str, patient: &str, code: &str, on: NaiveDate, value: &str) -> ClinicalEvent {
    ClinicalEvent::from(LabResult {
        id: EventId::new(id),
        patient_id: PatientId::new(patient),
        code: code.to_string(),
        date: on,
        value: value.to_string(),
        unit: Some("%".to_string()),
    })
}

pub fn procedure(id: &str, patient: &str, code: &str, on: NaiveDate, encounter: Option<&str>) -> ClinicalEvent {
    ClinicalEvent::from(Procedure {
        id: EventId::new(id),
        patient_id: PatientId::new(patient),
        code: code.to_string(),
        date: on,
        encounter_id: encounter.map(EventId::new),
    })
}

pub fn inpatient_stay(
    id: &str,
    patient: &str,
    admitted: NaiveDateTime,
    discharged: NaiveDateTime,
    disposition: DischargeDisposition,
) -> ClinicalEvent {
    ClinicalEvent::from(Encounter {
        id: EventId::new(id),
        patient_id: PatientId::new(patient),
        encounter_type: EncounterType::Inpatient,
        admission: admitted,
        discharge: Some(discharged),
        disposition: Some(disposition),
        code: None,
    })
}

pub fn store(patients: Vec<Patient>, events: Vec<ClinicalEvent>) -> InMemoryFactStore {
    let store = InMemoryFactStore::new();
    store.extend(patients, events).unwrap();
    store
}

pub fn registries() -> (Arc<CodeSetRegistry>, Arc<MeasureRegistry>) {
    let code_sets = Arc::new(CodeSetRegistry::new());
    let measures = Arc::new(MeasureRegistry::new());
    install_builtins(&code_sets, &measures).unwrap();
    (code_sets, measures)
}

pub fn test_config() -> EngineConfig {
    EngineConfig::default().with_batch_size(2).with_retries(3, 1)
}

pub fn runner_over(store: Arc<dyn FactStore>) -> MeasureRunner {
    let (code_sets, measures) = registries();
    MeasureRunner::new(store, code_sets, measures, test_config())
}

pub fn service_over(store: Arc<dyn FactStore>) -> QualityService {
    QualityService::with_builtins(store, test_config()).unwrap()
}

// ============================================================================
// Fact store doubles
// ============================================================================

/// Fails the first `failures` snapshot requests with a transient error
pub struct FlakyStore {
    pub inner: InMemoryFactStore,
    pub remaining_failures: AtomicU32,
    pub transient: bool,
}

impl FlakyStore {
    pub fn new(inner: InMemoryFactStore, failures: u32, transient: bool) -> Self {
        Self {
            inner,
            remaining_failures: AtomicU32::new(failures),
            transient,
        }
    }
}

impl FactStore for FlakyStore {
    fn snapshot(&self) -> FactStoreResult<Arc<FactSnapshot>> {
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(if self.transient {
                FactStoreError::transient("connection reset")
            } else {
                FactStoreError::permanent("database dropped")
            });
        }
        self.inner.snapshot()
    }

    fn current_version(&self) -> FactStoreResult<SnapshotVersion> {
        self.inner.current_version()
    }
}

/// Writes a new event right after handing out each snapshot
pub struct MutatingStore {
    pub inner: InMemoryFactStore,
    pub writes: AtomicU32,
}

impl FactStore for MutatingStore {
    fn snapshot(&self) -> FactStoreResult<Arc<FactSnapshot>> {
        let snapshot = self.inner.snapshot()?;
        let n = self.writes.fetch_add(1, Ordering::SeqCst);
        let patient = snapshot
            .patients()
            .next()
            .map(|p| p.id.as_str().to_string())
            .unwrap_or_else(|| "p-late".to_string());
        self.inner
            .insert_event(diagnosis(&format!("late-{n}"), &patient, "E11.9", date(2025, 6, 1)))?;
        Ok(snapshot)
    }

    fn current_version(&self) -> FactStoreResult<SnapshotVersion> {
        self.inner.current_version()
    }
}

/// Trips a cancellation token when the run acquires its snapshot
pub struct CancellingStore {
    pub inner: InMemoryFactStore,
    pub token: CancellationToken,
}

impl FactStore for CancellingStore {
    fn snapshot(&self) -> FactStoreResult<Arc<FactSnapshot>> {
        self.token.cancel();
        self.inner.snapshot()
    }

    fn current_version(&self) -> FactStoreResult<SnapshotVersion> {
        self.inner.current_version()
    }
}
