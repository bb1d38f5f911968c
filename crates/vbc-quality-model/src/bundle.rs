//! Fact bundles: the typed clinical-fact tables as one JSON document
//!
//! A bundle mirrors the upstream staging tables (patients, encounters,
//! diagnoses, procedures, lab results, medications). Loading performs no
//! normalisation; [`FactBundle::quality_check`] reports suspicious rows as
//! warnings without rejecting them. Duplicate patient ids are errors since
//! the store refuses to index them.

use crate::provider::{FactStoreError, FactStoreResult};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;
use vbc_quality_diagnostics::{Diagnostic, QM0302, QM0303, QM0304, QM0305, QM0306};
use vbc_quality_types::{
    ClinicalEvent, Diagnosis, Encounter, LabResult, Medication, Patient, PatientId, Procedure,
};

static DIAGNOSIS_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z0-9.]+$").unwrap_or_else(|e| panic!("invalid diagnosis code pattern: {e}"))
});

const EARLIEST_PLAUSIBLE_BIRTH_YEAR: i32 = 1900;
const MAX_PLAUSIBLE_STAY_DAYS: i64 = 365;

/// The clinical-fact tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactBundle {
    #[serde(default)]
    pub patients: Vec<Patient>,
    #[serde(default)]
    pub encounters: Vec<Encounter>,
    #[serde(default)]
    pub diagnoses: Vec<Diagnosis>,
    #[serde(default)]
    pub procedures: Vec<Procedure>,
    #[serde(default)]
    pub lab_results: Vec<LabResult>,
    #[serde(default)]
    pub medications: Vec<Medication>,
}

impl FactBundle {
    /// Parse a bundle from a JSON string
    pub fn from_json(json: &str) -> FactStoreResult<Self> {
        serde_json::from_str(json).map_err(|e| FactStoreError::Parse(e.to_string()))
    }

    /// Load a bundle from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> FactStoreResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| FactStoreError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn event_count(&self) -> usize {
        self.encounters.len()
            + self.diagnoses.len()
            + self.procedures.len()
            + self.lab_results.len()
            + self.medications.len()
    }

    /// Split into patients and a flat event list
    pub fn into_parts(self) -> (Vec<Patient>, Vec<ClinicalEvent>) {
        let mut events = Vec::with_capacity(self.event_count());
        events.extend(self.encounters.into_iter().map(ClinicalEvent::from));
        events.extend(self.diagnoses.into_iter().map(ClinicalEvent::from));
        events.extend(self.procedures.into_iter().map(ClinicalEvent::from));
        events.extend(self.lab_results.into_iter().map(ClinicalEvent::from));
        events.extend(self.medications.into_iter().map(ClinicalEvent::from));
        (self.patients, events)
    }

    /// Data-quality findings as of `today`
    ///
    /// Checks orphaned events, duplicate patient ids, birth dates in the
    /// future or before 1900, diagnosis code format and encounter length of
    /// stay. Only duplicate ids are errors.
    pub fn quality_check(&self, today: NaiveDate) -> Vec<Diagnostic> {
        let mut findings = Vec::new();
        let mut known: HashSet<&PatientId> = HashSet::new();

        for patient in &self.patients {
            if !known.insert(&patient.id) {
                findings.push(
                    Diagnostic::error(QM0306, "Duplicate patient identifier")
                        .with_subject(patient.id.as_str())
                        .with_help("the bundle cannot be loaded until ids are unique"),
                );
            }
            if patient.birth_date > today {
                findings.push(
                    Diagnostic::warning(QM0303, format!("Birth date {} is in the future", patient.birth_date))
                        .with_subject(patient.id.as_str()),
                );
            } else if patient.birth_date.year() < EARLIEST_PLAUSIBLE_BIRTH_YEAR {
                findings.push(
                    Diagnostic::warning(
                        QM0303,
                        format!("Birth date {} is before {}", patient.birth_date, EARLIEST_PLAUSIBLE_BIRTH_YEAR),
                    )
                    .with_subject(patient.id.as_str()),
                );
            }
        }

        let orphan = |kind: &str, id: &str, patient: &PatientId| {
            Diagnostic::warning(QM0302, format!("{} references unknown patient {}", kind, patient))
                .with_subject(id.to_string())
        };

        for encounter in &self.encounters {
            if !known.contains(&encounter.patient_id) {
                findings.push(orphan("encounter", encounter.id.as_str(), &encounter.patient_id));
            }
            if let Some(days) = encounter.length_of_stay_days() {
                if !(0..=MAX_PLAUSIBLE_STAY_DAYS).contains(&days) {
                    findings.push(
                        Diagnostic::warning(QM0305, format!("Length of stay of {} days", days))
                            .with_subject(encounter.id.as_str()),
                    );
                }
            }
        }

        for diagnosis in &self.diagnoses {
            if !known.contains(&diagnosis.patient_id) {
                findings.push(orphan("diagnosis", diagnosis.id.as_str(), &diagnosis.patient_id));
            }
            if !DIAGNOSIS_CODE.is_match(&diagnosis.code) {
                findings.push(
                    Diagnostic::warning(QM0304, format!("Diagnosis code '{}' is not of the form [A-Z0-9.]+", diagnosis.code))
                        .with_subject(diagnosis.id.as_str()),
                );
            }
        }

        for procedure in &self.procedures {
            if !known.contains(&procedure.patient_id) {
                findings.push(orphan("procedure", procedure.id.as_str(), &procedure.patient_id));
            }
        }
        for lab in &self.lab_results {
            if !known.contains(&lab.patient_id) {
                findings.push(orphan("lab result", lab.id.as_str(), &lab.patient_id));
            }
        }
        for medication in &self.medications {
            if !known.contains(&medication.patient_id) {
                findings.push(orphan("medication", medication.id.as_str(), &medication.patient_id));
            }
        }

        if !findings.is_empty() {
            log::warn!("Fact bundle has {} data-quality findings", findings.len());
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vbc_quality_types::{EventId, Sex};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_into_parts_flattens_all_tables() {
        let bundle = FactBundle {
            patients: vec![Patient::new("p1", date(1980, 1, 1), Sex::Female)],
            procedures: vec![Procedure {
                id: EventId::new("proc-1"),
                patient_id: PatientId::new("p1"),
                code: "77067".to_string(),
                date: date(2025, 1, 1),
                encounter_id: None,
            }],
            ..Default::default()
        };

        let (patients, events) = bundle.into_parts();
        assert_eq!(patients.len(), 1);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_quality_check_flags_bad_rows() {
        let bundle = FactBundle {
            patients: vec![
                Patient::new("p1", date(2030, 1, 1), Sex::Female),
                Patient::new("p2", date(1850, 1, 1), Sex::Male),
            ],
            diagnoses: vec![
                Diagnosis {
                    id: EventId::new("dx-1"),
                    patient_id: PatientId::new("p1"),
                    code: "e11.9".to_string(),
                    date: date(2025, 1, 1),
                    encounter_id: None,
                    diagnosis_type: None,
                },
                Diagnosis {
                    id: EventId::new("dx-2"),
                    patient_id: PatientId::new("nobody"),
                    code: "E11.9".to_string(),
                    date: date(2025, 1, 1),
                    encounter_id: None,
                    diagnosis_type: None,
                },
            ],
            ..Default::default()
        };

        let codes: Vec<_> = bundle
            .quality_check(date(2025, 6, 1))
            .into_iter()
            .map(|d| d.code)
            .collect();
        assert_eq!(codes, vec![QM0303, QM0303, QM0304, QM0302]);
    }

    #[test]
    fn test_duplicate_patient_is_an_error() {
        let bundle = FactBundle {
            patients: vec![
                Patient::new("p1", date(1980, 1, 1), Sex::Female),
                Patient::new("p1", date(1981, 2, 2), Sex::Female),
            ],
            ..Default::default()
        };

        let findings = bundle.quality_check(date(2025, 6, 1));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, QM0306);
        assert!(findings[0].is_error());
        assert!(crate::InMemoryFactStore::from_bundle(bundle).is_err());
    }
}
