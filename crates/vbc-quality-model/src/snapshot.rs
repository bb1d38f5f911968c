//! Immutable, version-stamped views of the clinical fact tables

use crate::provider::{FactStoreError, FactStoreResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use vbc_quality_types::{ClinicalEvent, DateRange, EventId, EventKind, Patient, PatientId};

/// Monotonic version stamp of a fact store's state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotVersion(pub u64);

impl SnapshotVersion {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Immutable clinical facts as of one store version
///
/// Patients iterate in identifier order and each patient's events in
/// `(event date, kind, id)` order, so every consumer sees the same sequence.
#[derive(Debug, Clone)]
pub struct FactSnapshot {
    version: SnapshotVersion,
    patients: BTreeMap<PatientId, Patient>,
    events: Vec<ClinicalEvent>,
    by_patient: HashMap<PatientId, Vec<usize>>,
    by_key: HashMap<(EventKind, EventId), usize>,
    by_encounter: HashMap<EventId, Vec<usize>>,
}

impl FactSnapshot {
    /// Index patients and events
    ///
    /// Fails on duplicate patient ids or duplicate `(kind, id)` event keys.
    /// Events whose patient is unknown are kept but unreachable from
    /// patient queries.
    pub fn build(
        version: SnapshotVersion,
        patients: impl IntoIterator<Item = Patient>,
        events: impl IntoIterator<Item = ClinicalEvent>,
    ) -> FactStoreResult<Self> {
        let mut patient_map = BTreeMap::new();
        for patient in patients {
            if patient_map.contains_key(&patient.id) {
                return Err(FactStoreError::DuplicateIdentifier {
                    kind: "patient".to_string(),
                    id: patient.id.to_string(),
                });
            }
            patient_map.insert(patient.id.clone(), patient);
        }

        let events: Vec<ClinicalEvent> = events.into_iter().collect();
        let mut by_patient: HashMap<PatientId, Vec<usize>> = HashMap::new();
        let mut by_key = HashMap::with_capacity(events.len());
        let mut by_encounter: HashMap<EventId, Vec<usize>> = HashMap::new();

        for (idx, event) in events.iter().enumerate() {
            let key = (event.kind(), event.id().clone());
            if by_key.insert(key, idx).is_some() {
                return Err(FactStoreError::DuplicateIdentifier {
                    kind: event.kind().to_string(),
                    id: event.id().to_string(),
                });
            }
            by_patient
                .entry(event.patient_id().clone())
                .or_default()
                .push(idx);
            if let Some(encounter_id) = event.encounter_id() {
                by_encounter
                    .entry(encounter_id.clone())
                    .or_default()
                    .push(idx);
            }
        }

        let order = |idx: &usize| {
            let event = &events[*idx];
            (event.event_date(), event.kind(), event.id().clone())
        };
        for indices in by_patient.values_mut() {
            indices.sort_by_key(order);
        }
        for indices in by_encounter.values_mut() {
            indices.sort_by_key(order);
        }

        Ok(Self {
            version,
            patients: patient_map,
            events,
            by_patient,
            by_key,
            by_encounter,
        })
    }

    /// An empty snapshot
    pub fn empty(version: SnapshotVersion) -> Self {
        Self {
            version,
            patients: BTreeMap::new(),
            events: Vec::new(),
            by_patient: HashMap::new(),
            by_key: HashMap::new(),
            by_encounter: HashMap::new(),
        }
    }

    pub fn version(&self) -> SnapshotVersion {
        self.version
    }

    /// All patients in identifier order
    pub fn patients(&self) -> impl Iterator<Item = &Patient> {
        self.patients.values()
    }

    pub fn patient(&self, id: &PatientId) -> Option<&Patient> {
        self.patients.get(id)
    }

    pub fn patient_count(&self) -> usize {
        self.patients.len()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Every event in load order, including orphans
    pub fn all_events(&self) -> impl Iterator<Item = &ClinicalEvent> {
        self.events.iter()
    }

    /// All events of `kind` for `patient` dated within `range`
    pub fn events_for(
        &self,
        patient: &PatientId,
        kind: EventKind,
        range: DateRange,
    ) -> impl Iterator<Item = &ClinicalEvent> {
        self.patient_events(patient)
            .filter(move |event| event.kind() == kind && range.contains(event.event_date()))
    }

    /// Every event of `patient`, in date order
    pub fn patient_events(&self, patient: &PatientId) -> impl Iterator<Item = &ClinicalEvent> {
        self.by_patient
            .get(patient)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(move |idx| &self.events[*idx])
    }

    /// Point lookup by kind and identifier
    pub fn event(&self, kind: EventKind, id: &EventId) -> Option<&ClinicalEvent> {
        self.by_key
            .get(&(kind, id.clone()))
            .map(move |idx| &self.events[*idx])
    }

    /// Diagnoses and procedures recorded under `encounter`
    pub fn linked_to_encounter(&self, encounter: &EventId) -> impl Iterator<Item = &ClinicalEvent> {
        self.by_encounter
            .get(encounter)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(move |idx| &self.events[*idx])
    }

    /// The encounter an event was recorded under, if it exists in the snapshot
    pub fn encounter_of(&self, event: &ClinicalEvent) -> Option<&ClinicalEvent> {
        event
            .encounter_id()
            .and_then(|id| self.event(EventKind::Encounter, id))
    }

    /// Distinct known patients having at least one event of `kind` whose code
    /// satisfies `matches`
    pub fn patients_with_code(
        &self,
        kind: EventKind,
        matches: impl Fn(&str) -> bool,
    ) -> BTreeSet<PatientId> {
        self.events
            .iter()
            .filter(|event| event.kind() == kind)
            .filter(|event| event.code().is_some_and(&matches))
            .map(|event| event.patient_id())
            .filter(|patient| self.patients.contains_key(*patient))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use vbc_quality_types::{Diagnosis, Procedure, Sex};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn diagnosis(id: &str, patient: &str, code: &str, on: NaiveDate) -> ClinicalEvent {
        ClinicalEvent::Diagnosis(Diagnosis {
            id: EventId::new(id),
            patient_id: PatientId::new(patient),
            code: code.to_string(),
            date: on,
            encounter_id: None,
            diagnosis_type: None,
        })
    }

    fn snapshot() -> FactSnapshot {
        FactSnapshot::build(
            SnapshotVersion(1),
            vec![
                Patient::new("p1", date(1980, 1, 1), Sex::Female),
                Patient::new("p2", date(1970, 1, 1), Sex::Male),
            ],
            vec![
                diagnosis("d2", "p1", "E11.9", date(2025, 5, 1)),
                diagnosis("d1", "p1", "I10", date(2024, 5, 1)),
                diagnosis("d3", "p2", "E10.1", date(2025, 1, 1)),
                diagnosis("d4", "ghost", "E11.9", date(2025, 1, 1)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_patient_events_sorted_by_date() {
        let snap = snapshot();
        let ids: Vec<_> = snap
            .patient_events(&PatientId::new("p1"))
            .map(|e| e.id().as_str())
            .collect();
        assert_eq!(ids, vec!["d1", "d2"]);
    }

    #[test]
    fn test_range_query() {
        let snap = snapshot();
        let range = DateRange::new(date(2025, 1, 1), date(2025, 12, 31));
        let found: Vec<_> = snap
            .events_for(&PatientId::new("p1"), EventKind::Diagnosis, range)
            .collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].code(), Some("E11.9"));
    }

    #[test]
    fn test_patients_with_code_ignores_orphans() {
        let snap = snapshot();
        let diabetic = snap.patients_with_code(EventKind::Diagnosis, |code| code.starts_with('E'));
        assert_eq!(
            diabetic.into_iter().collect::<Vec<_>>(),
            vec![PatientId::new("p1"), PatientId::new("p2")]
        );
    }

    #[test]
    fn test_duplicate_event_key_rejected() {
        let result = FactSnapshot::build(
            SnapshotVersion(1),
            vec![],
            vec![
                diagnosis("d1", "p1", "I10", date(2024, 5, 1)),
                diagnosis("d1", "p1", "I11", date(2024, 5, 2)),
            ],
        );
        assert!(matches!(result, Err(FactStoreError::DuplicateIdentifier { .. })));
    }

    #[test]
    fn test_same_id_different_kind_allowed() {
        let procedure = ClinicalEvent::Procedure(Procedure {
            id: EventId::new("d1"),
            patient_id: PatientId::new("p1"),
            code: "77067".to_string(),
            date: date(2024, 5, 1),
            encounter_id: None,
        });
        let snap = FactSnapshot::build(
            SnapshotVersion(1),
            vec![],
            vec![diagnosis("d1", "p1", "I10", date(2024, 5, 1)), procedure],
        )
        .unwrap();
        assert!(snap.event(EventKind::Procedure, &EventId::new("d1")).is_some());
    }
}
