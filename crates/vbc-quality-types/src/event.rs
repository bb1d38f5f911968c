//! Clinical events
//!
//! Every fact about a patient other than demographics is a [`ClinicalEvent`]:
//! an identifier, a patient reference, a date, a code from a controlled
//! vocabulary and kind-specific attributes.

use crate::patient::PatientId;
use crate::value::{parse_lab_value, ValueResult};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Clinical event identifier, unique within its kind
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Discriminant of [`ClinicalEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Encounter,
    Diagnosis,
    Procedure,
    LabResult,
    Medication,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Encounter,
        EventKind::Diagnosis,
        EventKind::Procedure,
        EventKind::LabResult,
        EventKind::Medication,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Encounter => "encounter",
            EventKind::Diagnosis => "diagnosis",
            EventKind::Procedure => "procedure",
            EventKind::LabResult => "lab_result",
            EventKind::Medication => "medication",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Encounter setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncounterType {
    Inpatient,
    Outpatient,
    Emergency,
    Other,
}

/// Where the patient went at discharge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DischargeDisposition {
    Home,
    Transferred,
    /// Patient died during the encounter
    Expired,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosisType {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encounter {
    pub id: EventId,
    pub patient_id: PatientId,
    pub encounter_type: EncounterType,
    pub admission: NaiveDateTime,
    #[serde(default)]
    pub discharge: Option<NaiveDateTime>,
    #[serde(default)]
    pub disposition: Option<DischargeDisposition>,
    /// Encounter (visit) code, when the source provides one
    #[serde(default)]
    pub code: Option<String>,
}

impl Encounter {
    /// Whole days between admission and discharge, `None` while still admitted
    pub fn length_of_stay_days(&self) -> Option<i64> {
        self.discharge
            .map(|discharge| (discharge.date() - self.admission.date()).num_days())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub id: EventId,
    pub patient_id: PatientId,
    pub code: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub encounter_id: Option<EventId>,
    #[serde(default)]
    pub diagnosis_type: Option<DiagnosisType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Procedure {
    pub id: EventId,
    pub patient_id: PatientId,
    pub code: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub encounter_id: Option<EventId>,
}

/// Laboratory result with the value exactly as the source reported it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabResult {
    pub id: EventId,
    pub patient_id: PatientId,
    pub code: String,
    pub date: NaiveDate,
    /// Raw result text, e.g. `"7.2"` or `"pending"`
    pub value: String,
    #[serde(default)]
    pub unit: Option<String>,
}

impl LabResult {
    /// Parse the raw value; unparsable text is an error, never zero
    pub fn numeric_value(&self) -> ValueResult<Decimal> {
        parse_lab_value(&self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medication {
    pub id: EventId,
    pub patient_id: PatientId,
    pub code: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

/// Any dated, coded fact about a patient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClinicalEvent {
    Encounter(Encounter),
    Diagnosis(Diagnosis),
    Procedure(Procedure),
    LabResult(LabResult),
    Medication(Medication),
}

impl ClinicalEvent {
    pub fn id(&self) -> &EventId {
        match self {
            Self::Encounter(e) => &e.id,
            Self::Diagnosis(d) => &d.id,
            Self::Procedure(p) => &p.id,
            Self::LabResult(l) => &l.id,
            Self::Medication(m) => &m.id,
        }
    }

    pub fn patient_id(&self) -> &PatientId {
        match self {
            Self::Encounter(e) => &e.patient_id,
            Self::Diagnosis(d) => &d.patient_id,
            Self::Procedure(p) => &p.patient_id,
            Self::LabResult(l) => &l.patient_id,
            Self::Medication(m) => &m.patient_id,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Encounter(_) => EventKind::Encounter,
            Self::Diagnosis(_) => EventKind::Diagnosis,
            Self::Procedure(_) => EventKind::Procedure,
            Self::LabResult(_) => EventKind::LabResult,
            Self::Medication(_) => EventKind::Medication,
        }
    }

    /// The event's code, if it carries one
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Encounter(e) => e.code.as_deref(),
            Self::Diagnosis(d) => Some(&d.code),
            Self::Procedure(p) => Some(&p.code),
            Self::LabResult(l) => Some(&l.code),
            Self::Medication(m) => Some(&m.code),
        }
    }

    /// Date used for temporal windowing
    ///
    /// Encounters are dated by discharge, falling back to admission while the
    /// patient is still admitted. Medications are dated by start.
    pub fn event_date(&self) -> NaiveDate {
        match self {
            Self::Encounter(e) => e.discharge.unwrap_or(e.admission).date(),
            Self::Diagnosis(d) => d.date,
            Self::Procedure(p) => p.date,
            Self::LabResult(l) => l.date,
            Self::Medication(m) => m.start_date,
        }
    }

    /// Encounter this event was recorded under, if any
    pub fn encounter_id(&self) -> Option<&EventId> {
        match self {
            Self::Diagnosis(d) => d.encounter_id.as_ref(),
            Self::Procedure(p) => p.encounter_id.as_ref(),
            _ => None,
        }
    }

    pub fn as_encounter(&self) -> Option<&Encounter> {
        match self {
            Self::Encounter(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_lab_result(&self) -> Option<&LabResult> {
        match self {
            Self::LabResult(l) => Some(l),
            _ => None,
        }
    }
}

impl From<Encounter> for ClinicalEvent {
    fn from(value: Encounter) -> Self {
        Self::Encounter(value)
    }
}

impl From<Diagnosis> for ClinicalEvent {
    fn from(value: Diagnosis) -> Self {
        Self::Diagnosis(value)
    }
}

impl From<Procedure> for ClinicalEvent {
    fn from(value: Procedure) -> Self {
        Self::Procedure(value)
    }
}

impl From<LabResult> for ClinicalEvent {
    fn from(value: LabResult) -> Self {
        Self::LabResult(value)
    }
}

impl From<Medication> for ClinicalEvent {
    fn from(value: Medication) -> Self {
        Self::Medication(value)
    }
}
