//! Predicate interpreter and per-patient evaluation
//!
//! The engine walks the declarative predicate tree of a definition against
//! one immutable fact snapshot. It is stateless: every call is a pure
//! function of the definition, the patient and the context.

use crate::achievement::{evaluate_numerator, MalformedValue};
use crate::context::EvaluationContext;
use crate::eligibility::evaluate_denominator;
use crate::error::EvalResult;
use crate::lineage::Evidence;
use vbc_quality_measures::{EventFilter, MeasureDefinition, Predicate};
use vbc_quality_types::{ClinicalEvent, Patient, PatientId};

/// Outcome of evaluating one definition for one patient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientOutcome {
    pub patient_id: PatientId,
    pub age_years: i32,
    pub denominator: bool,
    pub numerator: bool,
    pub evidence: Option<Evidence>,
    pub qualifying_events: usize,
    /// Lab results excluded from candidate selection
    pub malformed: Vec<MalformedValue>,
}

/// Evaluate denominator, then numerator when eligible
pub fn evaluate_patient(
    definition: &MeasureDefinition,
    patient: &Patient,
    ctx: &EvaluationContext<'_>,
) -> EvalResult<PatientOutcome> {
    let age_years = patient.age_on(ctx.period().reference_date());
    let denominator = evaluate_denominator(definition, patient, ctx)?;

    if !denominator {
        return Ok(PatientOutcome {
            patient_id: patient.id.clone(),
            age_years,
            denominator: false,
            numerator: false,
            evidence: None,
            qualifying_events: 0,
            malformed: Vec::new(),
        });
    }

    let numerator = evaluate_numerator(definition, patient, ctx)?;
    Ok(PatientOutcome {
        patient_id: patient.id.clone(),
        age_years,
        denominator: true,
        numerator: numerator.achieved,
        evidence: numerator.evidence,
        qualifying_events: numerator.qualifying_events,
        malformed: numerator.malformed,
    })
}

/// Does `event` satisfy `filter`?
pub fn filter_matches(
    ctx: &EvaluationContext<'_>,
    filter: &EventFilter,
    event: &ClinicalEvent,
) -> EvalResult<bool> {
    match filter {
        EventFilter::Kind { kind } => Ok(event.kind() == *kind),
        EventFilter::InCodeSet { code_set } => {
            let set = ctx.code_set(code_set)?;
            Ok(event.code().is_some_and(|code| set.contains(code)))
        }
        EventFilter::EncounterType { encounter_type } => Ok(event
            .as_encounter()
            .is_some_and(|e| e.encounter_type == *encounter_type)),
        EventFilter::HasLinked { filter } => {
            if event.as_encounter().is_none() {
                return Ok(false);
            }
            for linked in ctx.facts().linked_to_encounter(event.id()) {
                if linked.patient_id() == event.patient_id() && filter_matches(ctx, filter, linked)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        EventFilter::DuringEncounter { filter } => match ctx.facts().encounter_of(event) {
            Some(encounter) if encounter.patient_id() == event.patient_id() => {
                filter_matches(ctx, filter, encounter)
            }
            _ => Ok(false),
        },
        EventFilter::All { of } => {
            for inner in of {
                if !filter_matches(ctx, inner, event)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        EventFilter::Any { of } => {
            for inner in of {
                if filter_matches(ctx, inner, event)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

/// Best (lowest) code set priority of the event's own code under `filter`
///
/// Code sets nested under linked-event filters describe other events and do
/// not contribute.
pub fn code_priority(
    ctx: &EvaluationContext<'_>,
    filter: &EventFilter,
    event: &ClinicalEvent,
) -> Option<usize> {
    match filter {
        EventFilter::InCodeSet { code_set } => {
            let code = event.code()?;
            ctx.code_set(code_set).ok()?.match_code(code)
        }
        EventFilter::All { of } | EventFilter::Any { of } => of
            .iter()
            .filter_map(|inner| code_priority(ctx, inner, event))
            .min(),
        EventFilter::Kind { .. }
        | EventFilter::EncounterType { .. }
        | EventFilter::HasLinked { .. }
        | EventFilter::DuringEncounter { .. } => None,
    }
}

/// Does `patient` satisfy `predicate`?
pub fn predicate_holds(
    ctx: &EvaluationContext<'_>,
    predicate: &Predicate,
    patient: &Patient,
) -> EvalResult<bool> {
    match predicate {
        Predicate::AgeRange { min, max } => {
            let age = i64::from(patient.age_on(ctx.period().reference_date()));
            Ok(min.is_none_or(|min| age >= i64::from(min))
                && max.is_none_or(|max| age <= i64::from(max)))
        }
        Predicate::Sex { sex } => Ok(patient.sex == *sex),
        Predicate::Exists { filter, window } => {
            let range = window.resolve(ctx.period());
            for event in ctx.events_in(&patient.id, filter.required_kind(), range) {
                if filter_matches(ctx, filter, event)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Predicate::All { of } => {
            for inner in of {
                if !predicate_holds(ctx, inner, patient)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Predicate::Any { of } => {
            for inner in of {
                if predicate_holds(ctx, inner, patient)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PinnedCodeSets;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::sync::Arc;
    use vbc_quality_measures::{CodeSet, CodeSetRef, TemporalWindow};
    use vbc_quality_model::{FactSnapshot, SnapshotVersion};
    use vbc_quality_types::{
        Encounter, EncounterType, EventId, EventKind, MeasurementPeriod, Procedure, Sex,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        date(y, m, d).and_hms_opt(9, 0, 0).unwrap()
    }

    fn surgery() -> CodeSetRef {
        CodeSetRef::new("surgery", "1")
    }

    fn snapshot() -> FactSnapshot {
        FactSnapshot::build(
            SnapshotVersion(1),
            vec![Patient::new("p1", date(1960, 1, 1), Sex::Male)],
            vec![
                ClinicalEvent::Encounter(Encounter {
                    id: EventId::new("enc-1"),
                    patient_id: PatientId::new("p1"),
                    encounter_type: EncounterType::Inpatient,
                    admission: at(2025, 3, 1),
                    discharge: Some(at(2025, 3, 4)),
                    disposition: None,
                    code: None,
                }),
                ClinicalEvent::Procedure(Procedure {
                    id: EventId::new("proc-1"),
                    patient_id: PatientId::new("p1"),
                    code: "0DTJ4ZZ".to_string(),
                    date: date(2025, 3, 2),
                    encounter_id: Some(EventId::new("enc-1")),
                }),
            ],
        )
        .unwrap()
    }

    fn pinned() -> PinnedCodeSets {
        PinnedCodeSets::from_sets(vec![Arc::new(CodeSet::new("surgery", "1").prefix("0"))])
    }

    #[test]
    fn test_linked_event_correlation() {
        let facts = snapshot();
        let code_sets = pinned();
        let ctx = EvaluationContext::new(&facts, &code_sets, MeasurementPeriod::calendar_year(2025).unwrap());
        let patient = facts.patient(&PatientId::new("p1")).unwrap();

        let surgical_stay = Predicate::exists(
            EventFilter::all(vec![
                EventFilter::encounter_type(EncounterType::Inpatient),
                EventFilter::has_linked(EventFilter::coded(EventKind::Procedure, surgery())),
            ]),
            TemporalWindow::MeasurementPeriod,
        );
        assert!(predicate_holds(&ctx, &surgical_stay, patient).unwrap());

        let during_inpatient = Predicate::exists(
            EventFilter::during_encounter(EventFilter::encounter_type(EncounterType::Inpatient)),
            TemporalWindow::AnyTime,
        );
        assert!(predicate_holds(&ctx, &during_inpatient, patient).unwrap());
    }

    #[test]
    fn test_window_excludes_later_period() {
        let facts = snapshot();
        let code_sets = pinned();
        let ctx = EvaluationContext::new(&facts, &code_sets, MeasurementPeriod::calendar_year(2024).unwrap());
        let patient = facts.patient(&PatientId::new("p1")).unwrap();

        let any_procedure = Predicate::exists(EventFilter::kind(EventKind::Procedure), TemporalWindow::AnyTime);
        assert!(!predicate_holds(&ctx, &any_procedure, patient).unwrap());
    }

    #[test]
    fn test_unpinned_code_set_is_an_error() {
        let facts = snapshot();
        let code_sets = PinnedCodeSets::default();
        let ctx = EvaluationContext::new(&facts, &code_sets, MeasurementPeriod::calendar_year(2025).unwrap());
        let patient = facts.patient(&PatientId::new("p1")).unwrap();

        let predicate = Predicate::exists(EventFilter::in_code_set(surgery()), TemporalWindow::AnyTime);
        assert!(predicate_holds(&ctx, &predicate, patient).is_err());
    }

    #[test]
    fn test_age_bounds_inclusive() {
        let facts = snapshot();
        let code_sets = pinned();
        // Born 1960-01-01, 65 on 2025-12-31
        let ctx = EvaluationContext::new(&facts, &code_sets, MeasurementPeriod::calendar_year(2025).unwrap());
        let patient = facts.patient(&PatientId::new("p1")).unwrap();

        assert!(predicate_holds(&ctx, &Predicate::age_between(65, 65), patient).unwrap());
        assert!(!predicate_holds(&ctx, &Predicate::age_between(66, 90), patient).unwrap());
        assert!(predicate_holds(&ctx, &Predicate::AgeRange { min: None, max: Some(65) }, patient).unwrap());
    }
}
