//! Numerator evaluation and evidence selection
//!
//! Candidate events are those matching the numerator filter inside the
//! lookback window. The single most relevant candidate is selected by a
//! total order:
//! 1. event date, most recent first
//! 2. code priority within its code set, highest (lowest index) first
//! 3. event kind, then event id, ascending
//!
//! The requirement is then evaluated on that one event. Lab results whose
//! value does not parse are never candidates; they are reported back as
//! malformed exclusions.

use crate::context::EvaluationContext;
use crate::engine::{code_priority, filter_matches};
use crate::error::{EvalError, EvalResult};
use crate::lineage::Evidence;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use vbc_quality_measures::{MeasureDefinition, Requirement};
use vbc_quality_types::{ClinicalEvent, EventId, Patient, PatientId};

/// A lab result excluded because its value is not a decimal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedValue {
    pub patient_id: PatientId,
    pub event_id: EventId,
    pub raw: String,
}

impl MalformedValue {
    pub fn to_error(&self) -> EvalError {
        EvalError::malformed_value(self.event_id.as_str(), &self.raw)
    }
}

/// Result of numerator evaluation for one patient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumeratorOutcome {
    pub achieved: bool,
    /// The selected candidate; `None` when there were no candidates
    pub evidence: Option<Evidence>,
    pub qualifying_events: usize,
    pub malformed: Vec<MalformedValue>,
}

struct Candidate<'a> {
    event: &'a ClinicalEvent,
    priority: usize,
    value: Option<Decimal>,
}

fn selection_order(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    b.event
        .event_date()
        .cmp(&a.event.event_date())
        .then_with(|| a.priority.cmp(&b.priority))
        .then_with(|| a.event.kind().cmp(&b.event.kind()))
        .then_with(|| a.event.id().cmp(b.event.id()))
}

/// Evaluate the numerator criterion of `definition` for a patient already
/// known to be in the denominator
pub fn evaluate_numerator(
    definition: &MeasureDefinition,
    patient: &Patient,
    ctx: &EvaluationContext<'_>,
) -> EvalResult<NumeratorOutcome> {
    let criterion = &definition.numerator;
    let range = criterion.window.resolve(ctx.period());

    let mut candidates = Vec::new();
    let mut malformed = Vec::new();
    for event in ctx.events_in(&patient.id, criterion.filter.required_kind(), range) {
        let matched = filter_matches(ctx, &criterion.filter, event).map_err(|e| {
            EvalError::definition_failure(&definition.id, format!("numerator: {e}"))
        })?;
        if !matched {
            continue;
        }

        let value = match event {
            ClinicalEvent::LabResult(lab) => match lab.numeric_value() {
                Ok(value) => Some(value),
                Err(_) => {
                    log::warn!(
                        "{}: excluding lab result {} for patient {} with malformed value '{}'",
                        definition.id,
                        lab.id,
                        patient.id,
                        lab.value
                    );
                    malformed.push(MalformedValue {
                        patient_id: patient.id.clone(),
                        event_id: lab.id.clone(),
                        raw: lab.value.clone(),
                    });
                    continue;
                }
            },
            _ => None,
        };

        candidates.push(Candidate {
            event,
            priority: code_priority(ctx, &criterion.filter, event).unwrap_or(usize::MAX),
            value,
        });
    }

    let Some(selected) = candidates.iter().min_by(|a, b| selection_order(a, b)) else {
        return Ok(NumeratorOutcome {
            achieved: false,
            evidence: None,
            qualifying_events: 0,
            malformed,
        });
    };

    let achieved = match &criterion.requirement {
        Requirement::Exists => true,
        Requirement::Threshold { comparator, value } => selected
            .value
            .is_some_and(|observed| comparator.apply(observed, *value)),
        Requirement::Disposition { disposition } => selected
            .event
            .as_encounter()
            .and_then(|encounter| encounter.disposition)
            .is_some_and(|recorded| recorded == *disposition),
    };

    Ok(NumeratorOutcome {
        achieved,
        evidence: Some(Evidence {
            kind: selected.event.kind(),
            event_id: selected.event.id().clone(),
            date: selected.event.event_date(),
            code: selected.event.code().map(str::to_string),
            value: selected.value,
        }),
        qualifying_events: candidates.len(),
        malformed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PinnedCodeSets;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use vbc_quality_measures::{builtin_code_sets, diabetes_a1c};
    use vbc_quality_model::{FactSnapshot, SnapshotVersion};
    use vbc_quality_types::{LabResult, MeasurementPeriod, Sex};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn a1c(id: &str, code: &str, on: NaiveDate, value: &str) -> ClinicalEvent {
        ClinicalEvent::LabResult(LabResult {
            id: EventId::new(id),
            patient_id: PatientId::new("p1"),
            code: code.to_string(),
            date: on,
            value: value.to_string(),
            unit: Some("%".to_string()),
        })
    }

    fn evaluate(events: Vec<ClinicalEvent>) -> NumeratorOutcome {
        let patient = Patient::new("p1", date(1980, 1, 1), Sex::Female);
        let facts = FactSnapshot::build(SnapshotVersion(1), vec![patient.clone()], events).unwrap();
        let code_sets = PinnedCodeSets::from_sets(builtin_code_sets().into_iter().map(Arc::new));
        let ctx = EvaluationContext::new(&facts, &code_sets, MeasurementPeriod::calendar_year(2025).unwrap());
        evaluate_numerator(&diabetes_a1c(), &patient, &ctx).unwrap()
    }

    #[test]
    fn test_most_recent_value_decides() {
        let outcome = evaluate(vec![
            a1c("lab-1", "4548-4", date(2025, 2, 1), "6.5"),
            a1c("lab-2", "4548-4", date(2025, 9, 1), "9.1"),
        ]);
        assert!(!outcome.achieved);
        assert_eq!(outcome.evidence.unwrap().event_id, EventId::new("lab-2"));
        assert_eq!(outcome.qualifying_events, 2);
    }

    #[test]
    fn test_same_day_tie_break_by_code_priority() {
        // 4548-4 is listed before 17856-6
        let outcome = evaluate(vec![
            a1c("lab-a", "17856-6", date(2025, 5, 1), "9.0"),
            a1c("lab-b", "4548-4", date(2025, 5, 1), "7.0"),
        ]);
        assert!(outcome.achieved);
        assert_eq!(outcome.evidence.unwrap().event_id, EventId::new("lab-b"));
    }

    #[test]
    fn test_same_day_same_code_tie_break_by_id() {
        let outcome = evaluate(vec![
            a1c("lab-z", "4548-4", date(2025, 5, 1), "9.0"),
            a1c("lab-m", "4548-4", date(2025, 5, 1), "7.0"),
        ]);
        assert_eq!(outcome.evidence.unwrap().event_id, EventId::new("lab-m"));
    }

    #[test]
    fn test_malformed_values_are_not_candidates() {
        let outcome = evaluate(vec![
            a1c("lab-1", "4548-4", date(2025, 3, 1), "7.2"),
            a1c("lab-2", "4548-4", date(2025, 10, 1), "pending"),
        ]);
        assert!(outcome.achieved);
        assert_eq!(outcome.evidence.unwrap().value, Some(Decimal::new(72, 1)));
        assert_eq!(outcome.malformed.len(), 1);
        assert_eq!(outcome.malformed[0].raw, "pending");
    }

    #[test]
    fn test_out_of_period_lab_ignored() {
        let outcome = evaluate(vec![a1c("lab-1", "4548-4", date(2024, 12, 31), "6.0")]);
        assert!(!outcome.achieved);
        assert_eq!(outcome.evidence, None);
    }
}
