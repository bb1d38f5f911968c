//! Denominator evaluation

use crate::context::EvaluationContext;
use crate::engine::predicate_holds;
use crate::error::{EvalError, EvalResult};
use vbc_quality_measures::MeasureDefinition;
use vbc_quality_types::Patient;

/// Is `patient` in the eligible population of `definition` for the context's
/// period?
///
/// Age is taken in whole years on the period end. Predicate failures are
/// reported as [`EvalError::DefinitionEvaluationFailure`] for the measure.
pub fn evaluate_denominator(
    definition: &MeasureDefinition,
    patient: &Patient,
    ctx: &EvaluationContext<'_>,
) -> EvalResult<bool> {
    predicate_holds(ctx, &definition.denominator, patient).map_err(|e| match e {
        EvalError::CodeSetNotPinned { .. } => {
            EvalError::definition_failure(&definition.id, format!("denominator: {e}"))
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PinnedCodeSets;
    use chrono::NaiveDate;
    use std::sync::Arc;
    use vbc_quality_measures::{breast_cancer_screening, builtin_code_sets, diabetes_a1c};
    use vbc_quality_model::{FactSnapshot, SnapshotVersion};
    use vbc_quality_types::{ClinicalEvent, Diagnosis, EventId, MeasurementPeriod, Sex};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_demographic_only_measure() {
        let facts = FactSnapshot::empty(SnapshotVersion(1));
        let code_sets = PinnedCodeSets::default();
        let ctx = EvaluationContext::new(&facts, &code_sets, MeasurementPeriod::calendar_year(2025).unwrap());
        let bcs = breast_cancer_screening();

        let woman = Patient::new("w", date(1965, 7, 4), Sex::Female);
        let man = Patient::new("m", date(1965, 7, 4), Sex::Male);
        assert!(evaluate_denominator(&bcs, &woman, &ctx).unwrap());
        assert!(!evaluate_denominator(&bcs, &man, &ctx).unwrap());
    }

    #[test]
    fn test_diagnosis_gated_without_events() {
        let facts = FactSnapshot::empty(SnapshotVersion(1));
        let code_sets = PinnedCodeSets::from_sets(builtin_code_sets().into_iter().map(Arc::new));
        let ctx = EvaluationContext::new(&facts, &code_sets, MeasurementPeriod::calendar_year(2025).unwrap());

        let patient = Patient::new("p", date(1980, 1, 1), Sex::Male);
        assert!(!evaluate_denominator(&diabetes_a1c(), &patient, &ctx).unwrap());
    }

    #[test]
    fn test_missing_code_set_fails_definition() {
        let patient = Patient::new("p", date(1980, 1, 1), Sex::Male);
        let diagnosis = Diagnosis {
            id: EventId::new("dx"),
            patient_id: patient.id.clone(),
            code: "E11.9".to_string(),
            date: date(2024, 1, 1),
            encounter_id: None,
            diagnosis_type: None,
        };
        let facts =
            FactSnapshot::build(SnapshotVersion(1), vec![patient.clone()], vec![ClinicalEvent::from(diagnosis)]).unwrap();
        let code_sets = PinnedCodeSets::default();
        let ctx = EvaluationContext::new(&facts, &code_sets, MeasurementPeriod::calendar_year(2025).unwrap());

        // Age passes, so the diagnosis filter is reached
        let err = evaluate_denominator(&diabetes_a1c(), &patient, &ctx).unwrap_err();
        assert!(matches!(err, EvalError::DefinitionEvaluationFailure { .. }));
    }
}
