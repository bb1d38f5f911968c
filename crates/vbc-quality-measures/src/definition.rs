//! Versioned measure definitions

use crate::code_set::CodeSetRef;
use crate::error::{MeasureError, RegistryResult};
use crate::predicate::{NumeratorCriterion, Predicate};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use vbc_quality_types::{EventKind, MeasurementPeriod, PeriodRule};

/// Measure program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MeasureFamily {
    /// Healthcare Effectiveness Data and Information Set
    Hedis,
    /// Hospital Value-Based Purchasing
    Hvbp,
}

impl fmt::Display for MeasureFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasureFamily::Hedis => write!(f, "HEDIS"),
            MeasureFamily::Hvbp => write!(f, "HVBP"),
        }
    }
}

/// Declarative description of one version of a quality measure
///
/// Immutable once published; corrections are published as a new version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureDefinition {
    /// Measure identifier, e.g. `HEDIS-DM-A1C`
    pub id: String,
    pub name: String,
    pub family: MeasureFamily,
    /// Version number, starting at 1
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// First reference date this version applies to
    pub effective_from: NaiveDate,
    /// Last reference date this version applies to, open-ended when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_to: Option<NaiveDate>,
    pub period_rule: PeriodRule,
    pub denominator: Predicate,
    pub numerator: NumeratorCriterion,
    /// Known limitations of the definition that consumers should surface
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caveats: Vec<String>,
}

impl MeasureDefinition {
    /// Measurement period for a run whose reference date is `reference`
    pub fn period_for(&self, reference: NaiveDate) -> MeasurementPeriod {
        self.period_rule.resolve(reference)
    }

    pub fn is_effective_on(&self, date: NaiveDate) -> bool {
        self.effective_from <= date && self.effective_to.is_none_or(|to| date <= to)
    }

    /// Fails with [`MeasureError::NotEffective`] outside the effective range
    pub fn ensure_effective_on(&self, date: NaiveDate) -> RegistryResult<()> {
        if self.is_effective_on(date) {
            Ok(())
        } else {
            Err(MeasureError::NotEffective {
                id: self.id.clone(),
                version: self.version,
                date,
            })
        }
    }

    /// Every code set referenced by the denominator or numerator
    pub fn code_set_refs(&self) -> BTreeSet<CodeSetRef> {
        let mut refs = BTreeSet::new();
        self.denominator.code_set_refs(&mut refs);
        self.numerator.filter.code_set_refs(&mut refs);
        refs
    }

    /// True when eligibility requires at least one diagnosis
    pub fn is_diagnosis_gated(&self) -> bool {
        self.denominator.requires_event_of(EventKind::Diagnosis)
    }

    /// Check structural well-formedness
    pub fn validate(&self) -> RegistryResult<()> {
        let mut problems = Vec::new();
        if self.id.trim().is_empty() {
            problems.push("measure id is empty".to_string());
        }
        if self.name.trim().is_empty() {
            problems.push("measure name is empty".to_string());
        }
        if self.version == 0 {
            problems.push("version numbers start at 1".to_string());
        }
        if let Some(to) = self.effective_to {
            if to < self.effective_from {
                problems.push(format!(
                    "effective range {}..{} is empty",
                    self.effective_from, to
                ));
            }
        }
        if matches!(self.period_rule, PeriodRule::TrailingYears { years: 0 }) {
            problems.push("trailing period of zero years".to_string());
        }
        self.denominator.problems("denominator", &mut problems);
        self.numerator.problems(&mut problems);

        if problems.is_empty() {
            Ok(())
        } else {
            Err(MeasureError::malformed(&self.id, problems.join("; ")))
        }
    }
}

impl fmt::Display for MeasureDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{} ({})", self.id, self.version, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::{EventFilter, Requirement, TemporalWindow};
    use vbc_quality_types::Sex;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn definition() -> MeasureDefinition {
        MeasureDefinition {
            id: "TEST-1".to_string(),
            name: "Test measure".to_string(),
            family: MeasureFamily::Hedis,
            version: 1,
            description: None,
            effective_from: date(2020, 1, 1),
            effective_to: Some(date(2025, 12, 31)),
            period_rule: PeriodRule::CalendarYear,
            denominator: Predicate::sex(Sex::Female),
            numerator: NumeratorCriterion::new(
                EventFilter::kind(EventKind::Procedure),
                TemporalWindow::MeasurementPeriod,
                Requirement::Exists,
            ),
            caveats: vec![],
        }
    }

    #[test]
    fn test_effective_range_is_inclusive() {
        let def = definition();
        assert!(def.is_effective_on(date(2020, 1, 1)));
        assert!(def.is_effective_on(date(2025, 12, 31)));
        assert!(!def.is_effective_on(date(2026, 1, 1)));
        assert!(matches!(
            def.ensure_effective_on(date(2019, 12, 31)),
            Err(MeasureError::NotEffective { .. })
        ));
    }

    #[test]
    fn test_validate_collects_problems() {
        let mut def = definition();
        assert!(def.validate().is_ok());

        def.version = 0;
        def.denominator = Predicate::age_between(75, 18);
        let err = def.validate().unwrap_err();
        match err {
            MeasureError::MalformedDefinition { message, .. } => {
                assert!(message.contains("version"));
                assert!(message.contains("age range"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_not_diagnosis_gated() {
        assert!(!definition().is_diagnosis_gated());
    }
}
