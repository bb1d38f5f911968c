//! Declarative predicate tree
//!
//! Measures are composed from these tagged structures rather than hand-coded:
//! - [`Predicate`]: patient-level eligibility (age, sex, clinical history)
//! - [`EventFilter`]: which clinical events qualify
//! - [`TemporalWindow`]: how far back from the period end events may be dated
//! - [`Requirement`]: what the single selected evidence event must satisfy
//!
//! There is no negation combinator: adding matching facts can only turn a
//! predicate from false to true.

use crate::code_set::CodeSetRef;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use vbc_quality_types::{
    years_before, DateRange, DischargeDisposition, EncounterType, EventKind, MeasurementPeriod,
    Sex,
};

// ============================================================================
// Temporal windows
// ============================================================================

/// Window of event dates, relative to a measurement period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemporalWindow {
    /// Any date up to and including the period end
    AnyTime,
    /// The measurement period itself
    MeasurementPeriod,
    /// `[period end - years, period end]`, inclusive
    Years { years: u32 },
}

impl TemporalWindow {
    pub fn resolve(&self, period: &MeasurementPeriod) -> DateRange {
        let end = period.reference_date();
        match self {
            TemporalWindow::AnyTime => DateRange::until(end),
            TemporalWindow::MeasurementPeriod => period.as_range(),
            TemporalWindow::Years { years } => DateRange::new(years_before(end, *years), end),
        }
    }
}

impl fmt::Display for TemporalWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemporalWindow::AnyTime => write!(f, "any time"),
            TemporalWindow::MeasurementPeriod => write!(f, "measurement period"),
            TemporalWindow::Years { years } => write!(f, "{} years", years),
        }
    }
}

// ============================================================================
// Event filters
// ============================================================================

/// Which clinical events qualify
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventFilter {
    /// Events of this kind
    Kind { kind: EventKind },
    /// Events whose code is a member of the pinned code set
    InCodeSet { code_set: CodeSetRef },
    /// Encounters of this type
    EncounterType { encounter_type: EncounterType },
    /// Encounters with at least one linked diagnosis or procedure matching
    /// the inner filter
    HasLinked { filter: Box<EventFilter> },
    /// Diagnoses or procedures recorded under an encounter matching the
    /// inner filter
    DuringEncounter { filter: Box<EventFilter> },
    All { of: Vec<EventFilter> },
    Any { of: Vec<EventFilter> },
}

impl EventFilter {
    pub fn kind(kind: EventKind) -> Self {
        EventFilter::Kind { kind }
    }

    pub fn in_code_set(code_set: CodeSetRef) -> Self {
        EventFilter::InCodeSet { code_set }
    }

    pub fn encounter_type(encounter_type: EncounterType) -> Self {
        EventFilter::EncounterType { encounter_type }
    }

    pub fn has_linked(filter: EventFilter) -> Self {
        EventFilter::HasLinked {
            filter: Box::new(filter),
        }
    }

    pub fn during_encounter(filter: EventFilter) -> Self {
        EventFilter::DuringEncounter {
            filter: Box::new(filter),
        }
    }

    pub fn all(of: Vec<EventFilter>) -> Self {
        EventFilter::All { of }
    }

    pub fn any(of: Vec<EventFilter>) -> Self {
        EventFilter::Any { of }
    }

    /// `kind` events whose code is in `code_set`
    pub fn coded(kind: EventKind, code_set: CodeSetRef) -> Self {
        Self::all(vec![Self::kind(kind), Self::in_code_set(code_set)])
    }

    /// The single event kind every matching event must have, if determined
    pub fn required_kind(&self) -> Option<EventKind> {
        match self {
            EventFilter::Kind { kind } => Some(*kind),
            EventFilter::EncounterType { .. } | EventFilter::HasLinked { .. } => {
                Some(EventKind::Encounter)
            }
            EventFilter::InCodeSet { .. } | EventFilter::DuringEncounter { .. } => None,
            EventFilter::All { of } => of.iter().find_map(EventFilter::required_kind),
            EventFilter::Any { of } => {
                let mut kinds = of.iter().map(EventFilter::required_kind);
                let first = kinds.next().flatten()?;
                kinds.all(|k| k == Some(first)).then_some(first)
            }
        }
    }

    /// Every code set referenced anywhere in the filter
    pub fn code_set_refs(&self, refs: &mut BTreeSet<CodeSetRef>) {
        match self {
            EventFilter::InCodeSet { code_set } => {
                refs.insert(code_set.clone());
            }
            EventFilter::HasLinked { filter } | EventFilter::DuringEncounter { filter } => {
                filter.code_set_refs(refs)
            }
            EventFilter::All { of } | EventFilter::Any { of } => {
                for filter in of {
                    filter.code_set_refs(refs);
                }
            }
            EventFilter::Kind { .. } | EventFilter::EncounterType { .. } => {}
        }
    }

    pub(crate) fn problems(&self, path: &str, problems: &mut Vec<String>) {
        match self {
            EventFilter::All { of } | EventFilter::Any { of } if of.is_empty() => {
                problems.push(format!("{}: empty combinator", path));
            }
            EventFilter::All { of } => {
                let kinds: BTreeSet<EventKind> =
                    of.iter().filter_map(EventFilter::required_kind).collect();
                if kinds.len() > 1 {
                    problems.push(format!("{}: conjunction of incompatible event kinds", path));
                }
                for (idx, filter) in of.iter().enumerate() {
                    filter.problems(&format!("{}.all[{}]", path, idx), problems);
                }
            }
            EventFilter::Any { of } => {
                for (idx, filter) in of.iter().enumerate() {
                    filter.problems(&format!("{}.any[{}]", path, idx), problems);
                }
            }
            EventFilter::HasLinked { filter } => {
                if filter.required_kind() == Some(EventKind::Encounter) {
                    problems.push(format!("{}: encounters cannot be linked to encounters", path));
                }
                filter.problems(&format!("{}.linked", path), problems);
            }
            EventFilter::DuringEncounter { filter } => {
                filter.problems(&format!("{}.encounter", path), problems);
            }
            EventFilter::Kind { .. }
            | EventFilter::InCodeSet { .. }
            | EventFilter::EncounterType { .. } => {}
        }
    }
}

// ============================================================================
// Patient predicates
// ============================================================================

/// Patient-level eligibility predicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    /// Whole-year age at the period end within `[min, max]`; open bounds
    /// when absent
    AgeRange {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<u32>,
    },
    Sex { sex: Sex },
    /// At least one event matching `filter` dated within `window`
    Exists {
        filter: EventFilter,
        window: TemporalWindow,
    },
    All { of: Vec<Predicate> },
    Any { of: Vec<Predicate> },
}

impl Predicate {
    pub fn age_between(min: u32, max: u32) -> Self {
        Predicate::AgeRange {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn sex(sex: Sex) -> Self {
        Predicate::Sex { sex }
    }

    pub fn exists(filter: EventFilter, window: TemporalWindow) -> Self {
        Predicate::Exists { filter, window }
    }

    pub fn all(of: Vec<Predicate>) -> Self {
        Predicate::All { of }
    }

    pub fn any(of: Vec<Predicate>) -> Self {
        Predicate::Any { of }
    }

    /// True when every satisfying patient must have an event of `kind`
    pub fn requires_event_of(&self, kind: EventKind) -> bool {
        match self {
            Predicate::Exists { filter, .. } => filter.required_kind() == Some(kind),
            Predicate::All { of } => of.iter().any(|p| p.requires_event_of(kind)),
            Predicate::Any { of } => !of.is_empty() && of.iter().all(|p| p.requires_event_of(kind)),
            Predicate::AgeRange { .. } | Predicate::Sex { .. } => false,
        }
    }

    pub fn code_set_refs(&self, refs: &mut BTreeSet<CodeSetRef>) {
        match self {
            Predicate::Exists { filter, .. } => filter.code_set_refs(refs),
            Predicate::All { of } | Predicate::Any { of } => {
                for predicate in of {
                    predicate.code_set_refs(refs);
                }
            }
            Predicate::AgeRange { .. } | Predicate::Sex { .. } => {}
        }
    }

    pub(crate) fn problems(&self, path: &str, problems: &mut Vec<String>) {
        match self {
            Predicate::AgeRange {
                min: Some(min),
                max: Some(max),
            } if min > max => {
                problems.push(format!("{}: age range {}..{} is empty", path, min, max));
            }
            Predicate::AgeRange { .. } | Predicate::Sex { .. } => {}
            Predicate::Exists { filter, .. } => filter.problems(&format!("{}.exists", path), problems),
            Predicate::All { of } | Predicate::Any { of } if of.is_empty() => {
                problems.push(format!("{}: empty combinator", path));
            }
            Predicate::All { of } | Predicate::Any { of } => {
                for (idx, predicate) in of.iter().enumerate() {
                    predicate.problems(&format!("{}[{}]", path, idx), problems);
                }
            }
        }
    }
}

// ============================================================================
// Numerator requirements
// ============================================================================

/// Comparison of a lab value against a threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl Comparator {
    pub fn apply(&self, value: Decimal, threshold: Decimal) -> bool {
        match self {
            Comparator::Lt => value < threshold,
            Comparator::Le => value <= threshold,
            Comparator::Eq => value == threshold,
            Comparator::Ge => value >= threshold,
            Comparator::Gt => value > threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Eq => "=",
            Comparator::Ge => ">=",
            Comparator::Gt => ">",
        }
    }
}

/// What the selected evidence event must satisfy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Requirement {
    /// Any qualifying event satisfies the numerator
    Exists,
    /// The most recent lab result's value compared against `value`
    Threshold {
        comparator: Comparator,
        value: Decimal,
    },
    /// The most recent encounter's discharge disposition
    Disposition { disposition: DischargeDisposition },
}

impl Requirement {
    /// Event kind this requirement can be evaluated on, if restricted
    pub fn applicable_kind(&self) -> Option<EventKind> {
        match self {
            Requirement::Exists => None,
            Requirement::Threshold { .. } => Some(EventKind::LabResult),
            Requirement::Disposition { .. } => Some(EventKind::Encounter),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Exists => write!(f, "exists"),
            Requirement::Threshold { comparator, value } => {
                write!(f, "value {} {}", comparator.symbol(), value)
            }
            Requirement::Disposition { disposition } => {
                write!(f, "disposition {:?}", disposition)
            }
        }
    }
}

/// Numerator criterion: filter, lookback window and requirement on the most
/// recent qualifying event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumeratorCriterion {
    pub filter: EventFilter,
    pub window: TemporalWindow,
    pub requirement: Requirement,
}

impl NumeratorCriterion {
    pub fn new(filter: EventFilter, window: TemporalWindow, requirement: Requirement) -> Self {
        Self {
            filter,
            window,
            requirement,
        }
    }

    pub(crate) fn problems(&self, problems: &mut Vec<String>) {
        self.filter.problems("numerator", problems);
        if let Some(kind) = self.requirement.applicable_kind() {
            if self.filter.required_kind() != Some(kind) {
                problems.push(format!(
                    "numerator: requirement '{}' needs a filter restricted to {} events",
                    self.requirement, kind
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn diabetes() -> CodeSetRef {
        CodeSetRef::new("diabetes", "2025")
    }

    #[test]
    fn test_window_resolution() {
        let period = MeasurementPeriod::calendar_year(2025).unwrap();

        assert_eq!(
            TemporalWindow::Years { years: 2 }.resolve(&period),
            DateRange::new(date(2023, 12, 31), date(2025, 12, 31))
        );
        assert_eq!(TemporalWindow::MeasurementPeriod.resolve(&period), period.as_range());
        assert!(TemporalWindow::AnyTime.resolve(&period).contains(date(1990, 1, 1)));
        assert!(!TemporalWindow::AnyTime.resolve(&period).contains(date(2026, 1, 1)));
    }

    #[test]
    fn test_required_kind() {
        assert_eq!(
            EventFilter::coded(EventKind::Diagnosis, diabetes()).required_kind(),
            Some(EventKind::Diagnosis)
        );
        assert_eq!(EventFilter::in_code_set(diabetes()).required_kind(), None);
        assert_eq!(
            EventFilter::any(vec![
                EventFilter::kind(EventKind::Diagnosis),
                EventFilter::kind(EventKind::Procedure),
            ])
            .required_kind(),
            None
        );
    }

    #[test]
    fn test_requires_event_of() {
        let gated = Predicate::all(vec![
            Predicate::age_between(18, 75),
            Predicate::exists(
                EventFilter::coded(EventKind::Diagnosis, diabetes()),
                TemporalWindow::AnyTime,
            ),
        ]);
        assert!(gated.requires_event_of(EventKind::Diagnosis));
        assert!(!Predicate::age_between(18, 75).requires_event_of(EventKind::Diagnosis));

        let either = Predicate::any(vec![gated.clone(), Predicate::sex(Sex::Female)]);
        assert!(!either.requires_event_of(EventKind::Diagnosis));
    }

    #[test]
    fn test_code_set_refs_are_collected() {
        let predicate = Predicate::exists(
            EventFilter::has_linked(EventFilter::coded(
                EventKind::Procedure,
                CodeSetRef::new("surgery", "1"),
            )),
            TemporalWindow::MeasurementPeriod,
        );
        let mut refs = BTreeSet::new();
        predicate.code_set_refs(&mut refs);
        assert_eq!(refs.into_iter().collect::<Vec<_>>(), vec![CodeSetRef::new("surgery", "1")]);
    }

    #[test]
    fn test_threshold_needs_lab_filter() {
        let criterion = NumeratorCriterion::new(
            EventFilter::coded(EventKind::Procedure, diabetes()),
            TemporalWindow::MeasurementPeriod,
            Requirement::Threshold {
                comparator: Comparator::Lt,
                value: Decimal::new(80, 1),
            },
        );
        let mut problems = Vec::new();
        criterion.problems(&mut problems);
        assert_eq!(problems.len(), 1);
    }

    #[test]
    fn test_comparator() {
        let eight = Decimal::new(80, 1);
        assert!(Comparator::Lt.apply(Decimal::new(72, 1), eight));
        assert!(!Comparator::Lt.apply(eight, eight));
        assert!(Comparator::Le.apply(eight, eight));
    }

    #[test]
    fn test_predicate_serde_shape() {
        let json = r#"{"type":"all","of":[
            {"type":"age_range","min":50,"max":74},
            {"type":"sex","sex":"female"}
        ]}"#;
        let predicate: Predicate = serde_json::from_str(json).unwrap();
        assert_eq!(
            predicate,
            Predicate::all(vec![Predicate::age_between(50, 74), Predicate::sex(Sex::Female)])
        );
    }
}
