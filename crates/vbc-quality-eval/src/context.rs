//! Evaluation context for measure execution

use crate::error::{registry_error, EvalError, EvalResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use vbc_quality_measures::{CodeSet, CodeSetRef, CodeSetRegistry, MeasureDefinition};
use vbc_quality_model::FactSnapshot;
use vbc_quality_types::{ClinicalEvent, DateRange, EventKind, MeasurementPeriod, PatientId};

/// Code sets resolved for one definition, fixed before evaluation starts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinnedCodeSets {
    sets: BTreeMap<CodeSetRef, Arc<CodeSet>>,
}

impl PinnedCodeSets {
    /// Resolve every code set the definition references
    pub fn pin(definition: &MeasureDefinition, registry: &CodeSetRegistry) -> EvalResult<Self> {
        let mut sets = BTreeMap::new();
        for reference in definition.code_set_refs() {
            let set = registry.resolve_ref(&reference).map_err(registry_error)?;
            sets.insert(reference, set);
        }
        Ok(Self { sets })
    }

    pub fn from_sets(sets: impl IntoIterator<Item = Arc<CodeSet>>) -> Self {
        Self {
            sets: sets.into_iter().map(|s| (s.reference(), s)).collect(),
        }
    }

    pub fn get(&self, reference: &CodeSetRef) -> EvalResult<&CodeSet> {
        self.sets
            .get(reference)
            .map(Arc::as_ref)
            .ok_or_else(|| EvalError::CodeSetNotPinned {
                reference: reference.to_string(),
            })
    }

    /// Code set name to version, as recorded in lineage
    pub fn versions(&self) -> BTreeMap<String, String> {
        self.sets
            .keys()
            .map(|r| (r.name.clone(), r.version.clone()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CodeSet>> {
        self.sets.values()
    }
}

/// Everything needed to evaluate one definition for one period
#[derive(Clone, Copy)]
pub struct EvaluationContext<'a> {
    facts: &'a FactSnapshot,
    code_sets: &'a PinnedCodeSets,
    period: MeasurementPeriod,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(
        facts: &'a FactSnapshot,
        code_sets: &'a PinnedCodeSets,
        period: MeasurementPeriod,
    ) -> Self {
        Self {
            facts,
            code_sets,
            period,
        }
    }

    pub fn facts(&self) -> &'a FactSnapshot {
        self.facts
    }

    pub fn period(&self) -> &MeasurementPeriod {
        &self.period
    }

    pub fn code_set(&self, reference: &CodeSetRef) -> EvalResult<&'a CodeSet> {
        self.code_sets.get(reference)
    }

    /// A patient's events dated within `range`, narrowed to `kind` when known
    pub fn events_in(
        &self,
        patient: &PatientId,
        kind: Option<EventKind>,
        range: DateRange,
    ) -> Vec<&'a ClinicalEvent> {
        match kind {
            Some(kind) => self.facts.events_for(patient, kind, range).collect(),
            None => self
                .facts
                .patient_events(patient)
                .filter(|event| range.contains(event.event_date()))
                .collect(),
        }
    }
}
