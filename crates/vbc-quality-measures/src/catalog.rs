//! Built-in HEDIS/HVBP measures and definition bundles
//!
//! Built-in measures:
//! - `HEDIS-DM-A1C`: diabetics 18-75 whose most recent HbA1c in the
//!   measurement year is below 8.0%
//! - `HEDIS-BCS`: women 50-74 with a mammogram in the last two years
//! - `HVBP-PSI-04`: deaths among surgical inpatients 18-89

use crate::code_set::{CodeSet, CodeSetRef};
use crate::definition::{MeasureDefinition, MeasureFamily};
use crate::error::{MeasureError, RegistryResult};
use crate::predicate::{
    Comparator, EventFilter, NumeratorCriterion, Predicate, Requirement, TemporalWindow,
};
use crate::registry::{CodeSetRegistry, MeasureRegistry};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use vbc_quality_types::{DischargeDisposition, EncounterType, EventKind, PeriodRule, Sex};

pub const HEDIS_DM_A1C: &str = "HEDIS-DM-A1C";
pub const HEDIS_BCS: &str = "HEDIS-BCS";
pub const HVBP_PSI_04: &str = "HVBP-PSI-04";

pub const DIABETES_DIAGNOSIS: &str = "diabetes-diagnosis";
pub const HBA1C_LAB: &str = "hba1c-lab";
pub const MAMMOGRAPHY: &str = "mammography";
pub const SURGICAL_PROCEDURE: &str = "surgical-procedure";

const CATALOG_VERSION: &str = "2025";

fn catalog_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn pinned(name: &str) -> CodeSetRef {
    CodeSetRef::new(name, CATALOG_VERSION)
}

/// Code sets referenced by the built-in measures
pub fn builtin_code_sets() -> Vec<CodeSet> {
    vec![
        CodeSet::new(DIABETES_DIAGNOSIS, CATALOG_VERSION)
            .with_description("Diabetes mellitus")
            .with_system("ICD-10-CM")
            .prefix("E10")
            .prefix("E11")
            .prefix("E12")
            .prefix("E13")
            .prefix("E14"),
        CodeSet::new(HBA1C_LAB, CATALOG_VERSION)
            .with_description("Hemoglobin A1c")
            .with_system("LOINC")
            .exact("4548-4")
            .exact("17856-6")
            .exact("4549-2"),
        CodeSet::new(MAMMOGRAPHY, CATALOG_VERSION)
            .with_description("Screening and diagnostic mammography")
            .with_system("CPT/HCPCS")
            .exact("77067")
            .exact("77066")
            .exact("77065")
            .exact("G0202")
            .exact("G0204")
            .exact("G0206"),
        CodeSet::new(SURGICAL_PROCEDURE, CATALOG_VERSION)
            .with_description("Operating room procedures (Medical and Surgical section)")
            .with_system("ICD-10-PCS")
            .prefix("0"),
    ]
}

/// HbA1c control for patients with diabetes
pub fn diabetes_a1c() -> MeasureDefinition {
    MeasureDefinition {
        id: HEDIS_DM_A1C.to_string(),
        name: "Diabetes Care - Hemoglobin A1c".to_string(),
        family: MeasureFamily::Hedis,
        version: 1,
        description: Some(
            "Patients 18-75 with diabetes whose most recent HbA1c in the measurement year is below 8.0%"
                .to_string(),
        ),
        effective_from: catalog_start(),
        effective_to: None,
        period_rule: PeriodRule::CalendarYear,
        denominator: Predicate::all(vec![
            Predicate::age_between(18, 75),
            Predicate::exists(
                EventFilter::coded(EventKind::Diagnosis, pinned(DIABETES_DIAGNOSIS)),
                TemporalWindow::AnyTime,
            ),
        ]),
        numerator: NumeratorCriterion::new(
            EventFilter::coded(EventKind::LabResult, pinned(HBA1C_LAB)),
            TemporalWindow::MeasurementPeriod,
            Requirement::Threshold {
                comparator: Comparator::Lt,
                value: Decimal::new(80, 1),
            },
        ),
        caveats: vec![],
    }
}

/// Breast cancer screening
pub fn breast_cancer_screening() -> MeasureDefinition {
    MeasureDefinition {
        id: HEDIS_BCS.to_string(),
        name: "Breast Cancer Screening".to_string(),
        family: MeasureFamily::Hedis,
        version: 1,
        description: Some("Women 50-74 with a mammogram in the past two years".to_string()),
        effective_from: catalog_start(),
        effective_to: None,
        period_rule: PeriodRule::CalendarYear,
        denominator: Predicate::all(vec![
            Predicate::sex(Sex::Female),
            Predicate::age_between(50, 74),
        ]),
        numerator: NumeratorCriterion::new(
            EventFilter::coded(EventKind::Procedure, pinned(MAMMOGRAPHY)),
            TemporalWindow::Years { years: 2 },
            Requirement::Exists,
        ),
        caveats: vec![],
    }
}

fn surgical_inpatient_stay() -> EventFilter {
    EventFilter::all(vec![
        EventFilter::kind(EventKind::Encounter),
        EventFilter::encounter_type(EncounterType::Inpatient),
        EventFilter::has_linked(EventFilter::coded(
            EventKind::Procedure,
            pinned(SURGICAL_PROCEDURE),
        )),
    ])
}

/// Death among surgical inpatients
///
/// Death is read from the discharge disposition of the most recent surgical
/// inpatient stay, never inferred from diagnosis codes.
pub fn surgical_mortality() -> MeasureDefinition {
    MeasureDefinition {
        id: HVBP_PSI_04.to_string(),
        name: "Death among surgical inpatients".to_string(),
        family: MeasureFamily::Hvbp,
        version: 1,
        description: Some(
            "Inpatients 18-89 with an operating room procedure who died during the stay".to_string(),
        ),
        effective_from: catalog_start(),
        effective_to: None,
        period_rule: PeriodRule::CalendarYear,
        denominator: Predicate::all(vec![
            Predicate::age_between(18, 89),
            Predicate::exists(surgical_inpatient_stay(), TemporalWindow::MeasurementPeriod),
        ]),
        numerator: NumeratorCriterion::new(
            surgical_inpatient_stay(),
            TemporalWindow::MeasurementPeriod,
            Requirement::Disposition {
                disposition: DischargeDisposition::Expired,
            },
        ),
        caveats: vec![
            "Requires an authoritative mortality source: deaths are counted only when the stay's discharge disposition is recorded as expired".to_string(),
        ],
    }
}

pub fn builtin_definitions() -> Vec<MeasureDefinition> {
    vec![diabetes_a1c(), breast_cancer_screening(), surgical_mortality()]
}

/// Code sets and measure definitions published together
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionBundle {
    #[serde(default)]
    pub code_sets: Vec<CodeSet>,
    #[serde(default)]
    pub measures: Vec<MeasureDefinition>,
}

impl DefinitionBundle {
    /// The built-in catalog
    pub fn builtin() -> Self {
        Self {
            code_sets: builtin_code_sets(),
            measures: builtin_definitions(),
        }
    }

    pub fn from_json(json: &str) -> RegistryResult<Self> {
        serde_json::from_str(json).map_err(|e| MeasureError::Parse(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| MeasureError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Publish code sets first, then definitions
    ///
    /// Definitions referencing a code set that is neither in the bundle nor
    /// already registered are rejected with [`MeasureError::UnknownCodeSet`].
    pub fn install(
        self,
        code_sets: &CodeSetRegistry,
        measures: &MeasureRegistry,
    ) -> RegistryResult<()> {
        for code_set in self.code_sets {
            code_sets.publish(code_set)?;
        }
        for definition in self.measures {
            for reference in definition.code_set_refs() {
                code_sets.resolve_ref(&reference)?;
            }
            measures.publish(definition)?;
        }
        Ok(())
    }
}

/// Publish the built-in catalog into the given registries
pub fn install_builtins(
    code_sets: &CodeSetRegistry,
    measures: &MeasureRegistry,
) -> RegistryResult<()> {
    DefinitionBundle::builtin().install(code_sets, measures)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_valid() {
        for definition in builtin_definitions() {
            definition.validate().unwrap();
        }
        for code_set in builtin_code_sets() {
            assert!(code_set.problems().is_empty(), "{}", code_set.name);
        }
    }

    #[test]
    fn test_only_a1c_is_diagnosis_gated() {
        assert!(diabetes_a1c().is_diagnosis_gated());
        assert!(!breast_cancer_screening().is_diagnosis_gated());
        assert!(!surgical_mortality().is_diagnosis_gated());
    }

    #[test]
    fn test_mortality_measure_carries_caveat() {
        assert_eq!(surgical_mortality().caveats.len(), 1);
    }
}
