//! Measure registry tests
//!
//! Covers:
//! - Built-in catalog installation
//! - Version selection by effective date
//! - Immutability of published versions
//! - Definition bundles loaded from disk

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::io::Write;
use vbc_quality_measures::*;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn registries() -> (CodeSetRegistry, MeasureRegistry) {
    let code_sets = CodeSetRegistry::new();
    let measures = MeasureRegistry::new();
    install_builtins(&code_sets, &measures).unwrap();
    (code_sets, measures)
}

// ============================================================================
// Catalog
// ============================================================================

#[test]
fn test_builtins_installed_in_order() {
    let (code_sets, measures) = registries();

    assert_eq!(measures.ids(), vec![HEDIS_DM_A1C, HEDIS_BCS, HVBP_PSI_04]);
    assert_eq!(code_sets.names().len(), 4);
    assert_eq!(measures.active(date(2025, 12, 31)).len(), 3);
}

#[test]
fn test_install_is_idempotent() {
    let (code_sets, measures) = registries();
    let generation = measures.generation();

    install_builtins(&code_sets, &measures).unwrap();
    assert_eq!(measures.generation(), generation);
}

#[rstest]
#[case(DIABETES_DIAGNOSIS, "E11.9", true)]
#[case(DIABETES_DIAGNOSIS, "E14", true)]
#[case(DIABETES_DIAGNOSIS, "E15.1", false)]
#[case(DIABETES_DIAGNOSIS, "E119", true)]
#[case(HBA1C_LAB, "4548-4", true)]
#[case(HBA1C_LAB, "4548-40", false)]
#[case(MAMMOGRAPHY, "77067", true)]
#[case(MAMMOGRAPHY, "77068", false)]
fn test_builtin_membership(#[case] set: &str, #[case] code: &str, #[case] member: bool) {
    let (code_sets, _) = registries();
    assert_eq!(code_sets.latest(set).unwrap().contains(code), member);
}

// ============================================================================
// Versioning
// ============================================================================

#[test]
fn test_republish_as_version_two() {
    let (_, measures) = registries();

    let mut revised = breast_cancer_screening();
    revised.version = 2;
    revised.effective_from = date(2025, 1, 1);
    revised.denominator = Predicate::all(vec![
        Predicate::sex(vbc_quality_types::Sex::Female),
        Predicate::age_between(40, 74),
    ]);
    measures.publish(revised).unwrap();

    assert_eq!(measures.versions(HEDIS_BCS), vec![1, 2]);
    assert_eq!(measures.effective(HEDIS_BCS, date(2024, 12, 31)).unwrap().version, 1);
    assert_eq!(measures.effective(HEDIS_BCS, date(2025, 12, 31)).unwrap().version, 2);
    assert_eq!(measures.get(HEDIS_BCS, 1).unwrap().as_ref(), &breast_cancer_screening());
}

#[test]
fn test_conflicting_version_rejected() {
    let (_, measures) = registries();

    let mut changed = diabetes_a1c();
    changed.name = "Renamed".to_string();
    let err = measures.publish(changed).unwrap_err();

    assert!(matches!(err, MeasureError::ConflictingPublication { .. }));
    assert_eq!(measures.latest(HEDIS_DM_A1C).unwrap().name, "Diabetes Care - Hemoglobin A1c");
}

#[test]
fn test_not_yet_effective() {
    let (_, measures) = registries();
    let err = measures.effective(HEDIS_BCS, date(2019, 6, 30)).unwrap_err();
    assert!(matches!(err, MeasureError::NotEffective { .. }));
    assert!(measures.active(date(2019, 6, 30)).is_empty());
}

#[test]
fn test_unknown_measure() {
    let (_, measures) = registries();
    assert!(matches!(
        measures.latest("HEDIS-XYZ"),
        Err(MeasureError::UnknownMeasureDefinition { .. })
    ));
}

// ============================================================================
// Bundles
// ============================================================================

#[test]
fn test_bundle_file_round_trip() {
    let json = serde_json::to_string_pretty(&DefinitionBundle::builtin()).unwrap();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();

    let loaded = DefinitionBundle::from_file(file.path()).unwrap();
    assert_eq!(loaded, DefinitionBundle::builtin());
}

#[test]
fn test_bundle_with_missing_code_set_rejected() {
    let bundle = DefinitionBundle {
        code_sets: vec![],
        measures: vec![diabetes_a1c()],
    };
    let err = bundle
        .install(&CodeSetRegistry::new(), &MeasureRegistry::new())
        .unwrap_err();
    assert!(matches!(err, MeasureError::UnknownCodeSet { .. }));
}
