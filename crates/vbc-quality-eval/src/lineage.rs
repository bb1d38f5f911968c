//! Audit lineage for measure results
//!
//! Every result row carries enough provenance to reproduce it from the same
//! snapshot: definition version, pinned code set versions, snapshot version,
//! engine version, run id, evaluation timestamp and the evidence event.

use crate::engine::PatientOutcome;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use vbc_quality_measures::MeasureDefinition;
use vbc_quality_model::SnapshotVersion;
use vbc_quality_types::{EventId, EventKind, MeasurementPeriod, PatientId};

/// Identifier of one measure run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The clinical event a numerator decision was made on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub kind: EventKind,
    pub event_id: EventId,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Parsed lab value, for lab result evidence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Decimal>,
}

/// Provenance of a result row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    pub run_id: RunId,
    pub definition_version: u32,
    /// Code set name to pinned version
    pub code_set_versions: BTreeMap<String, String>,
    pub snapshot_version: SnapshotVersion,
    pub engine_version: String,
    pub evaluated_at: DateTime<Utc>,
}

/// One row per patient, measure and measurement period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureResult {
    pub patient_id: PatientId,
    pub measure_id: String,
    pub period: MeasurementPeriod,
    /// Whole-year age at the period end
    pub age_years: i32,
    pub denominator: bool,
    /// Never true unless `denominator` is
    pub numerator: bool,
    /// The most recent qualifying event, when one exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
    /// Qualifying events in the lookback window
    pub qualifying_events: usize,
    pub lineage: Lineage,
}

impl MeasureResult {
    pub fn run_id(&self) -> RunId {
        self.lineage.run_id
    }

    pub fn evidence_ids(&self) -> Vec<&EventId> {
        self.evidence.iter().map(|e| &e.event_id).collect()
    }

    /// Canonical serialized form used for reproduction checks
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Stamps evaluation outcomes with run-level provenance
#[derive(Debug, Clone)]
pub struct LineageRecorder {
    run_id: RunId,
    snapshot_version: SnapshotVersion,
    engine_version: String,
    evaluated_at: DateTime<Utc>,
}

impl LineageRecorder {
    pub fn new(
        run_id: RunId,
        snapshot_version: SnapshotVersion,
        engine_version: impl Into<String>,
        evaluated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id,
            snapshot_version,
            engine_version: engine_version.into(),
            evaluated_at,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Build the result row for one patient outcome
    pub fn record(
        &self,
        definition: &MeasureDefinition,
        code_set_versions: &BTreeMap<String, String>,
        period: MeasurementPeriod,
        outcome: PatientOutcome,
    ) -> MeasureResult {
        MeasureResult {
            patient_id: outcome.patient_id,
            measure_id: definition.id.clone(),
            period,
            age_years: outcome.age_years,
            denominator: outcome.denominator,
            numerator: outcome.denominator && outcome.numerator,
            evidence: outcome.evidence,
            qualifying_events: outcome.qualifying_events,
            lineage: Lineage {
                run_id: self.run_id,
                definition_version: definition.version,
                code_set_versions: code_set_versions.clone(),
                snapshot_version: self.snapshot_version,
                engine_version: self.engine_version.clone(),
                evaluated_at: self.evaluated_at,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_round_trips_through_text() {
        let id = RunId::new();
        assert_eq!(id.to_string().parse::<RunId>().unwrap(), id);
        assert!("not-a-uuid".parse::<RunId>().is_err());
    }
}
