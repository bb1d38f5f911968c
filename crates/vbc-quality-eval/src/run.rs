//! Run lifecycle types
//!
//! A run moves through
//! `Idle -> CollectingFacts -> Evaluating -> Assembling -> Published`
//! and may drop into `Failed` from any non-terminal state. `Published` and
//! `Failed` are terminal.

use crate::error::{EvalError, EvalResult};
use crate::lineage::RunId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use vbc_quality_diagnostics::Diagnostic;
use vbc_quality_model::SnapshotVersion;
use vbc_quality_types::MeasurementPeriod;

/// Measure runner state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    CollectingFacts,
    Evaluating { completed: usize, total: usize },
    Assembling,
    Published,
    Failed { reason: String },
}

impl RunState {
    pub fn name(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::CollectingFacts => "collecting_facts",
            RunState::Evaluating { .. } => "evaluating",
            RunState::Assembling => "assembling",
            RunState::Published => "published",
            RunState::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Published | RunState::Failed { .. })
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: &RunState) -> bool {
        match (self, next) {
            (from, RunState::Failed { .. }) => !from.is_terminal(),
            (RunState::Idle, RunState::CollectingFacts) => true,
            (RunState::CollectingFacts, RunState::Evaluating { completed: 0, .. }) => true,
            (
                RunState::Evaluating { completed, total },
                RunState::Evaluating {
                    completed: next_completed,
                    total: next_total,
                },
            ) => total == next_total && completed <= next_completed && next_completed <= next_total,
            (RunState::Evaluating { completed, total }, RunState::Assembling) => completed == total,
            (RunState::Assembling, RunState::Published) => true,
            _ => false,
        }
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn advance(&mut self, next: RunState) -> EvalResult<()> {
        if !self.can_transition_to(&next) {
            return Err(EvalError::invalid_transition(&*self, &next));
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Evaluating { completed, total } => {
                write!(f, "evaluating ({}/{})", completed, total)
            }
            RunState::Failed { reason } => write!(f, "failed: {}", reason),
            other => f.write_str(other.name()),
        }
    }
}

/// What to evaluate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// The run's period; its end is the reference date each measure
    /// resolves its own period from
    pub period: MeasurementPeriod,
    /// Restrict to these measure ids; all active measures when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measure_ids: Option<Vec<String>>,
}

impl RunRequest {
    pub fn new(period: MeasurementPeriod) -> Self {
        Self {
            period,
            measure_ids: None,
        }
    }

    pub fn with_measures<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.measure_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.period.reference_date()
    }
}

/// Cooperative cancellation flag, checked between patient batches
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Definition version and code sets pinned for one measure of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedMeasureRef {
    pub measure_id: String,
    pub version: u32,
    pub period: MeasurementPeriod,
    pub code_set_versions: BTreeMap<String, String>,
}

/// Everything fixed before fan-out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: RunId,
    pub request: RunRequest,
    pub measures: Vec<PinnedMeasureRef>,
    pub snapshot_version: SnapshotVersion,
    pub code_set_generation: u64,
    pub definition_generation: u64,
    pub engine_version: String,
    pub evaluated_at: DateTime<Utc>,
}

/// Counts for one successfully evaluated measure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureRunSummary {
    pub measure_id: String,
    pub version: u32,
    pub period: MeasurementPeriod,
    pub rows: usize,
    pub denominator: usize,
    pub numerator: usize,
}

/// A measure that was reported and skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedMeasure {
    pub measure_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub reason: Diagnostic,
}

/// Outcome of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub state: RunState,
    pub period: MeasurementPeriod,
    pub succeeded: Vec<MeasureRunSummary>,
    pub failed: Vec<FailedMeasure>,
    /// Lab results excluded because their value did not parse
    pub malformed_value_exclusions: usize,
    /// Per-record warnings, one per excluded value
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Diagnostic>,
    /// Set when the whole run was aborted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Diagnostic>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn is_published(&self) -> bool {
        self.state == RunState::Published
    }

    pub fn succeeded_ids(&self) -> impl Iterator<Item = &str> {
        self.succeeded.iter().map(|m| m.measure_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn evaluating(completed: usize, total: usize) -> RunState {
        RunState::Evaluating { completed, total }
    }

    fn failed() -> RunState {
        RunState::Failed {
            reason: "x".into(),
        }
    }

    #[rstest]
    #[case(RunState::Idle, RunState::CollectingFacts, true)]
    #[case(RunState::CollectingFacts, evaluating(0, 3), true)]
    #[case(evaluating(1, 3), evaluating(2, 3), true)]
    #[case(evaluating(2, 3), evaluating(1, 3), false)]
    #[case(evaluating(3, 3), RunState::Assembling, true)]
    #[case(evaluating(2, 3), RunState::Assembling, false)]
    #[case(RunState::Assembling, RunState::Published, true)]
    #[case(RunState::Idle, RunState::Published, false)]
    #[case(RunState::Evaluating { completed: 0, total: 0 }, RunState::Assembling, true)]
    #[case(RunState::Assembling, failed(), true)]
    #[case(RunState::Published, failed(), false)]
    #[case(failed(), RunState::Idle, false)]
    fn test_transitions(#[case] from: RunState, #[case] to: RunState, #[case] allowed: bool) {
        assert_eq!(from.can_transition_to(&to), allowed);
    }

    #[test]
    fn test_advance_rejects_skipping() {
        let mut state = RunState::Idle;
        let err = state.advance(RunState::Assembling).unwrap_err();
        assert!(matches!(err, EvalError::InvalidTransition { .. }));
        assert_eq!(state, RunState::Idle);
    }

    #[test]
    fn test_cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
