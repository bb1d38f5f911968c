//! Service setup shared by all commands

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use vbc_quality_eval::{EngineConfig, MeasureRunner, QualityService, RunSummary};
use vbc_quality_measures::{install_builtins, CodeSetRegistry, DefinitionBundle, MeasureRegistry};
use vbc_quality_model::{FactBundle, InMemoryFactStore};
use vbc_quality_types::MeasurementPeriod;

/// Inputs every command may use
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Fact bundle (JSON); an empty store when absent
    pub data: Option<PathBuf>,
    /// Additional code sets and definitions to publish after the catalog
    pub definitions: Option<PathBuf>,
    /// Engine configuration (JSON)
    pub config: Option<PathBuf>,
    pub verbose: bool,
}

/// Period selection: a calendar year, or an explicit range
#[derive(Debug, Clone, Default)]
pub struct PeriodSelection {
    pub year: Option<i32>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl PeriodSelection {
    /// Defaults to the previous calendar year
    pub fn resolve(&self) -> Result<MeasurementPeriod> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => {
                MeasurementPeriod::new(start, end).context("Invalid measurement period")
            }
            (None, None) => {
                let year = self.year.unwrap_or_else(|| Utc::now().year() - 1);
                MeasurementPeriod::calendar_year(year).context("Invalid measurement year")
            }
            _ => anyhow::bail!("--start and --end must be given together"),
        }
    }
}

pub fn load_config(config: &SessionConfig) -> Result<EngineConfig> {
    match &config.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load engine config: {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

pub fn load_facts(config: &SessionConfig) -> Result<FactBundle> {
    match &config.data {
        Some(path) => FactBundle::from_file(path)
            .with_context(|| format!("Failed to load fact bundle: {}", path.display())),
        None => Ok(FactBundle::default()),
    }
}

/// Build a service over the fact bundle with the catalog installed
pub fn open_service(config: &SessionConfig) -> Result<QualityService> {
    let engine = load_config(config)?;
    let bundle = load_facts(config)?;
    if config.verbose {
        eprintln!(
            "Loaded {} patients and {} events",
            bundle.patients.len(),
            bundle.event_count()
        );
    }
    let store = InMemoryFactStore::from_bundle(bundle).context("Failed to index fact bundle")?;

    let code_sets = Arc::new(CodeSetRegistry::new());
    let measures = Arc::new(MeasureRegistry::new());
    install_builtins(&code_sets, &measures).context("Failed to install built-in measures")?;
    if let Some(path) = &config.definitions {
        DefinitionBundle::from_file(path)
            .and_then(|bundle| bundle.install(&code_sets, &measures))
            .with_context(|| format!("Failed to install definitions: {}", path.display()))?;
    }

    Ok(QualityService::new(MeasureRunner::new(
        Arc::new(store),
        code_sets,
        measures,
        engine,
    )))
}

/// Run in the background and wait for the terminal state
pub async fn evaluate(
    service: &QualityService,
    period: MeasurementPeriod,
    measure_ids: Option<Vec<String>>,
) -> Result<RunSummary> {
    let run_id = service.trigger_run(period, measure_ids).await?;
    log::info!("Started run {} for {} to {}", run_id, period.start, period.end);
    let summary = service
        .wait_for_run(run_id)
        .await
        .with_context(|| format!("Run {} did not publish", run_id))?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_selection() {
        let explicit = PeriodSelection {
            start: NaiveDate::from_ymd_opt(2025, 7, 1),
            end: NaiveDate::from_ymd_opt(2026, 6, 30),
            ..Default::default()
        };
        assert_eq!(explicit.resolve().unwrap().end, NaiveDate::from_ymd_opt(2026, 6, 30).unwrap());

        let year = PeriodSelection {
            year: Some(2024),
            ..Default::default()
        };
        assert_eq!(year.resolve().unwrap(), MeasurementPeriod::calendar_year(2024).unwrap());

        let half = PeriodSelection {
            start: NaiveDate::from_ymd_opt(2025, 1, 1),
            ..Default::default()
        };
        assert!(half.resolve().is_err());
    }
}
