//! Validate command implementation

use super::output;
use super::session::{self, SessionConfig};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use colored::Colorize;
use vbc_quality_diagnostics::{Diagnostic, Severity, QM0103, QM0306};
use vbc_quality_measures::{install_builtins, CodeSetRegistry, DefinitionBundle, MeasureRegistry};
use vbc_quality_model::InMemoryFactStore;

/// Configuration for the validate command
pub struct ValidateConfig {
    pub session: SessionConfig,
    /// Date birth dates are checked against; today when absent
    pub today: Option<NaiveDate>,
    /// Treat warnings as errors
    pub strict: bool,
}

/// Findings of one validation pass
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn errors(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn warnings(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    pub fn passed(&self, strict: bool) -> bool {
        self.errors() == 0 && (!strict || self.warnings() == 0)
    }
}

/// Check the fact bundle and any definition bundle without evaluating
pub fn check(config: &ValidateConfig) -> Result<ValidationReport> {
    let mut report = ValidationReport::default();
    let today = config.today.unwrap_or_else(|| Utc::now().date_naive());

    let bundle = session::load_facts(&config.session)?;
    report.diagnostics.extend(bundle.quality_check(today));
    // Duplicate event keys only surface when indexing
    if let Err(err) = InMemoryFactStore::from_bundle(bundle) {
        if !report.diagnostics.iter().any(|d| d.code == QM0306) {
            report
                .diagnostics
                .push(Diagnostic::error(QM0306, err.to_string()));
        }
    }

    if let Some(path) = &config.session.definitions {
        let definitions = DefinitionBundle::from_file(path)
            .with_context(|| format!("Failed to read definitions: {}", path.display()))?;
        for definition in &definitions.measures {
            if let Err(err) = definition.validate() {
                report.diagnostics.push(err.to_diagnostic());
            }
        }
        for code_set in &definitions.code_sets {
            for problem in code_set.problems() {
                report.diagnostics.push(
                    Diagnostic::error(QM0103, problem).with_subject(code_set.reference().to_string()),
                );
            }
        }

        let code_sets = CodeSetRegistry::new();
        let measures = MeasureRegistry::new();
        install_builtins(&code_sets, &measures).context("Failed to install built-in measures")?;
        if let Err(err) = definitions.install(&code_sets, &measures) {
            report.diagnostics.push(err.to_diagnostic());
        }
    }

    Ok(report)
}

/// Validate and print findings; fails when errors (or, in strict mode,
/// warnings) were found
pub async fn validate(config: ValidateConfig) -> Result<()> {
    if config.session.data.is_none() && config.session.definitions.is_none() {
        anyhow::bail!("Nothing to validate: pass --data and/or --definitions");
    }

    let report = check(&config)?;
    for diagnostic in &report.diagnostics {
        println!("{}", output::format_diagnostic(diagnostic));
    }

    println!();
    if report.diagnostics.is_empty() {
        println!("{}", output::format_success("No problems found"));
        return Ok(());
    }

    let mut summary = Vec::new();
    if report.errors() > 0 {
        summary.push(format!("{} error(s)", report.errors()).red().to_string());
    }
    if report.warnings() > 0 {
        summary.push(format!("{} warning(s)", report.warnings()).yellow().to_string());
    }
    eprintln!("{} {}", "Found".bold(), summary.join(", "));

    if !report.passed(config.strict) {
        if config.strict && report.errors() == 0 {
            eprintln!("{}", "Strict mode: treating warnings as errors".yellow());
        }
        anyhow::bail!("Validation failed");
    }
    Ok(())
}
