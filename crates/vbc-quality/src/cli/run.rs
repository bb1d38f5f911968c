//! Run command implementation

use super::output::{self, OutputFormat};
use super::session::{self, PeriodSelection, SessionConfig};
use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;
use vbc_quality_eval::{MeasureResult, ReproductionReport, RunSummary};

/// Configuration for the run command
pub struct RunConfig {
    pub session: SessionConfig,
    pub period: PeriodSelection,
    /// Restrict to these measures; all active measures when empty
    pub measures: Vec<String>,
    /// Include every result row in the output
    pub results: bool,
    /// Re-evaluate the published run and compare rows
    pub verify: bool,
    pub format: OutputFormat,
    pub output_file: Option<PathBuf>,
}

#[derive(Serialize)]
struct RunReport {
    summary: RunSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    results: Vec<MeasureResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reproduction: Option<ReproductionReport>,
}

#[derive(Tabled)]
struct OutcomeLine {
    #[tabled(rename = "Measure")]
    measure: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Period")]
    period: String,
    #[tabled(rename = "Denominator")]
    denominator: String,
    #[tabled(rename = "Numerator")]
    numerator: String,
    #[tabled(rename = "Status")]
    status: String,
}

#[derive(Tabled)]
struct ResultLine {
    #[tabled(rename = "Measure")]
    measure: String,
    #[tabled(rename = "Patient")]
    patient: String,
    #[tabled(rename = "Age")]
    age: i32,
    #[tabled(rename = "Denominator")]
    denominator: bool,
    #[tabled(rename = "Numerator")]
    numerator: bool,
    #[tabled(rename = "Evidence")]
    evidence: String,
}

fn report_table(report: &RunReport) -> String {
    let summary = &report.summary;
    let mut lines: Vec<OutcomeLine> = summary
        .succeeded
        .iter()
        .map(|m| OutcomeLine {
            measure: m.measure_id.clone(),
            version: m.version.to_string(),
            period: m.period.to_string(),
            denominator: m.denominator.to_string(),
            numerator: m.numerator.to_string(),
            status: "ok".green().to_string(),
        })
        .collect();
    lines.extend(summary.failed.iter().map(|f| OutcomeLine {
        measure: f.measure_id.clone(),
        version: f.version.map_or("-".to_string(), |v| v.to_string()),
        period: "-".to_string(),
        denominator: "-".to_string(),
        numerator: "-".to_string(),
        status: format!("{}: {}", f.reason.code, f.reason.message).red().to_string(),
    }));

    let mut out = format!(
        "Run {} ({}), malformed values excluded: {}\n",
        summary.run_id, summary.state, summary.malformed_value_exclusions
    );
    out.push_str(&output::format_table(lines));
    if !report.results.is_empty() {
        out.push('\n');
        out.push_str(&output::format_table(report.results.iter().map(|r| ResultLine {
            measure: r.measure_id.clone(),
            patient: r.patient_id.to_string(),
            age: r.age_years,
            denominator: r.denominator,
            numerator: r.numerator,
            evidence: r
                .evidence
                .as_ref()
                .map_or("-".to_string(), |e| format!("{} {} {}", e.kind, e.event_id, e.date)),
        })));
    }
    if let Some(reproduction) = &report.reproduction {
        out.push('\n');
        out.push_str(&format!(
            "Reproduced {} rows: {}",
            reproduction.rows_compared,
            if reproduction.identical {
                "identical".green()
            } else {
                "MISMATCH".red().bold()
            }
        ));
    }
    out
}

/// Evaluate the fact bundle and print the run summary
pub async fn run(config: RunConfig) -> Result<()> {
    let service = session::open_service(&config.session)?;
    let period = config.period.resolve()?;
    let measures = (!config.measures.is_empty()).then(|| config.measures.clone());

    let summary = session::evaluate(&service, period, measures).await?;
    if config.session.verbose {
        for warning in &summary.warnings {
            eprintln!("{}", output::format_diagnostic(warning));
        }
    }

    let results = if config.results {
        service.runner().ledger().results(summary.run_id)?.as_ref().clone()
    } else {
        Vec::new()
    };
    let reproduction = if config.verify {
        Some(service.reproduce(summary.run_id)?)
    } else {
        None
    };

    let report = RunReport {
        summary,
        results,
        reproduction,
    };
    output::print_output(&report, config.format, config.output_file.as_deref(), report_table)?;

    if report.reproduction.as_ref().is_some_and(|r| !r.identical) {
        anyhow::bail!("Run {} did not reproduce", report.summary.run_id);
    }
    Ok(())
}
