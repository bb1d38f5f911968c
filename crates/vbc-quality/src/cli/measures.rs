//! Measure listing and detail commands

use super::output::{self, OutputFormat};
use super::session::{self, PeriodSelection, SessionConfig};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tabled::Tabled;
use vbc_quality_eval::{AdditionalInfo, MeasureDetail, MeasureSummary};

/// Configuration for the `measures` and `measure` commands
pub struct MeasuresConfig {
    pub session: SessionConfig,
    pub period: PeriodSelection,
    /// Evaluate the fact bundle first so aggregates are populated
    pub evaluate: bool,
    pub format: OutputFormat,
    pub output_file: Option<PathBuf>,
}

#[derive(Tabled)]
struct MeasureLine {
    #[tabled(rename = "Measure")]
    id: String,
    #[tabled(rename = "Version")]
    version: u32,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Denominator")]
    denominator: String,
    #[tabled(rename = "Numerator")]
    numerator: String,
    #[tabled(rename = "Rate %")]
    rate: String,
}

impl From<&MeasureSummary> for MeasureLine {
    fn from(summary: &MeasureSummary) -> Self {
        let aggregate = summary.aggregate.as_ref();
        Self {
            id: summary.id.clone(),
            version: summary.version,
            name: summary.name.clone(),
            denominator: aggregate.map_or("-".to_string(), |a| a.denominator.to_string()),
            numerator: aggregate.map_or("-".to_string(), |a| a.numerator.to_string()),
            rate: aggregate.map_or("-".to_string(), |a| a.rate.to_string()),
        }
    }
}

#[derive(Tabled)]
struct PatientLine {
    #[tabled(rename = "Patient")]
    patient_id: String,
    #[tabled(rename = "MRN")]
    mrn: String,
    #[tabled(rename = "Name")]
    full_name: String,
    #[tabled(rename = "Age")]
    age: i32,
    #[tabled(rename = "Met")]
    numerator: String,
    #[tabled(rename = "Detail")]
    info: String,
}

pub fn describe_info(info: Option<&AdditionalInfo>) -> String {
    match info {
        Some(AdditionalInfo::LatestValue { value, date }) => format!("{} on {}", value, date),
        Some(AdditionalInfo::Screening { last_date, count }) => {
            format!("last {} ({} in window)", last_date, count)
        }
        Some(AdditionalInfo::Disposition { encounter_id, date }) => {
            format!("{} discharged {}", encounter_id, date)
        }
        None => "-".to_string(),
    }
}

fn detail_table(detail: &MeasureDetail) -> String {
    let mut out = format!("{}\n", detail.definition);
    if let Some(description) = &detail.definition.description {
        out.push_str(&format!("{}\n", description));
    }
    for caveat in &detail.definition.caveats {
        out.push_str(&output::format_warning(caveat));
        out.push('\n');
    }
    if let Some(aggregate) = &detail.aggregate {
        out.push_str(&format!(
            "{}/{} = {}% (period ending {}, run {})\n",
            aggregate.numerator,
            aggregate.denominator,
            aggregate.rate,
            aggregate.measurement_date,
            aggregate.run_id
        ));
    }
    out.push_str(&output::format_table(detail.patients.iter().map(|p| PatientLine {
        patient_id: p.patient_id.to_string(),
        mrn: p.mrn.clone(),
        full_name: p.full_name.clone(),
        age: p.age_years,
        numerator: if p.numerator { "yes" } else { "no" }.to_string(),
        info: describe_info(p.info.as_ref()),
    })));
    out
}

/// List all measures
pub async fn list(config: MeasuresConfig) -> Result<()> {
    let service = session::open_service(&config.session)?;
    if config.evaluate {
        let summary = session::evaluate(&service, config.period.resolve()?, None).await?;
        for failed in &summary.failed {
            eprintln!("{}", output::format_diagnostic(&failed.reason));
        }
    }

    let measures = service.list_measures();
    output::print_output(&measures, config.format, config.output_file.as_deref(), |measures| {
        output::format_table(measures.iter().map(MeasureLine::from))
    })
}

/// Show one measure with its latest aggregate and eligible patients
pub async fn show(measure_id: &str, config: MeasuresConfig) -> Result<()> {
    let service = session::open_service(&config.session)?;
    if config.evaluate {
        session::evaluate(&service, config.period.resolve()?, Some(vec![measure_id.to_string()]))
            .await?;
    }

    let detail = service
        .get_measure(measure_id)
        .with_context(|| format!("Unknown measure: {}", measure_id))?;
    output::print_output(&detail, config.format, config.output_file.as_deref(), detail_table)
}
