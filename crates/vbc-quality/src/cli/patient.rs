//! Patient command implementation

use super::measures::describe_info;
use super::output::{self, OutputFormat};
use super::session::{self, PeriodSelection, SessionConfig};
use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;
use vbc_quality_eval::{AdditionalInfo, MeasureResult};
use vbc_quality_types::PatientId;

/// Configuration for the patient command
pub struct PatientConfig {
    pub session: SessionConfig,
    pub period: PeriodSelection,
    pub format: OutputFormat,
    pub output_file: Option<PathBuf>,
}

#[derive(Serialize)]
struct PatientMeasure {
    #[serde(flatten)]
    result: MeasureResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    info: Option<AdditionalInfo>,
}

#[derive(Tabled)]
struct PatientLine {
    #[tabled(rename = "Measure")]
    measure: String,
    #[tabled(rename = "Version")]
    version: u32,
    #[tabled(rename = "Eligible")]
    denominator: bool,
    #[tabled(rename = "Met")]
    numerator: bool,
    #[tabled(rename = "Detail")]
    info: String,
}

/// Show one patient's results from a fresh run
pub async fn show(patient_id: &str, config: PatientConfig) -> Result<()> {
    let service = session::open_service(&config.session)?;
    session::evaluate(&service, config.period.resolve()?, None).await?;

    let patient_id = PatientId::new(patient_id);
    let results = service.get_patient_measures(&patient_id)?;
    if results.is_empty() {
        anyhow::bail!("No results for patient {}", patient_id);
    }

    let rows = results
        .into_iter()
        .map(|result| {
            let info = service.additional_info(&result)?;
            Ok(PatientMeasure { result, info })
        })
        .collect::<Result<Vec<_>>>()?;

    output::print_output(&rows, config.format, config.output_file.as_deref(), |rows| {
        output::format_table(rows.iter().map(|row| PatientLine {
            measure: row.result.measure_id.clone(),
            version: row.result.lineage.definition_version,
            denominator: row.result.denominator,
            numerator: row.result.numerator,
            info: describe_info(row.info.as_ref()),
        }))
    })
}
